//! Rich diagnostic error types for the audit agent.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text so operators know what went wrong and
//! how to fix it. Inside a session, none of these abort the loop: the
//! controller turns them into observations (see [`crate::agent::controller`]).

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the audit agent.
///
/// Each variant wraps a subsystem-specific error, preserving the full
/// diagnostic chain through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum AuditError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Paths(#[from] crate::paths::PathError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Agent(#[from] crate::agent::AgentError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Session(#[from] crate::agent::session::SessionError),

    #[error("invalid {flag}: {message}")]
    #[diagnostic(
        code(audit::cli::invalid_flag),
        help("Run `audit --help` for the accepted values.")
    )]
    InvalidFlag { flag: String, message: String },

    #[error("config already exists: {path}")]
    #[diagnostic(
        code(audit::cli::config_exists),
        help("Pass --force to overwrite it.")
    )]
    ConfigExists { path: String },

    #[error("session {id} failed: {reason}")]
    #[diagnostic(
        code(audit::cli::session_failed),
        help("Check the oracle, or rerun with --oracle rules. The transcript is kept with --save.")
    )]
    SessionFailed { id: String, reason: String },

    #[error("failed to render output as JSON")]
    #[diagnostic(code(audit::cli::output))]
    Output(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Record store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("facility not found: \"{facility_id}\"")]
    #[diagnostic(
        code(audit::store::facility_not_found),
        help("List known facilities with `list_facilities` (or `audit facilities`) and check the id.")
    )]
    FacilityNotFound { facility_id: String },

    #[error("equipment not found: \"{equipment_id}\"")]
    #[diagnostic(
        code(audit::store::equipment_not_found),
        help("Fetch the facility's equipment list first and use one of its equipment ids.")
    )]
    EquipmentNotFound { equipment_id: String },

    #[error("equipment \"{equipment_id}\" not found at facility \"{facility_id}\"")]
    #[diagnostic(
        code(audit::store::equipment_not_in_facility),
        help("Equipment ids are only unique within a facility. Check the facility's equipment list.")
    )]
    EquipmentNotInFacility {
        facility_id: String,
        equipment_id: String,
    },

    #[error("facility \"{facility_id}\" already registered")]
    #[diagnostic(
        code(audit::store::duplicate_facility),
        help("Facility ids are unique. Reset the store or choose a different id.")
    )]
    DuplicateFacility { facility_id: String },

    #[error("equipment \"{equipment_id}\" listed twice in facility \"{facility_id}\"")]
    #[diagnostic(
        code(audit::store::duplicate_equipment),
        help("Equipment ids must be unique within their facility.")
    )]
    DuplicateEquipment {
        facility_id: String,
        equipment_id: String,
    },

    #[error("record store unavailable: {message}")]
    #[diagnostic(
        code(audit::store::unavailable),
        help("The backing record service could not be reached. Retry later or check its connection settings.")
    )]
    Unavailable { message: String },
}

impl StoreError {
    /// Whether this is one of the "not found" lookups.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::FacilityNotFound { .. }
                | Self::EquipmentNotFound { .. }
                | Self::EquipmentNotInFacility { .. }
        )
    }
}

// ---------------------------------------------------------------------------
// Collaborator errors (retrieval, sinks)
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum CollaboratorError {
    #[error("{collaborator} transport failure: {message}")]
    #[diagnostic(
        code(audit::collaborator::transport),
        help("The external service could not be reached. The decision oracle may retry or abandon the step.")
    )]
    Transport {
        collaborator: String,
        message: String,
    },

    #[error("failed to load directive passages from {path}: {message}")]
    #[diagnostic(
        code(audit::collaborator::directive_load),
        help("The directives file must be TOML with one or more [[passage]] tables (text, source).")
    )]
    DirectiveLoad { path: String, message: String },
}

/// Convenience alias for record store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Convenience alias for collaborator calls.
pub type CollaboratorResult<T> = std::result::Result<T, CollaboratorError>;

/// Convenience alias for top-level operations.
pub type AuditResult<T> = std::result::Result<T, AuditError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_classification() {
        assert!(
            StoreError::FacilityNotFound {
                facility_id: "FAC-XX-999".into()
            }
            .is_not_found()
        );
        assert!(
            !StoreError::DuplicateFacility {
                facility_id: "FAC-AB-001".into()
            }
            .is_not_found()
        );
    }

    #[test]
    fn cli_errors_carry_codes() {
        let err = AuditError::InvalidFlag {
            flag: "--cap".into(),
            message: "must be at least 1".into(),
        };
        assert_eq!(err.to_string(), "invalid --cap: must be at least 1");
        assert_eq!(
            err.code().map(|c| c.to_string()).as_deref(),
            Some("audit::cli::invalid_flag")
        );
    }

    #[test]
    fn store_error_wraps_transparently() {
        let err: AuditError = StoreError::EquipmentNotFound {
            equipment_id: "EQ-1".into(),
        }
        .into();
        assert_eq!(err.to_string(), "equipment not found: \"EQ-1\"");
    }
}
