//! Agent-specific error types with rich miette diagnostics.

use miette::Diagnostic;
use thiserror::Error;

use crate::error::{CollaboratorError, StoreError};

/// Errors from the agent layer (registry, capabilities, decision oracle).
///
/// Only [`AgentError::OracleUnavailable`] ends a session; the controller turns
/// every other variant into a failure observation.
#[derive(Debug, Error, Diagnostic)]
pub enum AgentError {
    #[error("capability already registered: \"{name}\"")]
    #[diagnostic(
        code(audit::agent::duplicate_capability),
        help("Capability names are unique. Register each capability once at start-up.")
    )]
    DuplicateCapability { name: String },

    #[error("unknown capability: \"{name}\"")]
    #[diagnostic(
        code(audit::agent::unknown_capability),
        help("Choose one of the registered capabilities (see `audit capabilities`).")
    )]
    UnknownCapability { name: String },

    #[error("invalid arguments for {capability}: {message}")]
    #[diagnostic(
        code(audit::agent::invalid_arguments),
        help("Check the capability's parameter names, types and required fields.")
    )]
    InvalidArguments { capability: String, message: String },

    #[error("{capability} timed out after {timeout_secs}s")]
    #[diagnostic(
        code(audit::agent::capability_timeout),
        help("The capability did not answer in time. Retry, or raise capability_timeout_secs.")
    )]
    CapabilityTimeout { capability: String, timeout_secs: u64 },

    #[error("{capability} not started: an abandoned call to {pending} is still running")]
    #[diagnostic(
        code(audit::agent::call_in_flight),
        help("A previous call overran its deadline and has not finished. Wait, or raise capability_timeout_secs.")
    )]
    CallInFlight { capability: String, pending: String },

    #[error("{capability} failed: {message}")]
    #[diagnostic(
        code(audit::agent::capability_failed),
        help("The capability encountered an error. Check the message for details.")
    )]
    CapabilityFailed { capability: String, message: String },

    #[error("decision oracle unavailable: {message}")]
    #[diagnostic(
        code(audit::agent::oracle_unavailable),
        help("The session cannot continue without a decision oracle. Check that the model service is running.")
    )]
    OracleUnavailable { message: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Collaborator(#[from] CollaboratorError),
}

/// Convenience alias for agent operations.
pub type AgentResult<T> = std::result::Result<T, AgentError>;
