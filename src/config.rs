//! Audit configuration, stored as TOML.
//!
//! Every field has a default, so an empty or partial file is valid.

use std::path::{Path, PathBuf};
use std::time::Duration;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::agent::controller::ControllerConfig;
use crate::agent::llm::OllamaConfig;

/// Errors from loading or saving configuration.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(audit::config::read),
        help("Check that the file exists and is readable, or run `audit config init`.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write config: {path}")]
    #[diagnostic(
        code(audit::config::write),
        help("Check that the directory exists and you have write permissions.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {message}")]
    #[diagnostic(
        code(audit::config::parse),
        help("The config must be valid TOML. Unknown keys are rejected.")
    )]
    Parse { path: String, message: String },

    #[error("invalid config value for {field}: {message}")]
    #[diagnostic(code(audit::config::invalid), help("Fix the value and retry."))]
    Invalid { field: String, message: String },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

fn default_iteration_cap() -> usize {
    15
}

fn default_follow_up_offset_days() -> i64 {
    30
}

fn default_notify_recipient() -> String {
    "compliance.officer@petrolab.example".into()
}

fn default_oracle_timeout_secs() -> u64 {
    120
}

fn default_capability_timeout_secs() -> u64 {
    30
}

fn default_oracle_retries() -> u32 {
    2
}

/// Settings for audit sessions and the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Maximum capability invocations per session.
    #[serde(default = "default_iteration_cap")]
    pub iteration_cap: usize,
    /// Days from today at which follow-ups are scheduled.
    #[serde(default = "default_follow_up_offset_days")]
    pub follow_up_offset_days: i64,
    /// Who receives compliance reports.
    #[serde(default = "default_notify_recipient")]
    pub notify_recipient: String,
    /// Deadline for one oracle decision (0 disables).
    #[serde(default = "default_oracle_timeout_secs")]
    pub oracle_timeout_secs: u64,
    /// Deadline for one capability call (0 disables).
    #[serde(default = "default_capability_timeout_secs")]
    pub capability_timeout_secs: u64,
    /// Transient oracle failures tolerated per decision.
    #[serde(default = "default_oracle_retries")]
    pub oracle_retries: u32,
    /// Optional TOML file of directive passages replacing the bundled ones.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directives_path: Option<PathBuf>,
    #[serde(default)]
    pub ollama: OllamaConfig,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            iteration_cap: default_iteration_cap(),
            follow_up_offset_days: default_follow_up_offset_days(),
            notify_recipient: default_notify_recipient(),
            oracle_timeout_secs: default_oracle_timeout_secs(),
            capability_timeout_secs: default_capability_timeout_secs(),
            oracle_retries: default_oracle_retries(),
            directives_path: None,
            ollama: OllamaConfig::default(),
        }
    }
}

impl AuditConfig {
    /// Load from a TOML file and validate.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save to a TOML file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = self.to_toml()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }

    pub fn to_toml(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: "<memory>".into(),
            message: e.to_string(),
        })
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.iteration_cap == 0 {
            return Err(ConfigError::Invalid {
                field: "iteration_cap".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.follow_up_offset_days < 0 {
            return Err(ConfigError::Invalid {
                field: "follow_up_offset_days".into(),
                message: "must not be negative".into(),
            });
        }
        if !self.notify_recipient.contains('@') {
            return Err(ConfigError::Invalid {
                field: "notify_recipient".into(),
                message: format!("not an email address: {}", self.notify_recipient),
            });
        }
        Ok(())
    }

    /// Replace the iteration cap, rejecting values the loop cannot run with.
    pub fn with_iteration_cap(mut self, cap: usize) -> ConfigResult<Self> {
        self.iteration_cap = cap;
        self.validate()?;
        Ok(self)
    }

    /// Loop settings for the controller.
    pub fn controller(&self) -> ControllerConfig {
        ControllerConfig {
            iteration_cap: self.iteration_cap,
            oracle_timeout: Duration::from_secs(self.oracle_timeout_secs),
            capability_timeout: Duration::from_secs(self.capability_timeout_secs),
            oracle_retries: self.oracle_retries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = AuditConfig::default();
        assert_eq!(c.iteration_cap, 15);
        assert_eq!(c.follow_up_offset_days, 30);
        assert_eq!(c.oracle_retries, 2);
        assert!(c.validate().is_ok());
        assert_eq!(c.controller().capability_timeout, Duration::from_secs(30));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let c: AuditConfig = toml::from_str(
            r#"
            iteration_cap = 5

            [ollama]
            model = "qwen2.5"
            "#,
        )
        .unwrap();
        assert_eq!(c.iteration_cap, 5);
        assert_eq!(c.oracle_timeout_secs, 120);
        assert_eq!(c.ollama.model, "qwen2.5");
        assert_eq!(c.ollama.base_url, "http://localhost:11434");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<AuditConfig>("iteration_limit = 3").is_err());
    }

    #[test]
    fn invalid_values_fail_validation() {
        let c = AuditConfig {
            iteration_cap: 0,
            ..Default::default()
        };
        assert!(matches!(c.validate(), Err(ConfigError::Invalid { ref field, .. }) if field == "iteration_cap"));

        let c = AuditConfig {
            notify_recipient: "nobody".into(),
            ..Default::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn iteration_cap_override_is_validated() {
        let c = AuditConfig::default().with_iteration_cap(4).unwrap();
        assert_eq!(c.controller().iteration_cap, 4);
        assert!(matches!(
            AuditConfig::default().with_iteration_cap(0),
            Err(ConfigError::Invalid { ref field, .. }) if field == "iteration_cap"
        ));
    }
}
