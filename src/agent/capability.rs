//! Capability system: typed contracts, argument validation and the registry.
//!
//! A capability is a named unit of work the decision oracle may invoke. Each
//! one declares a [`CapabilityContract`] (parameters, side-effect class,
//! purpose text for the oracle) and implements [`Capability`]. The
//! [`CapabilityRegistry`] is filled once at start-up and then shared read-only
//! by every session.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::context::AuditContext;
use super::error::{AgentError, AgentResult};

/// Raw arguments proposed by the decision oracle.
pub type Arguments = Map<String, Value>;

/// What a capability does to the outside world.
///
/// Ordered from harmless to outward-facing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffect {
    /// Computation only.
    Pure,
    /// Reads from a collaborator.
    Read,
    /// Writes to an external system (email, calendar, log, records).
    WriteExternal,
}

impl std::fmt::Display for SideEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pure => write!(f, "pure"),
            Self::Read => write!(f, "read"),
            Self::WriteExternal => write!(f, "write-external"),
        }
    }
}

/// Declared type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    String,
    Integer,
    Boolean,
    /// Calendar date as a `YYYY-MM-DD` string.
    Date,
    StringList,
}

impl ParamType {
    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Date => value
                .as_str()
                .is_some_and(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()),
            Self::StringList => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
        }
    }
}

impl std::fmt::Display for ParamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Integer => write!(f, "integer"),
            Self::Boolean => write!(f, "boolean"),
            Self::Date => write!(f, "date (YYYY-MM-DD)"),
            Self::StringList => write!(f, "list of strings"),
        }
    }
}

/// Schema for a single parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSchema {
    pub name: String,
    pub description: String,
    pub required: bool,
    pub param_type: ParamType,
}

impl ParamSchema {
    /// Create a required parameter.
    pub fn required(
        name: impl Into<String>,
        param_type: ParamType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required: true,
            param_type,
        }
    }

    /// Create an optional parameter.
    pub fn optional(
        name: impl Into<String>,
        param_type: ParamType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required: false,
            param_type,
        }
    }
}

/// A capability's interface as seen by the decision oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityContract {
    /// Unique capability name.
    pub name: String,
    /// Purpose text shown to the oracle.
    pub description: String,
    pub side_effect: SideEffect,
    pub parameters: Vec<ParamSchema>,
}

impl CapabilityContract {
    /// Check raw arguments against this contract.
    ///
    /// Rejects missing required parameters, values of the wrong type and
    /// parameters the contract does not declare. A JSON `null` counts as absent.
    pub fn validate(&self, arguments: &Arguments) -> AgentResult<CapabilityArgs> {
        let invalid = |message: String| AgentError::InvalidArguments {
            capability: self.name.clone(),
            message,
        };

        for key in arguments.keys() {
            if !self.parameters.iter().any(|p| &p.name == key) {
                return Err(invalid(format!("unexpected parameter: {key}")));
            }
        }

        let mut values = Map::new();
        for param in &self.parameters {
            match arguments.get(&param.name) {
                None | Some(Value::Null) => {
                    if param.required {
                        return Err(invalid(format!(
                            "missing required parameter: {}",
                            param.name
                        )));
                    }
                }
                Some(value) => {
                    if !param.param_type.accepts(value) {
                        return Err(invalid(format!(
                            "parameter {} must be {}, got {value}",
                            param.name, param.param_type
                        )));
                    }
                    values.insert(param.name.clone(), value.clone());
                }
            }
        }

        Ok(CapabilityArgs {
            capability: self.name.clone(),
            values,
        })
    }

    /// One-line signature, e.g. `schedule_follow_up(task: string, date: date, [facility_id: string])`.
    pub fn signature(&self) -> String {
        let params: Vec<String> = self
            .parameters
            .iter()
            .map(|p| {
                if p.required {
                    format!("{}: {}", p.name, p.param_type)
                } else {
                    format!("[{}: {}]", p.name, p.param_type)
                }
            })
            .collect();
        format!("{}({})", self.name, params.join(", "))
    }
}

/// Arguments that passed [`CapabilityContract::validate`].
#[derive(Debug, Clone)]
pub struct CapabilityArgs {
    capability: String,
    values: Map<String, Value>,
}

impl CapabilityArgs {
    /// Get a string parameter.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str)
    }

    /// Get a required string parameter, returning an error if missing.
    pub fn require_str(&self, name: &str) -> AgentResult<&str> {
        self.get_str(name).ok_or_else(|| self.missing(name))
    }

    /// Get an integer parameter.
    pub fn get_integer(&self, name: &str) -> Option<i64> {
        self.values.get(name).and_then(Value::as_i64)
    }

    /// Get a required date parameter.
    pub fn require_date(&self, name: &str) -> AgentResult<NaiveDate> {
        let raw = self.require_str(name)?;
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| AgentError::InvalidArguments {
            capability: self.capability.clone(),
            message: format!("parameter {name}: {e}"),
        })
    }

    /// Get a string-list parameter; absent means empty.
    pub fn string_list(&self, name: &str) -> Vec<String> {
        self.values
            .get(name)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn missing(&self, name: &str) -> AgentError {
        AgentError::InvalidArguments {
            capability: self.capability.clone(),
            message: format!("missing required parameter: {name}"),
        }
    }
}

/// Output from a capability execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityOutput {
    /// Human-readable result.
    pub text: String,
    /// Structured result for planners and transcripts.
    pub data: Value,
}

impl CapabilityOutput {
    /// Output with text only.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            data: Value::Null,
        }
    }

    /// Output with text and structured data.
    pub fn with_data(text: impl Into<String>, data: Value) -> Self {
        Self {
            text: text.into(),
            data,
        }
    }
}

/// A unit of work the controller can execute.
pub trait Capability: Send + Sync {
    /// Describe this capability's interface.
    fn contract(&self) -> CapabilityContract;

    /// Execute with validated arguments.
    fn execute(&self, ctx: &AuditContext, args: CapabilityArgs) -> AgentResult<CapabilityOutput>;
}

/// A contract paired with its implementation.
#[derive(Clone)]
pub struct RegisteredCapability {
    pub contract: CapabilityContract,
    pub implementation: Arc<dyn Capability>,
}

impl std::fmt::Debug for RegisteredCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredCapability")
            .field("contract", &self.contract.name)
            .finish()
    }
}

/// Catalog of capabilities, in registration order.
#[derive(Default)]
pub struct CapabilityRegistry {
    entries: Vec<RegisteredCapability>,
    index: HashMap<String, usize>,
}

impl CapabilityRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an implementation under an explicit contract.
    ///
    /// Fails with [`AgentError::DuplicateCapability`] if the name is taken.
    pub fn register(
        &mut self,
        contract: CapabilityContract,
        implementation: Arc<dyn Capability>,
    ) -> AgentResult<()> {
        if self.index.contains_key(&contract.name) {
            return Err(AgentError::DuplicateCapability {
                name: contract.name,
            });
        }
        tracing::debug!(capability = %contract.name, side_effect = %contract.side_effect, "registered capability");
        self.index.insert(contract.name.clone(), self.entries.len());
        self.entries.push(RegisteredCapability {
            contract,
            implementation,
        });
        Ok(())
    }

    /// Register an implementation under the contract it declares.
    pub fn register_capability(&mut self, implementation: Arc<dyn Capability>) -> AgentResult<()> {
        let contract = implementation.contract();
        self.register(contract, implementation)
    }

    /// Look up a capability by name.
    pub fn resolve(&self, name: &str) -> AgentResult<&RegisteredCapability> {
        self.index
            .get(name)
            .map(|&i| &self.entries[i])
            .ok_or_else(|| AgentError::UnknownCapability { name: name.into() })
    }

    /// Iterate contracts in registration order. Each call starts afresh.
    pub fn list(&self) -> impl Iterator<Item = &CapabilityContract> + Clone + '_ {
        self.entries.iter().map(|e| &e.contract)
    }

    /// Owned copies of all contracts, in registration order.
    pub fn contracts(&self) -> Vec<CapabilityContract> {
        self.list().cloned().collect()
    }

    /// Number of registered capabilities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field(
                "capabilities",
                &self.list().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
