//! Agent layer: capabilities, decision oracles and the orchestration loop.
//!
//! A [`Controller`] takes a goal, asks a [`DecisionOracle`] what to do next,
//! runs the chosen capability from the [`CapabilityRegistry`] and folds the
//! observation back into the session, until the oracle finishes or the
//! iteration cap is reached.
//!
//! Oracles:
//! - [`AuditPlanner`]: deterministic rules for the facility-audit flow
//! - [`OllamaOracle`]: a local language model over HTTP
//! - [`ScriptedOracle`]: a fixed decision sequence for tests

pub mod capabilities;
pub mod capability;
pub mod context;
pub mod controller;
pub mod deadline;
pub mod error;
pub mod llm;
pub mod oracle;
pub mod planner;
pub mod session;

pub use capabilities::{BuiltinCapability, builtin_registry, register_builtins};
pub use capability::{
    Arguments, Capability, CapabilityArgs, CapabilityContract, CapabilityOutput,
    CapabilityRegistry, ParamSchema, ParamType, SideEffect,
};
pub use context::{AuditContext, InMemoryCollaborators};
pub use controller::{Controller, ControllerConfig};
pub use error::{AgentError, AgentResult};
pub use llm::{OllamaConfig, OllamaOracle};
pub use oracle::{Decision, DecisionOracle, DecisionRequest, OracleError, ScriptedOracle, WhenExhausted};
pub use planner::AuditPlanner;
pub use session::{
    AuditSession, FailureKind, Invocation, Observation, Outcome, SessionError, SessionRecord,
    SessionStatus, Step,
};
