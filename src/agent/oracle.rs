//! Decision oracle: picks the next capability call or declares the goal done.
//!
//! The controller treats every oracle as non-deterministic. Determinism in
//! tests comes from [`ScriptedOracle`], which replays a fixed sequence.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::capability::{Arguments, CapabilityContract};
use super::session::Step;

/// What the oracle wants to happen next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    /// Call a capability.
    Invoke {
        capability: String,
        #[serde(default)]
        arguments: Arguments,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reasoning: Option<String>,
    },
    /// The goal is satisfied.
    Finish { answer: String },
}

impl Decision {
    /// Convenience constructor for an invocation without reasoning.
    pub fn invoke(capability: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self::Invoke {
            capability: capability.into(),
            arguments: match arguments {
                serde_json::Value::Object(map) => map,
                _ => Arguments::new(),
            },
            reasoning: None,
        }
    }

    pub fn finish(answer: impl Into<String>) -> Self {
        Self::Finish {
            answer: answer.into(),
        }
    }

    /// Attach reasoning text to an invocation. No-op on `Finish`.
    pub fn because(mut self, why: impl Into<String>) -> Self {
        if let Self::Invoke { reasoning, .. } = &mut self {
            *reasoning = Some(why.into());
        }
        self
    }
}

/// Everything the oracle sees when deciding.
#[derive(Debug, Clone)]
pub struct DecisionRequest {
    pub goal: String,
    pub contracts: Arc<[CapabilityContract]>,
    pub history: Vec<Step>,
}

/// Oracle failures. Only [`OracleError::Unavailable`] is fatal on its own;
/// the rest are retried within the configured budget.
#[derive(Debug, Clone, Error, Diagnostic)]
pub enum OracleError {
    #[error("decision oracle unreachable: {message}")]
    #[diagnostic(
        code(audit::oracle::unavailable),
        help("Check that the model service is running, or use the rule-based oracle (--oracle rules).")
    )]
    Unavailable { message: String },

    #[error("decision oracle timed out after {timeout_secs}s")]
    #[diagnostic(
        code(audit::oracle::timeout),
        help("The model took too long to answer. Raise oracle_timeout_secs or use a smaller model.")
    )]
    Timeout { timeout_secs: u64 },

    #[error("malformed decision: {message}")]
    #[diagnostic(
        code(audit::oracle::malformed),
        help("The oracle's answer was not a valid decision object.")
    )]
    Malformed { message: String },

    #[error("decision request failed: {message}")]
    #[diagnostic(
        code(audit::oracle::request_failed),
        help("The oracle answered with an error. It may succeed on retry.")
    )]
    RequestFailed { message: String },
}

impl OracleError {
    /// Whether the session must fail without retrying.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Chooses the next step for a session.
pub trait DecisionOracle: Send + Sync {
    /// Short name for logs and session notes.
    fn name(&self) -> &str;

    fn decide(&self, request: &DecisionRequest) -> Result<Decision, OracleError>;
}

/// What a [`ScriptedOracle`] does once its script runs out.
#[derive(Debug, Clone)]
pub enum WhenExhausted {
    /// Finish with this answer.
    Finish(String),
    /// Keep returning this decision.
    Repeat(Decision),
    /// Report the oracle as unreachable.
    Unavailable,
}

/// Replays a fixed sequence of decisions (or errors).
pub struct ScriptedOracle {
    script: Mutex<VecDeque<Result<Decision, OracleError>>>,
    when_exhausted: WhenExhausted,
    calls: AtomicUsize,
    history_lengths: Mutex<Vec<usize>>,
}

impl ScriptedOracle {
    /// Replay `decisions`, then finish.
    pub fn new(decisions: impl IntoIterator<Item = Decision>) -> Self {
        Self::with_responses(
            decisions.into_iter().map(Ok),
            WhenExhausted::Finish("Script complete.".into()),
        )
    }

    /// Replay responses including errors, then behave per `when_exhausted`.
    pub fn with_responses(
        responses: impl IntoIterator<Item = Result<Decision, OracleError>>,
        when_exhausted: WhenExhausted,
    ) -> Self {
        Self {
            script: Mutex::new(responses.into_iter().collect()),
            when_exhausted,
            calls: AtomicUsize::new(0),
            history_lengths: Mutex::new(Vec::new()),
        }
    }

    /// Return `decision` forever.
    pub fn repeating(decision: Decision) -> Self {
        Self::with_responses(std::iter::empty(), WhenExhausted::Repeat(decision))
    }

    /// Number of `decide` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// History length seen by each `decide` call, in call order.
    pub fn history_lengths(&self) -> Vec<usize> {
        self.history_lengths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl DecisionOracle for ScriptedOracle {
    fn name(&self) -> &str {
        "scripted"
    }

    fn decide(&self, request: &DecisionRequest) -> Result<Decision, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.history_lengths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.history.len());

        let next = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match next {
            Some(response) => response,
            None => match &self.when_exhausted {
                WhenExhausted::Finish(answer) => Ok(Decision::finish(answer.clone())),
                WhenExhausted::Repeat(decision) => Ok(decision.clone()),
                WhenExhausted::Unavailable => Err(OracleError::Unavailable {
                    message: "script exhausted".into(),
                }),
            },
        }
    }
}
