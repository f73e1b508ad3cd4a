//! Session transcript: every invocation and its observation for one goal.
//!
//! An open [`SessionRecord`] is append-only and hands out sequence numbers
//! starting at 1. Closing it consumes the record and yields an immutable
//! [`AuditSession`], so a session can be closed exactly once.

use std::path::Path;

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::capability::Arguments;
use super::error::AgentError;

/// Errors from saving or loading transcripts.
#[derive(Debug, Error, Diagnostic)]
pub enum SessionError {
    #[error("failed to read transcript: {path}")]
    #[diagnostic(
        code(audit::session::read),
        help("Check that the file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write transcript: {path}")]
    #[diagnostic(
        code(audit::session::write),
        help("Check that the directory exists and you have write permissions.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed transcript {path}: {message}")]
    #[diagnostic(
        code(audit::session::parse),
        help("The file is not a session transcript, or was written by an incompatible version.")
    )]
    Parse { path: String, message: String },
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// One oracle-selected call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    pub sequence: u32,
    pub capability: String,
    pub arguments: Arguments,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    pub at: DateTime<Utc>,
}

/// Why an invocation did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InvalidArguments,
    UnknownCapability,
    NotFound,
    Collaborator,
    Timeout,
    Execution,
}

impl FailureKind {
    /// Classify a capability-path error.
    pub fn of(err: &AgentError) -> Self {
        match err {
            AgentError::InvalidArguments { .. } => Self::InvalidArguments,
            AgentError::UnknownCapability { .. } => Self::UnknownCapability,
            AgentError::Store(e) if e.is_not_found() => Self::NotFound,
            AgentError::Store(_) | AgentError::Collaborator(_) => Self::Collaborator,
            AgentError::CapabilityTimeout { .. } | AgentError::CallInFlight { .. } => Self::Timeout,
            _ => Self::Execution,
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArguments => write!(f, "invalid arguments"),
            Self::UnknownCapability => write!(f, "unknown capability"),
            Self::NotFound => write!(f, "not found"),
            Self::Collaborator => write!(f, "collaborator error"),
            Self::Timeout => write!(f, "timeout"),
            Self::Execution => write!(f, "execution error"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure { kind: FailureKind },
}

/// The result of one invocation, paired with it by sequence number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub sequence: u32,
    pub outcome: Outcome,
    pub text: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl Observation {
    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self.outcome {
            Outcome::Success => None,
            Outcome::Failure { kind } => Some(kind),
        }
    }
}

/// An invocation with its observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub invocation: Invocation,
    pub observation: Observation,
}

/// Terminal status of a closed session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionStatus {
    /// The oracle signalled a final answer.
    Completed,
    /// The iteration cap was reached first.
    Exhausted,
    /// The oracle could not be consulted.
    Failed { reason: String },
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "COMPLETED"),
            Self::Exhausted => write!(f, "EXHAUSTED"),
            Self::Failed { .. } => write!(f, "FAILED"),
        }
    }
}

/// A session still being executed.
#[derive(Debug)]
pub struct SessionRecord {
    id: String,
    goal: String,
    started_at: DateTime<Utc>,
    steps: Vec<Step>,
    notes: Vec<String>,
}

impl SessionRecord {
    pub fn open(id: impl Into<String>, goal: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            goal: goal.into(),
            started_at,
            steps: Vec::new(),
            notes: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Sequence number the next invocation will carry.
    pub fn next_sequence(&self) -> u32 {
        self.steps.len() as u32 + 1
    }

    /// Number of recorded invocations.
    pub fn invocation_count(&self) -> usize {
        self.steps.len()
    }

    /// Build the next invocation. Nothing is recorded until [`Self::observe`].
    pub fn invoke(
        &self,
        capability: impl Into<String>,
        arguments: Arguments,
        reasoning: Option<String>,
        at: DateTime<Utc>,
    ) -> Invocation {
        Invocation {
            sequence: self.next_sequence(),
            capability: capability.into(),
            arguments,
            reasoning,
            at,
        }
    }

    /// Record an invocation together with its observation.
    ///
    /// The pair always takes the next sequence number, whatever the
    /// invocation carried.
    pub fn observe(
        &mut self,
        mut invocation: Invocation,
        outcome: Outcome,
        text: impl Into<String>,
        data: Value,
    ) -> &Step {
        let sequence = self.next_sequence();
        invocation.sequence = sequence;
        self.steps.push(Step {
            invocation,
            observation: Observation {
                sequence,
                outcome,
                text: text.into(),
                data,
            },
        });
        &self.steps[self.steps.len() - 1]
    }

    /// Attach a note that is not an observation (e.g. an oracle retry).
    pub fn note(&mut self, text: impl Into<String>) {
        self.notes.push(text.into());
    }

    pub fn close(
        self,
        status: SessionStatus,
        answer: impl Into<String>,
        finished_at: DateTime<Utc>,
    ) -> AuditSession {
        AuditSession {
            id: self.id,
            goal: self.goal,
            steps: self.steps,
            notes: self.notes,
            status,
            answer: answer.into(),
            started_at: self.started_at,
            finished_at,
        }
    }
}

/// A closed session: goal, full transcript, terminal status and answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditSession {
    pub id: String,
    pub goal: String,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub notes: Vec<String>,
    pub status: SessionStatus,
    pub answer: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl AuditSession {
    pub fn invocations(&self) -> impl Iterator<Item = &Invocation> {
        self.steps.iter().map(|s| &s.invocation)
    }

    pub fn observations(&self) -> impl Iterator<Item = &Observation> {
        self.steps.iter().map(|s| &s.observation)
    }

    /// Steps that invoked the named capability.
    pub fn steps_for<'a>(&'a self, capability: &'a str) -> impl Iterator<Item = &'a Step> + 'a {
        self.steps
            .iter()
            .filter(move |s| s.invocation.capability == capability)
    }

    pub fn is_completed(&self) -> bool {
        self.status == SessionStatus::Completed
    }

    /// Human-readable transcript.
    pub fn render(&self) -> String {
        let mut out = format!("Goal: {}\nSession: {}\n", self.goal, self.id);
        for step in &self.steps {
            let inv = &step.invocation;
            let args = Value::Object(inv.arguments.clone());
            out.push_str(&format!("\n[{}] {} {}\n", inv.sequence, inv.capability, args));
            if let Some(reason) = &inv.reasoning {
                out.push_str(&format!("    why: {reason}\n"));
            }
            let marker = match step.observation.failure_kind() {
                None => "ok".to_string(),
                Some(kind) => kind.to_string(),
            };
            out.push_str(&format!("    -> ({marker})"));
            for line in step.observation.text.lines() {
                out.push_str(&format!("\n       {line}"));
            }
            out.push('\n');
        }
        for note in &self.notes {
            out.push_str(&format!("\nnote: {note}"));
        }
        out.push_str(&format!("\n\nStatus: {}\n", self.status));
        if let SessionStatus::Failed { reason } = &self.status {
            out.push_str(&format!("Reason: {reason}\n"));
        }
        out.push_str(&format!("Answer: {}\n", self.answer));
        out
    }

    /// Default file name under the sessions directory.
    pub fn file_name(&self) -> String {
        format!("{}.json", self.id)
    }

    /// Write the transcript as pretty JSON.
    pub fn save(&self, path: &Path) -> SessionResult<()> {
        let content = serde_json::to_string_pretty(self).map_err(|e| SessionError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SessionError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| SessionError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }

    pub fn load(path: &Path) -> SessionResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| SessionError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(|e| SessionError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use chrono::TimeZone;
    use serde_json::json;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap()
    }

    fn args(v: Value) -> Arguments {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn sequences_start_at_one_and_pair_up() {
        let mut rec = SessionRecord::open("s-1", "audit FAC-AB-001", at());
        for name in ["list_facilities", "get_facility_equipment", "noop"] {
            let inv = rec.invoke(name, Arguments::new(), None, at());
            rec.observe(inv, Outcome::Success, "ok", Value::Null);
        }
        let session = rec.close(SessionStatus::Completed, "done", at());
        let seqs: Vec<u32> = session.invocations().map(|i| i.sequence).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        for step in &session.steps {
            assert_eq!(step.invocation.sequence, step.observation.sequence);
        }
    }

    #[test]
    fn observe_overrides_stale_sequence() {
        let mut rec = SessionRecord::open("s-2", "g", at());
        let stale = rec.invoke("a", Arguments::new(), None, at());
        rec.observe(stale.clone(), Outcome::Success, "first", Value::Null);
        let step = rec.observe(stale, Outcome::Success, "second", Value::Null);
        assert_eq!(step.invocation.sequence, 2);
        assert_eq!(step.observation.sequence, 2);
    }

    #[test]
    fn failure_kinds_classify_agent_errors() {
        let not_found = AgentError::Store(StoreError::FacilityNotFound {
            facility_id: "FAC-ZZ-999".into(),
        });
        assert_eq!(FailureKind::of(&not_found), FailureKind::NotFound);
        let unavailable = AgentError::Store(StoreError::Unavailable {
            message: "down".into(),
        });
        assert_eq!(FailureKind::of(&unavailable), FailureKind::Collaborator);
        let bad = AgentError::InvalidArguments {
            capability: "x".into(),
            message: "y".into(),
        };
        assert_eq!(FailureKind::of(&bad), FailureKind::InvalidArguments);
        let slow = AgentError::CapabilityTimeout {
            capability: "x".into(),
            timeout_secs: 1,
        };
        assert_eq!(FailureKind::of(&slow), FailureKind::Timeout);
    }

    #[test]
    fn render_includes_status_and_failures() {
        let mut rec = SessionRecord::open("s-3", "audit FAC-ZZ-999", at());
        let inv = rec.invoke(
            "get_facility_equipment",
            args(json!({ "facility_id": "FAC-ZZ-999" })),
            Some("fetch inventory".into()),
            at(),
        );
        rec.observe(
            inv,
            Outcome::Failure {
                kind: FailureKind::NotFound,
            },
            "facility not found: FAC-ZZ-999",
            Value::Null,
        );
        rec.note("oracle timed out, retrying");
        let session = rec.close(SessionStatus::Completed, "Facility FAC-ZZ-999 does not exist.", at());
        let text = session.render();
        assert!(text.contains("[1] get_facility_equipment"));
        assert!(text.contains("(not found)"));
        assert!(text.contains("note: oracle timed out"));
        assert!(text.contains("Status: COMPLETED"));
    }

    #[test]
    fn status_serializes_with_tag() {
        let failed = SessionStatus::Failed {
            reason: "connection refused".into(),
        };
        let v = serde_json::to_value(&failed).unwrap();
        assert_eq!(v, json!({ "state": "failed", "reason": "connection refused" }));
        assert_eq!(
            serde_json::to_value(SessionStatus::Exhausted).unwrap(),
            json!({ "state": "exhausted" })
        );
    }
}
