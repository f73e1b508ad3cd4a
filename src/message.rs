//! Structured progress messages for audit sessions.
//!
//! The controller reports what it is doing as typed [`AuditMessage`]s instead
//! of printing. Sinks render them for a terminal, stream them as NDJSON, or
//! collect them in memory for tests.

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Mutex, MutexGuard, PoisonError};

// ── Message types ───────────────────────────────────────────────────────

/// A structured message emitted during a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AuditMessage {
    /// A session started.
    Goal { session: String, goal: String },
    /// The oracle chose a capability.
    Decision {
        session: String,
        sequence: u32,
        capability: String,
        arguments: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        reasoning: Option<String>,
    },
    /// A capability call finished.
    Observation {
        session: String,
        sequence: u32,
        capability: String,
        success: bool,
        text: String,
    },
    /// Something worth recording that is not an observation.
    Note { session: String, text: String },
    /// A session closed.
    Outcome {
        session: String,
        status: String,
        answer: String,
    },
    /// Informational output.
    System { text: String },
    /// Error message.
    Error {
        code: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        help: Option<String>,
    },
}

// ── MessageSink trait ───────────────────────────────────────────────────

/// A destination for audit messages.
pub trait MessageSink: Send + Sync {
    /// Emit a single message.
    fn emit(&self, msg: &AuditMessage);

    /// Emit a batch of messages.
    fn emit_batch(&self, msgs: &[AuditMessage]) {
        for m in msgs {
            self.emit(m);
        }
    }
}

// ── StdoutSink ──────────────────────────────────────────────────────────

/// Renders messages as terminal lines.
pub struct StdoutSink;

impl MessageSink for StdoutSink {
    fn emit(&self, msg: &AuditMessage) {
        match msg {
            AuditMessage::Goal { session, goal } => {
                println!("[{session}] goal: {goal}");
            }
            AuditMessage::Decision {
                sequence,
                capability,
                arguments,
                reasoning,
                ..
            } => {
                print!("  [{sequence}] {capability} {arguments}");
                if let Some(r) = reasoning {
                    print!("  ({r})");
                }
                println!();
            }
            AuditMessage::Observation {
                sequence,
                success,
                text,
                ..
            } => {
                let status = if *success { "ok" } else { "FAIL" };
                let first = text.lines().next().unwrap_or("");
                println!("  [{sequence}:{status}] {first}");
            }
            AuditMessage::Note { text, .. } => {
                println!("  note: {text}");
            }
            AuditMessage::Outcome {
                session,
                status,
                answer,
            } => {
                println!("[{session}] {status}\n{answer}");
            }
            AuditMessage::System { text } => {
                println!("{text}");
            }
            AuditMessage::Error {
                code,
                message,
                help,
            } => {
                eprintln!("[error:{code}] {message}");
                if let Some(h) = help {
                    eprintln!("  help: {h}");
                }
            }
        }
    }
}

// ── JsonSink ────────────────────────────────────────────────────────────

/// Emits messages as newline-delimited JSON.
pub struct JsonSink;

impl MessageSink for JsonSink {
    fn emit(&self, msg: &AuditMessage) {
        if let Ok(json) = serde_json::to_string(msg) {
            println!("{json}");
        }
    }
}

// ── NullSink ────────────────────────────────────────────────────────────

/// Discards everything.
pub struct NullSink;

impl MessageSink for NullSink {
    fn emit(&self, _msg: &AuditMessage) {}
}

// ── VecSink ─────────────────────────────────────────────────────────────

/// Collects messages for testing.
#[derive(Default)]
pub struct VecSink {
    messages: Mutex<Vec<AuditMessage>>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, Vec<AuditMessage>> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get all collected messages.
    pub fn messages(&self) -> Vec<AuditMessage> {
        self.guard().clone()
    }

    /// Messages belonging to one session.
    pub fn for_session(&self, id: &str) -> Vec<AuditMessage> {
        self.guard()
            .iter()
            .filter(|m| m.session() == Some(id))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MessageSink for VecSink {
    fn emit(&self, msg: &AuditMessage) {
        self.guard().push(msg.clone());
    }
}

// ── Convenience constructors ────────────────────────────────────────────

impl AuditMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self::System { text: text.into() }
    }

    /// An error event carrying a diagnostic's code and help text.
    pub fn from_diagnostic(err: &dyn Diagnostic) -> Self {
        Self::Error {
            code: err
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "audit".into()),
            message: err.to_string(),
            help: err.help().map(|h| h.to_string()),
        }
    }

    pub fn note(session: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Note {
            session: session.into(),
            text: text.into(),
        }
    }

    /// Session id, for session-scoped messages.
    pub fn session(&self) -> Option<&str> {
        match self {
            Self::Goal { session, .. }
            | Self::Decision { session, .. }
            | Self::Observation { session, .. }
            | Self::Note { session, .. }
            | Self::Outcome { session, .. } => Some(session),
            Self::System { .. } | Self::Error { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_sink_collects_messages() {
        let sink = VecSink::new();
        sink.emit(&AuditMessage::system("hello"));
        sink.emit(&AuditMessage::note("s-1", "oracle retry"));
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.for_session("s-1").len(), 1);
    }

    #[test]
    fn message_serializes_with_type_tag() {
        let msg = AuditMessage::Observation {
            session: "s-1".into(),
            sequence: 3,
            capability: "check_calibration_compliance".into(),
            success: true,
            text: "ALL EQUIPMENT IS COMPLIANT".into(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"Observation\""));
        assert!(json.contains("\"sequence\":3"));
    }

    #[test]
    fn message_deserializes_from_json() {
        let json = r#"{"type":"System","text":"hello"}"#;
        let msg: AuditMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(msg, AuditMessage::System { text } if text == "hello"));
    }

    #[test]
    fn error_event_keeps_diagnostic_code_and_help() {
        let err = crate::error::AuditError::ConfigExists {
            path: "/tmp/config.toml".into(),
        };
        let msg = AuditMessage::from_diagnostic(&err);
        assert_eq!(
            msg,
            AuditMessage::Error {
                code: "audit::cli::config_exists".into(),
                message: "config already exists: /tmp/config.toml".into(),
                help: Some("Pass --force to overwrite it.".into()),
            }
        );

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"Error\""));
    }

    #[test]
    fn batch_emit() {
        let sink = VecSink::new();
        sink.emit_batch(&[
            AuditMessage::system("one"),
            AuditMessage::system("two"),
            AuditMessage::system("three"),
        ]);
        assert_eq!(sink.len(), 3);
    }
}
