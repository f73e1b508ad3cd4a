//! Ollama-backed decision oracle.
//!
//! Each decision is one `/api/chat` round trip: a system prompt listing the
//! capability contracts, the goal, and the session so far rendered as
//! alternating decision/observation messages. The model must answer with a
//! single JSON decision object; anything else is a malformed decision and is
//! retried by the controller.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::oracle::{Decision, DecisionOracle, DecisionRequest, OracleError};

/// Connection settings for the Ollama server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    /// Base URL for the Ollama API.
    pub base_url: String,
    /// Model name to use.
    pub model: String,
    /// HTTP timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".into(),
            model: "llama3.2".into(),
            timeout_secs: 120,
        }
    }
}

/// A chat message for the `/api/chat` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role: "system", "user", or "assistant".
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Decision oracle backed by a local Ollama model.
pub struct OllamaOracle {
    config: OllamaConfig,
    agent: ureq::Agent,
}

impl OllamaOracle {
    pub fn new(config: OllamaConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build();
        Self { config, agent }
    }

    /// Check that the server answers on `/api/tags`.
    pub fn is_reachable(&self) -> bool {
        let url = format!("{}/api/tags", self.config.base_url);
        let agent = ureq::AgentBuilder::new()
            .timeout(std::time::Duration::from_secs(5))
            .build();
        matches!(agent.get(&url).call(), Ok(resp) if resp.status() == 200)
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn chat(&self, messages: &[ChatMessage]) -> Result<String, OracleError> {
        let url = format!("{}/api/chat", self.config.base_url);
        let body = json!({
            "model": self.config.model,
            "messages": messages,
            "stream": false,
            "format": "json",
        });

        let resp = self
            .agent
            .post(&url)
            .send_json(body)
            .map_err(|e| self.classify(e))?;

        let json: Value = resp.into_json().map_err(|e| OracleError::Malformed {
            message: e.to_string(),
        })?;
        json["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| OracleError::Malformed {
                message: "missing 'message.content' field".into(),
            })
    }

    fn classify(&self, err: ureq::Error) -> OracleError {
        match err {
            ureq::Error::Status(code, _) => OracleError::RequestFailed {
                message: format!("server returned status {code}"),
            },
            ureq::Error::Transport(t) => match t.kind() {
                ureq::ErrorKind::ConnectionFailed | ureq::ErrorKind::Dns => {
                    OracleError::Unavailable {
                        message: format!("{} ({t})", self.config.base_url),
                    }
                }
                _ if t.to_string().contains("timed out") => OracleError::Timeout {
                    timeout_secs: self.config.timeout_secs,
                },
                _ => OracleError::RequestFailed {
                    message: t.to_string(),
                },
            },
        }
    }
}

impl std::fmt::Debug for OllamaOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaOracle")
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .finish()
    }
}

impl DecisionOracle for OllamaOracle {
    fn name(&self) -> &str {
        "ollama"
    }

    fn decide(&self, request: &DecisionRequest) -> Result<Decision, OracleError> {
        let content = self.chat(&build_messages(request))?;
        parse_decision(&content)
    }
}

/// Render a decision request as chat messages.
pub fn build_messages(request: &DecisionRequest) -> Vec<ChatMessage> {
    let mut system = String::from(
        "You are a regulatory compliance auditor for oil and gas facilities. \
         You reach the user's goal by calling capabilities one at a time. \
         After each call you receive its observation.\n\n\
         Answer with exactly one JSON object and nothing else:\n\
         {\"decision\": \"invoke\", \"capability\": <name>, \"arguments\": {...}, \"reasoning\": <short text>}\n\
         or, when the goal is satisfied:\n\
         {\"decision\": \"finish\", \"answer\": <summary of findings and actions taken>}\n\n\
         For an audit: search the directives, get the equipment, check calibration compliance, \
         then for non-compliant equipment send one report, schedule a follow-up and log \
         one maintenance action per item.\n\nCapabilities:\n",
    );
    for c in request.contracts.iter() {
        system.push_str(&format!(
            "- {} [{}]: {}\n",
            c.signature(),
            c.side_effect,
            c.description
        ));
    }

    let mut messages = vec![
        ChatMessage::new("system", system),
        ChatMessage::new("user", format!("Goal: {}", request.goal)),
    ];
    for step in &request.history {
        let inv = &step.invocation;
        let decision = json!({
            "decision": "invoke",
            "capability": inv.capability,
            "arguments": inv.arguments,
        });
        messages.push(ChatMessage::new("assistant", decision.to_string()));

        let status = match step.observation.failure_kind() {
            None => "ok".to_string(),
            Some(kind) => format!("failed: {kind}"),
        };
        messages.push(ChatMessage::new(
            "user",
            format!(
                "Observation {} ({status}):\n{}",
                step.observation.sequence, step.observation.text
            ),
        ));
    }
    messages
}

/// Parse the model's reply into a decision.
///
/// Accepts the tagged form, a bare `{"capability": ..}` object or a bare
/// `{"answer": ..}` object, optionally surrounded by prose.
pub fn parse_decision(content: &str) -> Result<Decision, OracleError> {
    let trimmed = content.trim();
    let json_str = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(s), Some(e)) if e > s => &trimmed[s..=e],
        _ => {
            return Err(OracleError::Malformed {
                message: "no JSON object found in response".into(),
            });
        }
    };

    let value: Value = serde_json::from_str(json_str).map_err(|e| OracleError::Malformed {
        message: format!("JSON parse error: {e}"),
    })?;

    if value.get("decision").is_some() {
        return serde_json::from_value(value).map_err(|e| OracleError::Malformed {
            message: e.to_string(),
        });
    }
    if let Some(capability) = value.get("capability").and_then(Value::as_str) {
        return Ok(Decision::Invoke {
            capability: capability.to_string(),
            arguments: value
                .get("arguments")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
            reasoning: value
                .get("reasoning")
                .and_then(Value::as_str)
                .map(str::to_string),
        });
    }
    if let Some(answer) = value.get("answer").and_then(Value::as_str) {
        return Ok(Decision::finish(answer));
    }
    Err(OracleError::Malformed {
        message: "object has neither a capability nor an answer".into(),
    })
}
