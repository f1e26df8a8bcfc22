use crate::backends::AgentBackend;
use rcsd_core::RcsdError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// What an agent is asked to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentPayload {
    /// Role instructions for the agent.
    pub system_prompt: String,
    /// The task for this call.
    pub instructions: String,
    /// Structured context (artifacts, verdicts, guidance).
    #[serde(default)]
    pub context: serde_json::Value,
}

impl AgentPayload {
    /// Creates a payload without context.
    pub fn new(system_prompt: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            instructions: instructions.into(),
            context: serde_json::Value::Null,
        }
    }

    /// Attaches structured context.
    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }

    /// Renders instructions and context as one prompt for text-only transports.
    pub fn render_prompt(&self) -> String {
        let mut prompt = self.instructions.clone();
        if !self.context.is_null() {
            let context =
                serde_json::to_string_pretty(&self.context).unwrap_or_else(|_| "{}".to_string());
            prompt.push_str("\n\nCONTEXT (JSON):\n");
            prompt.push_str(&context);
        }
        prompt.push_str("\n\nRespond with a single JSON object and nothing else.");
        prompt
    }
}

/// Typed failure of a single agent invocation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AgentFailure {
    /// No result within the timeout.
    #[error("AGENT_TIMEOUT: {agent} did not answer within {timeout_ms} ms")]
    Timeout {
        /// The agent that timed out.
        agent: String,
        /// The budget it was given.
        timeout_ms: u64,
    },
    /// The agent reported an internal failure or could not be started.
    #[error("AGENT_ERROR: {agent}: {message}")]
    Error {
        /// The failing agent.
        agent: String,
        /// What went wrong.
        message: String,
    },
    /// The agent answered, but the answer fails schema validation.
    #[error("AGENT_MALFORMED_OUTPUT: {agent}: {message}")]
    MalformedOutput {
        /// The agent whose output was rejected.
        agent: String,
        /// Why it was rejected.
        message: String,
    },
}

impl AgentFailure {
    /// Stable failure kind, e.g. `AGENT_TIMEOUT`.
    pub fn kind(&self) -> &'static str {
        match self {
            AgentFailure::Timeout { .. } => "AGENT_TIMEOUT",
            AgentFailure::Error { .. } => "AGENT_ERROR",
            AgentFailure::MalformedOutput { .. } => "AGENT_MALFORMED_OUTPUT",
        }
    }

    /// The agent the failure belongs to.
    pub fn agent(&self) -> &str {
        match self {
            AgentFailure::Timeout { agent, .. }
            | AgentFailure::Error { agent, .. }
            | AgentFailure::MalformedOutput { agent, .. } => agent,
        }
    }

    /// Shorthand for a malformed-output failure.
    pub fn malformed(agent: impl Into<String>, message: impl Into<String>) -> Self {
        AgentFailure::MalformedOutput {
            agent: agent.into(),
            message: message.into(),
        }
    }
}

impl From<AgentFailure> for RcsdError {
    fn from(failure: AgentFailure) -> Self {
        RcsdError::Agent(failure.to_string())
    }
}

/// Extracts a JSON value from agent text output.
///
/// Accepts bare JSON, a fenced ```json block, or the outermost `{...}` span
/// of surrounding prose.
pub fn extract_json(text: &str) -> Option<serde_json::Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after[body_start..];
        if let Some(end) = body.find("```") {
            if let Ok(value) = serde_json::from_str(body[..end].trim()) {
                return Some(value);
            }
        }
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&trimmed[start..=end]).ok()
}

/// Runs named agents through a backend, one call at a time, with a timeout.
#[derive(Clone)]
pub struct AgentInvoker {
    backend: Arc<dyn AgentBackend>,
}

impl AgentInvoker {
    /// Creates an invoker over `backend`.
    pub fn new(backend: Arc<dyn AgentBackend>) -> Self {
        Self { backend }
    }

    /// Invokes `agent` and returns its output as JSON.
    ///
    /// The backend call is dropped when `timeout` elapses, which kills any
    /// subprocess it spawned.
    pub async fn invoke(
        &self,
        agent: &str,
        payload: &AgentPayload,
        timeout: Duration,
    ) -> Result<serde_json::Value, AgentFailure> {
        if timeout.is_zero() {
            return Err(AgentFailure::Error {
                agent: agent.to_string(),
                message: "timeout must be greater than zero".to_string(),
            });
        }

        let start = Instant::now();
        let result = tokio::time::timeout(timeout, self.backend.call(agent, payload)).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let outcome = match result {
            Ok(Ok(text)) => extract_json(&text).ok_or_else(|| {
                AgentFailure::malformed(
                    agent,
                    format!(
                        "output is not JSON: {}",
                        text.chars().take(200).collect::<String>()
                    ),
                )
            }),
            Ok(Err(e)) => Err(AgentFailure::Error {
                agent: agent.to_string(),
                message: e.to_string(),
            }),
            Err(_) => Err(AgentFailure::Timeout {
                agent: agent.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        };

        match &outcome {
            Ok(_) => info!(agent = %agent, duration_ms, "Agent call succeeded"),
            Err(failure) => warn!(
                agent = %agent,
                duration_ms,
                kind = failure.kind(),
                error = %failure,
                "Agent call failed"
            ),
        }
        outcome
    }

    /// Invokes `agent` and deserializes its output into `T`.
    ///
    /// Output that does not match `T` is reported as
    /// [`AgentFailure::MalformedOutput`].
    pub async fn invoke_as<T: DeserializeOwned>(
        &self,
        agent: &str,
        payload: &AgentPayload,
        timeout: Duration,
    ) -> Result<T, AgentFailure> {
        let value = self.invoke(agent, payload, timeout).await?;
        serde_json::from_value(value)
            .map_err(|e| AgentFailure::malformed(agent, format!("schema mismatch: {e}")))
    }
}
