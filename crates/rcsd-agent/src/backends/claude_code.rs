use super::AgentBackend;
use crate::invoker::AgentPayload;
use async_trait::async_trait;
use rcsd_core::{RcsdError, RcsdResult};

/// Claude Code CLI backend.
///
/// Runs the `claude` CLI in headless mode (`-p --output-format json`).
/// Uses the existing Claude Code login, so no API key is needed.
pub struct ClaudeCodeBackend {
    model_id: String,
    max_turns: u32,
}

impl ClaudeCodeBackend {
    pub fn new(model_id: String, max_turns: u32) -> Self {
        Self {
            model_id,
            max_turns,
        }
    }
}

/// Pulls the `result` text out of the CLI's JSON envelope.
///
/// The CLI may print progress lines before the envelope, so the last line
/// that parses as JSON wins.
pub fn parse_envelope(stdout: &str) -> RcsdResult<String> {
    let envelope: serde_json::Value = stdout
        .lines()
        .rev()
        .find_map(|line| serde_json::from_str(line).ok())
        .ok_or_else(|| {
            RcsdError::Agent(format!(
                "Could not parse Claude Code output as JSON. stdout: {}",
                stdout.chars().take(500).collect::<String>()
            ))
        })?;

    let is_error = envelope["is_error"].as_bool().unwrap_or(false);
    let result_text = envelope["result"].as_str().unwrap_or_default().to_string();

    if is_error {
        return Err(RcsdError::Agent(format!("Claude Code error: {result_text}")));
    }

    if let Some(cost) = envelope["total_cost_usd"].as_f64() {
        tracing::info!(
            cost_usd = cost,
            input_tokens = envelope["usage"]["input_tokens"].as_u64().unwrap_or(0),
            output_tokens = envelope["usage"]["output_tokens"].as_u64().unwrap_or(0),
            num_turns = envelope["num_turns"].as_u64().unwrap_or(0),
            "ClaudeCode: response received"
        );
    }

    Ok(result_text)
}

#[async_trait]
impl AgentBackend for ClaudeCodeBackend {
    async fn call(&self, agent: &str, payload: &AgentPayload) -> RcsdResult<String> {
        let prompt = payload.render_prompt();

        let mut cmd = tokio::process::Command::new("claude");
        cmd.arg("-p").arg(&prompt);
        cmd.arg("--output-format").arg("json");
        cmd.arg("--max-turns").arg(self.max_turns.to_string());

        if !self.model_id.is_empty() && self.model_id != "default" {
            cmd.arg("--model").arg(&self.model_id);
        }

        if !payload.system_prompt.is_empty() {
            cmd.arg("--append-system-prompt").arg(&payload.system_prompt);
        }

        cmd.arg("--permission-mode").arg("plan");
        cmd.arg("--no-session-persistence");
        cmd.kill_on_drop(true);

        tracing::info!(
            agent = %agent,
            prompt_len = prompt.len(),
            "ClaudeCode: spawning claude CLI"
        );

        let output = cmd.output().await.map_err(|e| {
            RcsdError::Agent(format!(
                "Failed to run 'claude' CLI. Is Claude Code installed? Error: {e}"
            ))
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            return Err(RcsdError::Agent(format!(
                "Claude Code CLI failed (exit {}): {}",
                output.status.code().unwrap_or(-1),
                stderr
            )));
        }

        parse_envelope(&stdout)
    }
}
