use super::AgentBackend;
use crate::config::CommandSpec;
use crate::invoker::AgentPayload;
use async_trait::async_trait;
use rcsd_core::{RcsdError, RcsdResult};
use std::collections::BTreeMap;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;

/// Subprocess backend.
///
/// Spawns the program configured for the agent, writes the payload as JSON to
/// its stdin and returns its stdout. A non-zero exit status is an agent
/// error. The child is killed if the call is dropped (timeout, cancellation).
pub struct CommandBackend {
    commands: BTreeMap<String, CommandSpec>,
}

impl CommandBackend {
    pub fn new(commands: BTreeMap<String, CommandSpec>) -> Self {
        Self { commands }
    }
}

#[async_trait]
impl AgentBackend for CommandBackend {
    async fn call(&self, agent: &str, payload: &AgentPayload) -> RcsdResult<String> {
        let spec = self
            .commands
            .get(agent)
            .ok_or_else(|| RcsdError::Agent(format!("no command configured for agent '{agent}'")))?;

        let mut cmd = tokio::process::Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(&spec.env)
            .env("RCSD_AGENT", agent)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::info!(agent = %agent, program = %spec.program, "Command: spawning agent process");

        let mut child = cmd.spawn().map_err(|e| {
            RcsdError::Agent(format!("failed to spawn '{}': {e}", spec.program))
        })?;

        // Written from a separate task so a child that fills its stdout pipe
        // before draining stdin cannot deadlock the call.
        let input = serde_json::to_vec(payload)?;
        if let Some(mut stdin) = child.stdin.take() {
            let agent = agent.to_string();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&input).await {
                    tracing::debug!(agent = %agent, error = %e, "Command: stdin closed early");
                }
            });
        }

        let output = child.wait_with_output().await?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RcsdError::Agent(format!(
                "'{}' exited with {}: {}",
                spec.program,
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        Ok(stdout)
    }
}

#[cfg(all(test, unix))]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            env: BTreeMap::new(),
        }
    }

    fn backend(agent: &str, script: &str) -> CommandBackend {
        let mut commands = BTreeMap::new();
        commands.insert(agent.to_string(), sh(script));
        CommandBackend::new(commands)
    }

    #[tokio::test]
    async fn test_payload_is_piped_to_stdin() {
        let b = backend("echo", "cat");
        let payload = AgentPayload::new("sys", "do it");
        let out = b.call("echo", &payload).await.unwrap();
        let roundtrip: AgentPayload = serde_json::from_str(&out).unwrap();
        assert_eq!(roundtrip, payload);
    }

    #[tokio::test]
    async fn test_agent_name_is_exported() {
        let b = backend("research", "cat >/dev/null; printf '{\"agent\":\"%s\"}' \"$RCSD_AGENT\"");
        let out = b
            .call("research", &AgentPayload::new("s", "i"))
            .await
            .unwrap();
        assert_eq!(out, "{\"agent\":\"research\"}");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_error() {
        let b = backend("broken", "echo 'model crashed' >&2; exit 3");
        let err = b
            .call("broken", &AgentPayload::new("s", "i"))
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("exited with 3"));
        assert!(msg.contains("model crashed"));
    }

    #[tokio::test]
    async fn test_unknown_agent_is_error() {
        let b = backend("known", "cat");
        let err = b
            .call("unknown", &AgentPayload::new("s", "i"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no command configured"));
    }
}
