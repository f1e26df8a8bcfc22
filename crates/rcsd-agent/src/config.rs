use rcsd_core::{RcsdError, RcsdResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which transport runs the agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Use the local `claude` CLI in headless mode (-p --output-format json).
    /// No API key needed; uses the existing Claude Code login.
    ClaudeCode,
    /// Run one configured program per agent; payload on stdin, JSON on stdout.
    Command,
}

/// A program that plays one agent for the `command` backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Executable to spawn.
    pub program: String,
    /// Arguments passed verbatim.
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// The `[agents]` section of the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentBackendConfig {
    #[serde(default = "default_backend")]
    pub backend: BackendKind,
    /// Model passed to the Claude Code CLI; `default` lets the CLI choose.
    #[serde(default = "default_model_id")]
    pub model_id: String,
    /// Turn cap passed to the Claude Code CLI.
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    /// Agent name -> program, for the `command` backend.
    #[serde(default)]
    pub commands: BTreeMap<String, CommandSpec>,
}

fn default_backend() -> BackendKind {
    BackendKind::ClaudeCode
}

fn default_model_id() -> String {
    "default".to_string()
}

fn default_max_turns() -> u32 {
    10
}

impl Default for AgentBackendConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            model_id: default_model_id(),
            max_turns: default_max_turns(),
            commands: BTreeMap::new(),
        }
    }
}

impl AgentBackendConfig {
    /// Checks that the backend can serve every agent in `required_agents`.
    pub fn validate(&self, required_agents: &[&str]) -> RcsdResult<()> {
        if self.max_turns == 0 {
            return Err(RcsdError::Config("agents.max_turns must be > 0".into()));
        }
        if self.backend == BackendKind::Command {
            let missing: Vec<&str> = required_agents
                .iter()
                .copied()
                .filter(|name| !self.commands.contains_key(*name))
                .collect();
            if !missing.is_empty() {
                return Err(RcsdError::Config(format!(
                    "command backend has no command for agent(s): {}",
                    missing.join(", ")
                )));
            }
        }
        Ok(())
    }
}
