//! Transports that actually run an agent.

pub mod claude_code;
pub mod command;

use crate::config::{AgentBackendConfig, BackendKind};
use crate::invoker::AgentPayload;
use async_trait::async_trait;
use rcsd_core::RcsdResult;
use std::sync::Arc;

pub use claude_code::ClaudeCodeBackend;
pub use command::CommandBackend;

/// Trait for agent transports.
///
/// A backend runs the named agent once and returns its raw text output. It
/// does not enforce timeouts or parse output; the invoker does both.
///
/// To add a new transport:
/// 1. Create a new module in `backends/`
/// 2. Implement `AgentBackend` for your struct
/// 3. Add the variant to `BackendKind` in `config.rs`
/// 4. Wire it up in [`build_backend`]
#[async_trait]
pub trait AgentBackend: Send + Sync {
    /// Runs `agent` with `payload` and returns its raw output.
    async fn call(&self, agent: &str, payload: &AgentPayload) -> RcsdResult<String>;
}

/// Builds the backend selected by `config`.
pub fn build_backend(config: &AgentBackendConfig) -> Arc<dyn AgentBackend> {
    match config.backend {
        BackendKind::ClaudeCode => Arc::new(ClaudeCodeBackend::new(
            config.model_id.clone(),
            config.max_turns,
        )),
        BackendKind::Command => Arc::new(CommandBackend::new(config.commands.clone())),
    }
}
