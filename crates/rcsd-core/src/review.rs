//! Reviewer channel contract for human-in-the-loop (HITL) gates.
//!
//! The trait lives in `rcsd-core` so that both the orchestrator (which owns
//! the gate state machine) and the CLI (which implements a terminal reviewer)
//! can share it without circular deps.

use crate::models::{DecisionPayload, HitlDecision};
use crate::RcsdResult;
use async_trait::async_trait;

/// Channel through which decision payloads are published and decisions received.
///
/// Implementations can be CLI prompts, in-process queues, chat bots, etc.
/// The gate bounds every call with its own deadline, so implementations may
/// wait indefinitely. Returning `Ok(None)` means the channel will never
/// produce a decision for this payload.
#[async_trait]
pub trait ReviewerChannel: Send + Sync {
    /// Publishes `payload` and waits for the reviewer's decision.
    async fn review(&self, payload: DecisionPayload) -> RcsdResult<Option<HitlDecision>>;
}
