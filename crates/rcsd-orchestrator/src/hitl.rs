use async_trait::async_trait;
use rcsd_core::{
    DecisionPayload, GateRecord, GateState, HitlDecision, HitlVerdict, RcsdError, RcsdResult,
    ReviewerChannel, Stage,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

/// A single-use human-in-the-loop checkpoint.
///
/// `OPEN -> {APPROVED, REJECTED, TIMED_OUT}`. The gate resolves on the first
/// of a reviewer decision or its deadline. Anything other than an explicit
/// approval resolves to a non-approving state.
pub struct HitlGate {
    id: Uuid,
    checkpoint: Stage,
    opened: bool,
    state: GateState,
    decision: Option<HitlDecision>,
}

impl HitlGate {
    /// A pending gate for the stage just completed.
    pub fn new(checkpoint: Stage) -> Self {
        Self {
            id: Uuid::new_v4(),
            checkpoint,
            opened: false,
            state: GateState::Open,
            decision: None,
        }
    }

    /// Correlation id carried by the decision payload.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The stage this gate follows.
    pub fn checkpoint(&self) -> Stage {
        self.checkpoint
    }

    /// `Open` until a decision, deadline or channel failure resolves it.
    pub fn state(&self) -> GateState {
        self.state
    }

    /// The decision that resolved the gate, if any.
    pub fn decision(&self) -> Option<&HitlDecision> {
        self.decision.as_ref()
    }

    /// Publishes `payload` to `channel` and waits up to `deadline`.
    ///
    /// Fails if the gate was already opened; a fresh gate is needed per
    /// checkpoint.
    pub async fn open(
        &mut self,
        channel: &dyn ReviewerChannel,
        mut payload: DecisionPayload,
        deadline: Duration,
    ) -> RcsdResult<GateState> {
        if self.opened {
            return Err(RcsdError::Gate(format!(
                "gate {} at {} was already opened ({:?})",
                self.id, self.checkpoint, self.state
            )));
        }
        self.opened = true;
        payload.gate_id = self.id;
        payload.checkpoint = self.checkpoint;

        info!(
            gate_id = %self.id,
            checkpoint = %self.checkpoint,
            deadline_secs = deadline.as_secs(),
            "HITL gate opened"
        );

        let outcome = tokio::time::timeout(deadline, channel.review(payload)).await;
        let (state, decision) = match outcome {
            Ok(Ok(Some(decision))) => {
                let state = match decision.verdict {
                    HitlVerdict::Approve => GateState::Approved,
                    HitlVerdict::Reject => GateState::Rejected,
                    HitlVerdict::Timeout => GateState::TimedOut,
                };
                (state, decision)
            }
            Ok(Ok(None)) => (
                GateState::TimedOut,
                HitlDecision::timeout("reviewer channel ended without a decision"),
            ),
            Ok(Err(e)) => {
                warn!(gate_id = %self.id, error = %e, "Reviewer channel failed; rejecting");
                (
                    GateState::Rejected,
                    HitlDecision::reject("system", Some(format!("reviewer channel failed: {e}"))),
                )
            }
            Err(_) => (
                GateState::TimedOut,
                HitlDecision::timeout(format!("no decision within {}s", deadline.as_secs())),
            ),
        };

        info!(
            gate_id = %self.id,
            checkpoint = %self.checkpoint,
            state = ?state,
            reviewer = %decision.reviewer,
            "HITL gate resolved"
        );
        self.state = state;
        self.decision = Some(decision);
        Ok(state)
    }

    /// The persisted form of a resolved gate.
    pub fn record(&self) -> Option<GateRecord> {
        if !self.state.is_resolved() {
            return None;
        }
        self.decision.as_ref().map(|decision| GateRecord {
            gate_id: self.id,
            checkpoint: self.checkpoint,
            state: self.state,
            decision: decision.clone(),
        })
    }
}

type PendingMap = HashMap<Uuid, (DecisionPayload, oneshot::Sender<HitlDecision>)>;

/// In-process reviewer channel.
///
/// Parks each payload until [`PendingReviewChannel::submit_decision`] is
/// called with its gate id. Embedders (a dashboard, a chat bridge) read the
/// pending payloads and route decisions back.
#[derive(Clone, Default)]
pub struct PendingReviewChannel {
    pending: Arc<RwLock<PendingMap>>,
}

impl PendingReviewChannel {
    /// An empty channel with no parked payloads.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers a decision to the gate waiting on `gate_id`.
    ///
    /// Returns `false` when no gate is waiting on that id.
    pub async fn submit_decision(&self, gate_id: Uuid, decision: HitlDecision) -> bool {
        let entry = self.pending.write().await.remove(&gate_id);
        match entry {
            Some((_, tx)) => {
                if tx.send(decision).is_err() {
                    warn!(gate_id = %gate_id, "Decision submitted but the gate stopped waiting");
                    return false;
                }
                info!(gate_id = %gate_id, "Decision delivered");
                true
            }
            None => {
                warn!(gate_id = %gate_id, "No pending review for this gate");
                false
            }
        }
    }

    /// Payloads still waiting for a decision.
    pub async fn pending(&self) -> Vec<DecisionPayload> {
        let pending = self.pending.read().await;
        let mut payloads: Vec<_> = pending.values().map(|(p, _)| p.clone()).collect();
        payloads.sort_by_key(|p| p.deadline);
        payloads
    }

    /// Number of gates currently waiting for a decision.
    pub async fn pending_count(&self) -> usize {
        self.pending.read().await.len()
    }
}

#[async_trait]
impl ReviewerChannel for PendingReviewChannel {
    async fn review(&self, payload: DecisionPayload) -> RcsdResult<Option<HitlDecision>> {
        let gate_id = payload.gate_id;
        let (tx, rx) = oneshot::channel();
        self.pending.write().await.insert(gate_id, (payload, tx));

        // Removes the entry when the gate stops waiting (deadline, cancel).
        let guard = PendingGuard {
            pending: Arc::clone(&self.pending),
            gate_id,
        };
        let decision = rx.await.ok();
        drop(guard);
        Ok(decision)
    }
}

struct PendingGuard {
    pending: Arc<RwLock<PendingMap>>,
    gate_id: Uuid,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.pending.try_write() {
            pending.remove(&self.gate_id);
        } else {
            let pending = Arc::clone(&self.pending);
            let gate_id = self.gate_id;
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    pending.write().await.remove(&gate_id);
                });
            }
        }
    }
}
