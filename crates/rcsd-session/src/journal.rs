use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rcsd_core::{ExitCode, GateState, RcsdResult, Stage, Verdict};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// JournalEvent
// ---------------------------------------------------------------------------

/// A lifecycle event of a run, tagged by `type` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum JournalEvent {
    /// A new run was created.
    RunStarted {
        /// Topic the run researches.
        topic: String,
    },
    /// A persisted run was picked up again.
    RunResumed {
        /// Stage the run resumes at.
        stage: Stage,
    },
    /// Work on a stage began.
    StageEntered {
        /// The stage entered.
        stage: Stage,
    },
    /// A stage produced its artifact.
    StageCompleted {
        /// The stage completed.
        stage: Stage,
    },
    /// A consensus round finished.
    ConsensusRound {
        /// Revision count when the round ran.
        revision: u32,
        /// Aggregated verdict.
        overall: Verdict,
        /// Number of blocking findings left unresolved.
        unresolved: usize,
    },
    /// A HITL gate was published to the reviewer channel.
    GateOpened {
        /// Gate correlation id.
        gate_id: Uuid,
        /// Stage the gate follows.
        checkpoint: Stage,
    },
    /// A HITL gate left `Open`.
    GateResolved {
        /// Gate correlation id.
        gate_id: Uuid,
        /// Terminal gate state.
        state: GateState,
    },
    /// The run was aborted.
    RunAborted {
        /// Stage that failed.
        stage: Stage,
        /// Exit code the run ended with.
        exit_code: ExitCode,
        /// Human-readable cause.
        reason: String,
    },
    /// The run reached `DONE`.
    RunCompleted,
}

// ---------------------------------------------------------------------------
// JournalEntry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Run the event belongs to.
    pub run_id: Uuid,
    /// Position within the run's journal, starting at 0.
    pub seq: u64,
    /// When the event was recorded.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub event: JournalEvent,
}

// ---------------------------------------------------------------------------
// RunJournal trait
// ---------------------------------------------------------------------------

/// Append-only history of a run.
#[async_trait]
pub trait RunJournal: Send + Sync {
    /// Appends `event` and returns the stored entry with its sequence number.
    async fn append(&self, run_id: Uuid, event: JournalEvent) -> RcsdResult<JournalEntry>;
    /// All entries for a run, in sequence order.
    async fn read(&self, run_id: Uuid) -> RcsdResult<Vec<JournalEntry>>;
}

// ---------------------------------------------------------------------------
// FileRunJournal
// ---------------------------------------------------------------------------

pub struct FileRunJournal {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileRunJournal {
    pub async fn new(dir: PathBuf) -> RcsdResult<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    fn journal_path(&self, run_id: Uuid) -> PathBuf {
        self.dir.join(format!("{run_id}.journal.jsonl"))
    }

    async fn next_seq(&self, run_id: Uuid) -> RcsdResult<u64> {
        let path = self.journal_path(run_id);
        if !tokio::fs::try_exists(&path).await? {
            return Ok(0);
        }
        let data = tokio::fs::read_to_string(&path).await?;
        Ok(data.lines().filter(|l| !l.trim().is_empty()).count() as u64)
    }
}

#[async_trait]
impl RunJournal for FileRunJournal {
    async fn append(&self, run_id: Uuid, event: JournalEvent) -> RcsdResult<JournalEntry> {
        let _guard = self.write_lock.lock().await;
        let entry = JournalEntry {
            run_id,
            seq: self.next_seq(run_id).await?,
            timestamp: Utc::now(),
            event,
        };
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.journal_path(run_id))
            .await?;
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(entry)
    }

    async fn read(&self, run_id: Uuid) -> RcsdResult<Vec<JournalEntry>> {
        let path = self.journal_path(run_id);
        if !tokio::fs::try_exists(&path).await? {
            return Ok(Vec::new());
        }
        let data = tokio::fs::read_to_string(&path).await?;
        let mut entries: Vec<JournalEntry> = data
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(serde_json::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        entries.sort_by_key(|e| e.seq);
        Ok(entries)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn append_assigns_increasing_seq() {
        let tmp = TempDir::new().unwrap();
        let journal = FileRunJournal::new(tmp.path().to_path_buf()).await.unwrap();
        let run = Uuid::new_v4();

        let first = journal
            .append(run, JournalEvent::RunStarted { topic: "t".into() })
            .await
            .unwrap();
        let second = journal
            .append(run, JournalEvent::StageEntered { stage: Stage::Research })
            .await
            .unwrap();

        assert_eq!(first.seq, 0);
        assert_eq!(second.seq, 1);
    }

    #[tokio::test]
    async fn read_returns_entries_per_run() {
        let tmp = TempDir::new().unwrap();
        let journal = FileRunJournal::new(tmp.path().to_path_buf()).await.unwrap();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        journal.append(a, JournalEvent::RunStarted { topic: "a".into() }).await.unwrap();
        journal.append(b, JournalEvent::RunStarted { topic: "b".into() }).await.unwrap();
        journal.append(a, JournalEvent::RunCompleted).await.unwrap();

        let entries = journal.read(a).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].event, JournalEvent::RunCompleted);
        assert_eq!(journal.read(b).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn read_missing_run_is_empty() {
        let tmp = TempDir::new().unwrap();
        let journal = FileRunJournal::new(tmp.path().to_path_buf()).await.unwrap();
        assert!(journal.read(Uuid::new_v4()).await.unwrap().is_empty());
    }

    #[test]
    fn event_is_tagged_by_type() {
        let ev = JournalEvent::RunAborted {
            stage: Stage::Consensus,
            exit_code: ExitCode::ConsensusFailed,
            reason: "no agreement".into(),
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "RunAborted");
        assert_eq!(json["stage"], "CONSENSUS");
        assert_eq!(json["exit_code"], "CONSENSUS_FAILED");
    }
}
