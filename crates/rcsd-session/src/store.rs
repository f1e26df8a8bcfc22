use async_trait::async_trait;
use rcsd_core::{PipelineRun, RcsdError, RcsdResult};
use std::path::PathBuf;
use tracing::info;
use uuid::Uuid;

/// Durable storage for pipeline runs, keyed by run id.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Creates or overwrites the stored state of `run`.
    async fn save(&self, run: &PipelineRun) -> RcsdResult<()>;
    /// Loads a run, active or archived.
    async fn load(&self, id: Uuid) -> RcsdResult<Option<PipelineRun>>;
    /// Ids of active (non-archived) runs.
    async fn list(&self) -> RcsdResult<Vec<Uuid>>;
    /// Moves a terminal run out of the active set.
    async fn archive(&self, id: Uuid) -> RcsdResult<()>;
    /// Removes a run entirely.
    async fn delete(&self, id: Uuid) -> RcsdResult<()>;
}

/// File-based run store: one pretty-printed JSON document per run.
///
/// Active runs live in `<dir>/<id>.json`, archived ones in
/// `<dir>/archive/<id>.json`. Writes go to a temp file first and are renamed
/// into place so a crash never leaves a half-written run.
pub struct FileRunStore {
    dir: PathBuf,
}

impl FileRunStore {
    pub async fn new(dir: PathBuf) -> RcsdResult<Self> {
        tokio::fs::create_dir_all(dir.join("archive")).await?;
        Ok(Self { dir })
    }

    fn run_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn archive_path(&self, id: Uuid) -> PathBuf {
        self.dir.join("archive").join(format!("{id}.json"))
    }

    async fn read(path: PathBuf) -> RcsdResult<Option<PipelineRun>> {
        if !tokio::fs::try_exists(&path).await? {
            return Ok(None);
        }
        let data = tokio::fs::read_to_string(&path).await?;
        let run = serde_json::from_str(&data).map_err(|e| {
            RcsdError::Store(format!("Failed to parse run {}: {e}", path.display()))
        })?;
        Ok(Some(run))
    }
}

#[async_trait]
impl RunStore for FileRunStore {
    async fn save(&self, run: &PipelineRun) -> RcsdResult<()> {
        let path = self.run_path(run.id);
        let tmp = self.dir.join(format!("{}.json.tmp", run.id));
        let json = serde_json::to_string_pretty(run)?;
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn load(&self, id: Uuid) -> RcsdResult<Option<PipelineRun>> {
        if let Some(run) = Self::read(self.run_path(id)).await? {
            return Ok(Some(run));
        }
        Self::read(self.archive_path(id)).await
    }

    async fn list(&self) -> RcsdResult<Vec<Uuid>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if let Some(stem) = name.strip_suffix(".json") {
                    if let Ok(id) = Uuid::parse_str(stem) {
                        ids.push(id);
                    }
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn archive(&self, id: Uuid) -> RcsdResult<()> {
        let from = self.run_path(id);
        if !tokio::fs::try_exists(&from).await? {
            return Err(RcsdError::Store(format!("No active run {id} to archive")));
        }
        tokio::fs::rename(&from, self.archive_path(id)).await?;
        info!(run_id = %id, "Run archived");
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> RcsdResult<()> {
        for path in [self.run_path(id), self.archive_path(id)] {
            if tokio::fs::try_exists(&path).await? {
                tokio::fs::remove_file(path).await?;
            }
        }
        Ok(())
    }
}
