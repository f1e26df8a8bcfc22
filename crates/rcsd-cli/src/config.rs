use rcsd_agent::AgentBackendConfig;
use rcsd_core::RcsdResult;
use rcsd_orchestrator::{required_agents, PipelineConfig, PipelineSettings};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Contents of `rcsd.toml`. Every section is optional.
#[derive(Debug, Deserialize)]
pub struct RcsdConfig {
    /// Root of persisted runs and journals.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Stage machine settings.
    #[serde(default)]
    pub pipeline: PipelineSettings,
    /// Which backend runs the agents.
    #[serde(default)]
    pub agents: AgentBackendConfig,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

impl Default for RcsdConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            pipeline: PipelineSettings::default(),
            agents: AgentBackendConfig::default(),
        }
    }
}

impl RcsdConfig {
    /// Reads the config file; a missing file yields the defaults.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No config file; using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Failed to read config file '{}': {}",
                    path.display(),
                    e
                ))
            }
        };
        Self::parse(&raw)
            .map_err(|e| anyhow::anyhow!("Invalid config file '{}': {}", path.display(), e))
    }

    /// Parses TOML text without touching the filesystem.
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Validates both sections and resolves the pipeline settings.
    pub fn pipeline_config(&self) -> RcsdResult<PipelineConfig> {
        self.agents.validate(&required_agents())?;
        self.pipeline.to_config()
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.data_dir.join("runs")
    }

    pub fn journal_dir(&self) -> PathBuf {
        self.data_dir.join("journal")
    }
}
