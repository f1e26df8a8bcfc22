mod config;
mod stdin_reviewer;
mod summary;

use clap::{Parser, Subcommand};
use config::RcsdConfig;
use rcsd_agent::{build_backend, AgentInvoker};
use rcsd_core::{ExitCode, PipelineRun};
use rcsd_orchestrator::{cancel_pair, CancelSignal, Pipeline};
use rcsd_session::{FileRunJournal, FileRunStore, RunStore};
use std::path::PathBuf;
use std::sync::Arc;
use stdin_reviewer::StdinReviewer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "rcsd", about = "RCSD: research, consensus, spec and decompose pipeline")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "rcsd.toml")]
    config: PathBuf,

    /// Human-readable logs instead of JSON
    #[arg(long)]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new run for a topic
    Run {
        /// Natural-language topic to research
        topic: String,
    },
    /// Continue a persisted run from its current stage
    Resume {
        /// Run id
        run_id: Uuid,
    },
    /// Show stage, per-stage status and outcome of a run
    Status {
        /// Run id
        run_id: Uuid,
    },
    /// List active runs
    List,
    /// Print the exit-code table
    ExitCodes,
}

fn init_tracing(pretty: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if pretty {
        builder.init();
    } else {
        builder.json().init();
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.pretty);

    let code = match execute(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "rcsd failed");
            eprintln!("Error: {e:#}");
            1
        }
    };

    // Every path leaves through here: a stdin read abandoned by a timed-out
    // gate would otherwise block runtime shutdown.
    std::process::exit(code);
}

async fn execute(cli: Cli) -> anyhow::Result<i32> {
    if let Commands::ExitCodes = cli.command {
        println!("{}", summary::exit_code_table());
        return Ok(0);
    }

    let config = RcsdConfig::load(&cli.config).await?;
    let store = Arc::new(FileRunStore::new(config.runs_dir()).await?);

    let code = match cli.command {
        Commands::Run { topic } => {
            let pipeline = build_pipeline(&config, store).await?;
            let run = pipeline.run(&topic, cancel_on_ctrl_c()).await?;
            report(&run)?
        }
        Commands::Resume { run_id } => match load_run(store.as_ref(), run_id).await? {
            Err(code) => code,
            Ok(_) => {
                let pipeline = build_pipeline(&config, store).await?;
                let run = pipeline.resume(run_id, cancel_on_ctrl_c()).await?;
                report(&run)?
            }
        },
        Commands::Status { run_id } => match load_run(store.as_ref(), run_id).await? {
            Err(code) => code,
            Ok(run) => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&summary::run_status(&run))?
                );
                0
            }
        },
        Commands::List => {
            let ids = store.list().await?;
            if ids.is_empty() {
                eprintln!("No active runs.");
            }
            for id in ids {
                match store.load(id).await {
                    Ok(Some(run)) => println!("{id}  {}  {}", run.stage, run.topic),
                    Ok(None) => {}
                    Err(e) => warn!(run_id = %id, error = %e, "Skipping unreadable run"),
                }
            }
            0
        }
        Commands::ExitCodes => 0,
    };

    Ok(code)
}

async fn build_pipeline(config: &RcsdConfig, store: Arc<FileRunStore>) -> anyhow::Result<Pipeline> {
    let pipeline_config = config.pipeline_config()?;
    let journal = Arc::new(FileRunJournal::new(config.journal_dir()).await?);
    let invoker = AgentInvoker::new(build_backend(&config.agents));

    info!(
        backend = ?config.agents.backend,
        max_revisions = pipeline_config.max_revisions,
        gates = ?pipeline_config.gate_after,
        "Pipeline configured"
    );

    Ok(
        Pipeline::from_agents(pipeline_config, invoker, Arc::new(StdinReviewer::new()), store)?
            .with_journal(journal),
    )
}

/// Loads a run for `resume`/`status`.
///
/// An unreadable persisted run is reported as `INVALID_STAGE` instead of an
/// error.
async fn load_run(store: &dyn RunStore, run_id: Uuid) -> anyhow::Result<Result<PipelineRun, i32>> {
    match store.load(run_id).await {
        Ok(Some(run)) => Ok(Ok(run)),
        Ok(None) => Err(anyhow::anyhow!("Run {run_id} not found")),
        Err(e) => {
            error!(run_id = %run_id, error = %e, "Persisted run is unreadable");
            eprintln!("run {run_id}: {e}");
            Ok(Err(ExitCode::InvalidStage.code()))
        }
    }
}

fn cancel_on_ctrl_c() -> CancelSignal {
    let (handle, signal) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; aborting run");
            handle.cancel();
        }
    });
    signal
}

fn report(run: &PipelineRun) -> anyhow::Result<i32> {
    let summary = summary::run_summary(run);
    println!("{}", serde_json::to_string_pretty(&summary)?);
    let exit = summary::exit_code_of(run);
    if exit.is_success() {
        info!(run_id = %run.id, "Run completed");
    } else {
        warn!(run_id = %run.id, exit_code = exit.code(), exit_name = exit.name(), "Run aborted");
        if let Some(abort) = &run.abort {
            eprintln!("{abort}");
        }
    }
    Ok(summary.exit_code)
}
