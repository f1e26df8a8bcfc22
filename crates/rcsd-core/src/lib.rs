//! Core types and error definitions for the RCSD pipeline.
//!
//! This crate provides the types shared across all RCSD crates: the pipeline
//! data model, the process-boundary exit codes, the reviewer channel contract
//! and the unified error type.
//!
//! # Main types
//!
//! - [`RcsdError`]: Unified error enum for all pipeline subsystems.
//! - [`RcsdResult`]: Convenience alias for `Result<T, RcsdError>`.
//! - [`ExitCode`]: Stable exit codes reported when a run terminates.
//! - [`PipelineRun`]: One end-to-end execution and the artifacts it owns.
//! - [`ConsensusReport`]: Adjudicated outcome of a consensus round.
//! - [`ReviewerChannel`]: Where HITL decision payloads are sent.

/// Stable exit codes for terminated runs.
pub mod exit;
/// Pipeline data model.
pub mod models;
/// Reviewer channel contract for human-in-the-loop gates.
pub mod review;

pub use exit::ExitCode;
pub use models::*;
pub use review::ReviewerChannel;

// --- Error types ---

/// Top-level error type for the RCSD pipeline.
///
/// Each variant corresponds to a subsystem that can produce errors.
#[derive(Debug, thiserror::Error)]
pub enum RcsdError {
    /// An agent invocation failed (timeout, internal error or malformed output).
    #[error("Agent error: {0}")]
    Agent(String),

    /// A research, spec or decompose collaborator failed.
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    /// The consensus engine could not produce a report.
    #[error("Consensus error: {0}")]
    Consensus(String),

    /// A HITL gate was misused or its reviewer channel failed.
    #[error("Gate error: {0}")]
    Gate(String),

    /// Run persistence failed.
    #[error("Store error: {0}")]
    Store(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// An unrecognized stage or verdict, or an illegal stage transition.
    #[error("Invalid stage: {0}")]
    InvalidStage(String),

    /// The run-level cancellation signal fired.
    #[error("Pipeline cancelled")]
    Cancelled,

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`RcsdError`].
pub type RcsdResult<T> = Result<T, RcsdError>;
