//! Orchestration core of the RCSD pipeline.
//!
//! Drives a topic through Research, Consensus, Spec and Decompose, with a
//! five-validator consensus round and adversarial synthesis, human-in-the-loop
//! gates between stages, and exactly one exit code per run.
//!
//! # Main types
//!
//! - [`Pipeline`]: The stage machine. Persists the run after every transition.
//! - [`ConsensusEngine`]: Fans out to the five validators and adjudicates with synthesis.
//! - [`HitlGate`]: Single-use checkpoint waiting on a [`rcsd_core::ReviewerChannel`].
//! - [`TaskGraphBuilder`]: Validates decomposed tasks into a dependency-ordered DAG.
//! - [`PipelineConfig`]: Revision cap, timeouts and gate placement.

/// Run-level cancellation signal.
pub mod cancel;
/// Research, spec and decompose collaborators.
pub mod collaborators;
/// Pipeline configuration.
pub mod config;
/// Consensus engine, synthesis and verdict aggregation.
pub mod consensus;
/// Stage machine.
pub mod engine;
/// Human-in-the-loop gates and in-process reviewer channel.
pub mod hitl;
/// Agent names and system prompts.
pub mod profiles;
/// RFC 2119 spec validation.
pub mod spec_validation;
/// Task graph builder.
pub mod task_graph;
/// Consensus validators.
pub mod validators;

pub use cancel::{cancel_pair, CancelHandle, CancelSignal};
pub use collaborators::{
    AgentDecomposer, AgentResearcher, AgentSpecGenerator, Decomposer, Researcher, SpecGenerator,
    SpecValidator,
};
pub use config::{PipelineConfig, PipelineSettings, MAX_TIMEOUT};
pub use consensus::{aggregate, AgentSynthesizer, ConsensusEngine, Synthesizer};
pub use engine::{Collaborators, Pipeline};
pub use hitl::{HitlGate, PendingReviewChannel};
pub use profiles::{default_profiles, required_agents, AgentProfile};
pub use spec_validation::Rfc2119Validator;
pub use task_graph::{GraphError, TaskGraphBuilder};
pub use validators::{agent_validators, AgentValidator, Validator};
