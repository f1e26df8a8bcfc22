//! Agent invocation for the RCSD pipeline.
//!
//! The [`AgentInvoker`] runs one named agent with a payload and a timeout and
//! reports either parsed JSON output or a typed [`AgentFailure`]. It never
//! retries; retry policy belongs to the caller. Concrete transports live in
//! [`backends`].

pub mod backends;
pub mod config;
pub mod invoker;

pub use backends::{build_backend, AgentBackend};
pub use config::{AgentBackendConfig, BackendKind, CommandSpec};
pub use invoker::{extract_json, AgentFailure, AgentInvoker, AgentPayload};
