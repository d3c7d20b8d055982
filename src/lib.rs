//! Sandboxed execution orchestrator.
//!
//! Runs untrusted Python solutions against pytest suites inside an isolated
//! runtime, one request at a time, with a hard deadline and forced teardown
//! on overrun.
//!
//! - [`protocol`]: commands, events and the request/result data model
//! - [`parser`]: raw runtime output → test outcomes
//! - [`status`]: lifecycle state machine with ordered observers
//! - [`worker`]: the execution worker and runtime launchers
//! - [`coordinator`]: single-flight submit policy, deadline, teardown
//! - [`session`]: rebuilds poisoned orchestrators for the next caller

pub mod config;
pub mod coordinator;
pub mod error;
pub mod parser;
pub mod protocol;
pub mod session;
pub mod shutdown;
pub mod status;
pub mod worker;

pub use coordinator::Orchestrator;
pub use error::{OrchestratorError, Result};
pub use protocol::{ExecutionRequest, ExecutionResult, TestOutcome};
pub use session::Session;
pub use status::WorkerStatus;
