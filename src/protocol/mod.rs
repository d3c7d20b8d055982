//! Vocabulary exchanged across the isolation boundary.
//!
//! - [`Command`]: caller → runtime (`init`, `run`)
//! - [`Event`]: runtime → caller (`ready`, `results`, `error`)
//! - [`ExecutionRequest`], [`ExecutionResult`], [`TestOutcome`]: the data
//!   carried by those messages and returned to callers
//!
//! Every message is a discrete JSON object tagged by `type`; the process
//! runtime frames them one per line.

pub mod message;
pub mod request;

pub use message::{Command, Event, RawResults};
pub use request::{ExecutionRequest, ExecutionResult, RunSummary, TestOutcome};
