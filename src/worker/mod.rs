//! Execution worker and the isolated runtimes it drives.
//!
//! # Components
//!
//! - [`ExecutionWorker`]: owns one runtime; initialize once, execute many,
//!   destroy unconditionally
//! - [`Launcher`]: starts a runtime and returns its [`RuntimeChannel`]
//! - [`ProcessLauncher`]: the production launcher, a Python child process
//!   running the embedded pytest harness
//!
//! # Isolation
//!
//! A runtime shares no memory with its caller. Commands and events cross
//! the boundary over two ordered queues, and teardown is a kill switch
//! rather than a request: code still running inside a destroyed runtime is
//! simply orphaned with its process.

pub mod executor;
pub mod process;
pub mod runtime;

pub use executor::ExecutionWorker;
pub use process::ProcessLauncher;
pub use runtime::{Launcher, RuntimeChannel, RuntimeEndpoint};
