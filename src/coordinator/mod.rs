//! Request coordination: the only component callers talk to directly.
//!
//! [`Orchestrator::spawn`] starts a [`Coordinator`](actor::Coordinator) task
//! that owns the status machine and one [`ExecutionWorker`]. The returned
//! handle is cheap to clone; every clone talks to the same task.
//!
//! # Submit policy
//!
//! 1. Anything but `Ready` is rejected with `NotReady` and never reaches the
//!    runtime.
//! 2. `Ready → Running`, deadline armed.
//! 3. Results before the deadline: parse, `Running → Ready`, resolve.
//! 4. Runtime-reported error before the deadline: `Running → Ready`, reject
//!    with the runtime's message.
//! 5. Deadline first, or the runtime vanishes: `Running → Error`, runtime
//!    destroyed, reject. The instance stays poisoned.
//!
//! The coordinator never rebuilds its worker; see
//! [`Session`](crate::session::Session) for that.

pub mod actor;

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, Result};
use crate::protocol::{ExecutionRequest, ExecutionResult};
use crate::status::{StatusMachine, Subscription, WorkerStatus};
use crate::worker::{ExecutionWorker, Launcher};

pub use actor::{Coordinator, CoordinatorMessage};

/// Handle to a running coordinator.
#[derive(Clone)]
pub struct Orchestrator {
    mailbox: mpsc::Sender<CoordinatorMessage>,
    status: Arc<StatusMachine>,
}

impl Orchestrator {
    /// Start a coordinator in `Idle`. Must be called within a tokio runtime.
    pub fn spawn(config: OrchestratorConfig, launcher: Arc<dyn Launcher>) -> Self {
        let (mailbox, rx) = mpsc::channel(config.mailbox_capacity.max(1));
        let status = Arc::new(StatusMachine::new());
        let coordinator = Coordinator::new(
            config,
            status.clone(),
            ExecutionWorker::new(launcher),
            rx,
        );
        tokio::spawn(coordinator.run());
        Self { mailbox, status }
    }

    pub fn status(&self) -> WorkerStatus {
        self.status.current()
    }

    /// Observe status transitions. The observer is called immediately with
    /// the current status, then on every transition, on the coordinator's
    /// task.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(WorkerStatus) + Send + Sync + 'static,
    {
        self.status.subscribe(observer)
    }

    /// Load the runtime.
    ///
    /// Concurrent callers share one load. Returns immediately once the
    /// runtime is up, and `Poisoned` once the instance has failed.
    pub async fn initialize(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.request(CoordinatorMessage::Initialize { reply }).await?;
        rx.await.map_err(|_| OrchestratorError::Shutdown)?
    }

    /// Run `request` against the runtime.
    pub async fn submit(&self, request: ExecutionRequest) -> Result<ExecutionResult> {
        let (reply, rx) = oneshot::channel();
        self.request(CoordinatorMessage::Submit { request, reply })
            .await?;
        rx.await.map_err(|_| OrchestratorError::Shutdown)?
    }

    /// Tear down the runtime and stop the coordinator. An in-flight submit
    /// is rejected with `Shutdown`.
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        if self
            .request(CoordinatorMessage::Shutdown { reply })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }

    /// Whether the coordinator task has stopped.
    pub fn is_closed(&self) -> bool {
        self.mailbox.is_closed()
    }

    /// Whether both handles talk to the same coordinator.
    pub fn same_instance(&self, other: &Orchestrator) -> bool {
        Arc::ptr_eq(&self.status, &other.status)
    }

    async fn request(&self, message: CoordinatorMessage) -> Result<()> {
        self.mailbox
            .send(message)
            .await
            .map_err(|_| OrchestratorError::Shutdown)
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("status", &self.status.current())
            .field("closed", &self.mailbox.is_closed())
            .finish()
    }
}
