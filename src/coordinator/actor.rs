use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, Result};
use crate::parser::parse_outcomes;
use crate::protocol::{ExecutionRequest, ExecutionResult, RawResults};
use crate::status::{StatusMachine, WorkerStatus};
use crate::worker::ExecutionWorker;

/// Deadline used when the configured timeout does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Messages accepted by the coordinator task
#[derive(Debug)]
pub enum CoordinatorMessage {
    Initialize {
        reply: oneshot::Sender<Result<()>>,
    },
    Submit {
        request: ExecutionRequest,
        reply: oneshot::Sender<Result<ExecutionResult>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

enum RunOutcome {
    Settled(Result<RawResults>),
    TimedOut,
    Shutdown(oneshot::Sender<()>),
}

/// Single owner of the status machine and the worker.
///
/// Runs as one task. While a load or a run is in flight it keeps reading
/// its mailbox, so competing callers are turned away immediately instead of
/// queueing behind the runtime.
pub struct Coordinator {
    config: OrchestratorConfig,
    status: Arc<StatusMachine>,
    worker: ExecutionWorker,
    mailbox: mpsc::Receiver<CoordinatorMessage>,
}

impl Coordinator {
    pub fn new(
        config: OrchestratorConfig,
        status: Arc<StatusMachine>,
        worker: ExecutionWorker,
        mailbox: mpsc::Receiver<CoordinatorMessage>,
    ) -> Self {
        Self {
            config,
            status,
            worker,
            mailbox,
        }
    }

    pub async fn run(mut self) {
        while let Some(message) = self.mailbox.recv().await {
            let flow = match message {
                CoordinatorMessage::Initialize { reply } => match self.status.current() {
                    WorkerStatus::Idle => self.load(reply).await,
                    WorkerStatus::Error => {
                        let _ = reply.send(Err(OrchestratorError::Poisoned));
                        Flow::Continue
                    }
                    _ => {
                        let _ = reply.send(Ok(()));
                        Flow::Continue
                    }
                },
                CoordinatorMessage::Submit { request, reply } => {
                    let status = self.status.current();
                    if status == WorkerStatus::Ready {
                        self.execute(request, reply).await
                    } else {
                        tracing::debug!(status = %status, "Rejecting submit, runtime not ready");
                        let _ = reply.send(Err(OrchestratorError::NotReady(status)));
                        Flow::Continue
                    }
                }
                CoordinatorMessage::Shutdown { reply } => {
                    if self.status.current() == WorkerStatus::Ready {
                        self.status.transition(WorkerStatus::Idle);
                    }
                    self.worker.destroy();
                    let _ = reply.send(());
                    Flow::Stop
                }
            };
            if flow == Flow::Stop {
                break;
            }
        }
        self.worker.destroy();
        tracing::debug!(status = %self.status.current(), "Coordinator stopped");
    }

    async fn load(&mut self, first: oneshot::Sender<Result<()>>) -> Flow {
        self.status.transition(WorkerStatus::Loading);
        tracing::info!("Loading runtime");

        let mut waiters = vec![first];
        let mut shutdown = None;
        let outcome = {
            let init = self.worker.initialize();
            tokio::pin!(init);
            loop {
                tokio::select! {
                    result = &mut init => break result,
                    message = self.mailbox.recv() => match message {
                        Some(CoordinatorMessage::Initialize { reply }) => waiters.push(reply),
                        Some(CoordinatorMessage::Submit { reply, .. }) => {
                            let _ = reply.send(Err(OrchestratorError::NotReady(WorkerStatus::Loading)));
                        }
                        Some(CoordinatorMessage::Shutdown { reply }) => {
                            shutdown = Some(reply);
                            break Err(OrchestratorError::Shutdown);
                        }
                        None => break Err(OrchestratorError::Shutdown),
                    },
                }
            }
        };

        let flow = match outcome {
            Ok(()) => {
                self.status.transition(WorkerStatus::Ready);
                for waiter in waiters {
                    let _ = waiter.send(Ok(()));
                }
                Flow::Continue
            }
            Err(e) => {
                tracing::error!(error = %e, "Runtime load failed");
                self.status.transition(WorkerStatus::Error);
                self.worker.destroy();
                for waiter in waiters {
                    let _ = waiter.send(Err(e.clone()));
                }
                if e == OrchestratorError::Shutdown {
                    Flow::Stop
                } else {
                    Flow::Continue
                }
            }
        };
        if let Some(reply) = shutdown {
            let _ = reply.send(());
        }
        flow
    }

    async fn execute(
        &mut self,
        request: ExecutionRequest,
        reply: oneshot::Sender<Result<ExecutionResult>>,
    ) -> Flow {
        let run_id = Uuid::new_v4();
        let timeout = self.config.execution_timeout;
        self.status.transition(WorkerStatus::Running);
        tracing::info!(
            run_id = %run_id,
            module = %request.module_name,
            test_file = %request.test_file_name,
            level = ?request.level_filter,
            "Running tests"
        );

        let now = Instant::now();
        let deadline = now
            .checked_add(timeout)
            .unwrap_or_else(|| now + FAR_FUTURE);
        let mut mailbox_open = true;
        let outcome = {
            let run = self.worker.execute(&request);
            tokio::pin!(run);
            let expiry = tokio::time::sleep_until(deadline);
            tokio::pin!(expiry);
            loop {
                tokio::select! {
                    biased;

                    result = &mut run => break RunOutcome::Settled(result),
                    _ = &mut expiry => break RunOutcome::TimedOut,
                    message = self.mailbox.recv(), if mailbox_open => match message {
                        Some(CoordinatorMessage::Submit { reply, .. }) => {
                            let _ = reply.send(Err(OrchestratorError::NotReady(WorkerStatus::Running)));
                        }
                        Some(CoordinatorMessage::Initialize { reply }) => {
                            let _ = reply.send(Ok(()));
                        }
                        Some(CoordinatorMessage::Shutdown { reply }) => {
                            break RunOutcome::Shutdown(reply);
                        }
                        None => mailbox_open = false,
                    },
                }
            }
        };

        match outcome {
            RunOutcome::Settled(Ok(raw)) => {
                let outcomes = parse_outcomes(&raw.raw_output);
                let result = ExecutionResult {
                    exit_code: raw.exit_code,
                    outcomes,
                    raw_output: raw.raw_output,
                };
                let summary = result.summary();
                tracing::info!(
                    run_id = %run_id,
                    exit_code = result.exit_code,
                    passed = summary.passed,
                    total = summary.total,
                    "Run completed"
                );
                self.status.transition(WorkerStatus::Ready);
                let _ = reply.send(Ok(result));
                Flow::Continue
            }
            RunOutcome::Settled(Err(e)) if e.poisons_instance() => {
                tracing::error!(run_id = %run_id, error = %e, "Runtime lost during run");
                self.status.transition(WorkerStatus::Error);
                self.worker.destroy();
                let _ = reply.send(Err(e));
                Flow::Continue
            }
            RunOutcome::Settled(Err(e)) => {
                tracing::warn!(run_id = %run_id, error = %e, "Run failed");
                self.status.transition(WorkerStatus::Ready);
                let _ = reply.send(Err(e));
                Flow::Continue
            }
            RunOutcome::TimedOut => {
                tracing::error!(
                    run_id = %run_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "Run timed out, tearing down runtime"
                );
                self.status.transition(WorkerStatus::Error);
                self.worker.destroy();
                let _ = reply.send(Err(OrchestratorError::Timeout(timeout)));
                Flow::Continue
            }
            RunOutcome::Shutdown(shutdown) => {
                tracing::warn!(run_id = %run_id, "Shutdown requested during run");
                self.status.transition(WorkerStatus::Error);
                self.worker.destroy();
                let _ = reply.send(Err(OrchestratorError::Shutdown));
                let _ = shutdown.send(());
                Flow::Stop
            }
        }
    }
}
