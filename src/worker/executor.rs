use std::sync::Arc;

use tokio::sync::mpsc::error::TryRecvError;

use crate::error::{OrchestratorError, Result};
use crate::protocol::{Command, Event, ExecutionRequest, RawResults};
use crate::worker::runtime::{Launcher, RuntimeChannel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Fresh,
    Initialized,
    Destroyed,
}

/// Owns exactly one isolated runtime.
///
/// The runtime is launched by [`initialize`](Self::initialize) and reached
/// only through its command/event queues. `execute` takes `&mut self`, so
/// at most one request is ever outstanding on an instance.
pub struct ExecutionWorker {
    launcher: Arc<dyn Launcher>,
    channel: Option<RuntimeChannel>,
    lifecycle: Lifecycle,
}

impl ExecutionWorker {
    pub fn new(launcher: Arc<dyn Launcher>) -> Self {
        Self {
            launcher,
            channel: None,
            lifecycle: Lifecycle::Fresh,
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.lifecycle == Lifecycle::Destroyed
    }

    /// Launch the runtime and wait for it to report `ready`.
    ///
    /// # Panics
    ///
    /// Panics when called a second time on the same instance.
    pub async fn initialize(&mut self) -> Result<()> {
        match self.lifecycle {
            Lifecycle::Destroyed => return Err(OrchestratorError::NotInitialized),
            Lifecycle::Initialized => panic!("ExecutionWorker::initialize called twice"),
            Lifecycle::Fresh => {}
        }
        self.lifecycle = Lifecycle::Initialized;

        let channel = self.channel.insert(self.launcher.launch()?);
        Self::send(channel, Command::Init).await?;

        loop {
            match Self::next_event(channel).await? {
                Event::Ready => {
                    tracing::info!("Runtime ready");
                    return Ok(());
                }
                Event::Error { message } => {
                    tracing::error!(error = %message, "Runtime failed to initialize");
                    return Err(OrchestratorError::Initialization(message));
                }
                stray => Self::discard(&stray),
            }
        }
    }

    /// Run one request and wait for its `results` or `error`.
    pub async fn execute(&mut self, request: &ExecutionRequest) -> Result<RawResults> {
        if self.lifecycle != Lifecycle::Initialized {
            return Err(OrchestratorError::NotInitialized);
        }
        let channel = self
            .channel
            .as_mut()
            .ok_or(OrchestratorError::NotInitialized)?;

        // Anything already queued answers no command of ours.
        loop {
            match channel.events.try_recv() {
                Ok(stray) => Self::discard(&stray),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    return Err(OrchestratorError::Transport(
                        "runtime event channel closed".to_string(),
                    ))
                }
            }
        }

        Self::send(channel, Command::Run(request.clone())).await?;

        loop {
            match Self::next_event(channel).await? {
                Event::Results(results) => return Ok(results),
                Event::Error { message } => return Err(OrchestratorError::Execution(message)),
                stray => Self::discard(&stray),
            }
        }
    }

    /// Kill the runtime and drop its queues. Safe to call any number of
    /// times, with or without a request in flight.
    pub fn destroy(&mut self) {
        if let Some(channel) = self.channel.take() {
            channel.kill.cancel();
            tracing::info!("Runtime destroyed");
        }
        self.lifecycle = Lifecycle::Destroyed;
    }

    async fn send(channel: &RuntimeChannel, command: Command) -> Result<()> {
        let kind = command.kind();
        channel.commands.send(command).await.map_err(|_| {
            OrchestratorError::Transport(format!("runtime stopped accepting commands ({kind})"))
        })?;
        tracing::debug!(command = kind, "Command sent to runtime");
        Ok(())
    }

    async fn next_event(channel: &mut RuntimeChannel) -> Result<Event> {
        channel.events.recv().await.ok_or_else(|| {
            OrchestratorError::Transport("runtime event channel closed".to_string())
        })
    }

    fn discard(event: &Event) {
        tracing::warn!(event = event.kind(), "Discarding event with no pending operation");
    }
}

impl Drop for ExecutionWorker {
    fn drop(&mut self) {
        if let Some(channel) = self.channel.take() {
            channel.kill.cancel();
        }
    }
}

impl std::fmt::Debug for ExecutionWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionWorker")
            .field("lifecycle", &self.lifecycle)
            .field("connected", &self.channel.is_some())
            .finish()
    }
}
