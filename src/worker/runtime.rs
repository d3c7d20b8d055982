use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::protocol::{Command, Event};

/// Both ends of a freshly launched runtime, as seen from the caller.
///
/// The two queues are the only link to the runtime; nothing is shared.
/// Cancelling `kill` tears the runtime down unconditionally.
#[derive(Debug)]
pub struct RuntimeChannel {
    pub commands: mpsc::Sender<Command>,
    pub events: mpsc::Receiver<Event>,
    pub kill: CancellationToken,
}

impl RuntimeChannel {
    /// Build a channel pair. The returned [`RuntimeEndpoint`] is the
    /// runtime's half.
    pub fn pair(capacity: usize) -> (Self, RuntimeEndpoint) {
        let (command_tx, command_rx) = mpsc::channel(capacity);
        let (event_tx, event_rx) = mpsc::channel(capacity);
        let kill = CancellationToken::new();
        (
            Self {
                commands: command_tx,
                events: event_rx,
                kill: kill.clone(),
            },
            RuntimeEndpoint {
                commands: command_rx,
                events: event_tx,
                kill,
            },
        )
    }
}

/// The runtime's half of a [`RuntimeChannel`].
#[derive(Debug)]
pub struct RuntimeEndpoint {
    pub commands: mpsc::Receiver<Command>,
    pub events: mpsc::Sender<Event>,
    pub kill: CancellationToken,
}

/// Starts isolated runtimes.
///
/// Implementations must give the runtime a virtualized, monotonically
/// advancing clock: sleeping advances logical time instantly so suites
/// that sleep still finish well inside the coordinator's deadline.
///
/// `launch` is called from within a tokio runtime and may spawn tasks.
pub trait Launcher: Send + Sync + 'static {
    fn launch(&self) -> Result<RuntimeChannel>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pair_is_connected_both_ways() {
        let (mut caller, mut runtime) = RuntimeChannel::pair(4);

        caller.commands.send(Command::Init).await.unwrap();
        assert_eq!(runtime.commands.recv().await, Some(Command::Init));

        runtime.events.send(Event::Ready).await.unwrap();
        assert_eq!(caller.events.recv().await, Some(Event::Ready));

        caller.kill.cancel();
        assert!(runtime.kill.is_cancelled());
    }

    #[tokio::test]
    async fn dropping_runtime_half_closes_events() {
        let (mut caller, runtime) = RuntimeChannel::pair(1);
        drop(runtime);
        assert!(caller.events.recv().await.is_none());
        assert!(caller.commands.send(Command::Init).await.is_err());
    }
}
