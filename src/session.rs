//! The calling layer that keeps a usable orchestrator around.
//!
//! A [`Session`] owns the current [`Orchestrator`]. When a run leaves it
//! poisoned (timeout, lost runtime, failed load) the session swaps in a
//! fresh one and starts loading it in the background. The failing caller
//! still gets its own error. The next `run` waits for the replacement to
//! finish loading rather than bouncing off it with `NotReady`.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::config::OrchestratorConfig;
use crate::coordinator::Orchestrator;
use crate::error::Result;
use crate::protocol::{ExecutionRequest, ExecutionResult};
use crate::status::{Subscription, WorkerStatus};
use crate::worker::Launcher;

type Callback = Arc<dyn Fn(WorkerStatus) + Send + Sync>;

struct Observer {
    id: u64,
    callback: Callback,
    subscription: Option<Subscription>,
}

struct SessionState {
    orchestrator: Orchestrator,
    observers: Vec<Observer>,
    next_observer_id: u64,
    last_error: Option<String>,
}

pub struct Session {
    config: OrchestratorConfig,
    launcher: Arc<dyn Launcher>,
    state: Arc<Mutex<SessionState>>,
}

impl Session {
    /// Build an orchestrator and start loading it in the background.
    pub fn start(config: OrchestratorConfig, launcher: Arc<dyn Launcher>) -> Self {
        let orchestrator = Orchestrator::spawn(config.clone(), launcher.clone());
        let state = Arc::new(Mutex::new(SessionState {
            orchestrator: orchestrator.clone(),
            observers: Vec::new(),
            next_observer_id: 0,
            last_error: None,
        }));
        warm_up(orchestrator, Arc::downgrade(&state));
        Self {
            config,
            launcher,
            state,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn orchestrator(&self) -> Orchestrator {
        self.lock().orchestrator.clone()
    }

    pub fn status(&self) -> WorkerStatus {
        self.lock().orchestrator.status()
    }

    /// Message of the most recent failed load or run, cleared when a new
    /// run starts.
    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    /// Observe the status of whichever orchestrator is current. The observer
    /// is re-attached (and replayed) every time the orchestrator is replaced.
    ///
    /// Observers run while the session is locked and must not call back
    /// into it. A panicking observer is logged and skipped.
    pub fn subscribe<F>(&self, observer: F) -> SessionSubscription
    where
        F: Fn(WorkerStatus) + Send + Sync + 'static,
    {
        let callback: Callback = Arc::new(observer);
        let mut state = self.lock();
        let id = state.next_observer_id;
        state.next_observer_id += 1;
        let subscription = attach(&state.orchestrator, &callback);
        state.observers.push(Observer {
            id,
            callback,
            subscription: Some(subscription),
        });
        SessionSubscription {
            id,
            state: Arc::downgrade(&self.state),
        }
    }

    /// Run `request`, waiting for the current orchestrator to finish
    /// loading first.
    pub async fn run(&self, request: ExecutionRequest) -> Result<ExecutionResult> {
        let orchestrator = {
            let mut state = self.lock();
            state.last_error = None;
            state.orchestrator.clone()
        };
        // A background load that failed leaves the current instance poisoned.
        let orchestrator = if orchestrator.status().is_terminal() {
            self.replace(&orchestrator)
        } else {
            orchestrator
        };

        let result = match orchestrator.initialize().await {
            Ok(()) => orchestrator.submit(request).await,
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            self.lock().last_error = Some(e.to_string());
            if orchestrator.status().is_terminal() {
                tracing::warn!(error = %e, "Orchestrator poisoned, rebuilding in background");
                self.replace(&orchestrator);
            }
        }
        result
    }

    /// Shut the current orchestrator down.
    pub async fn shutdown(&self) {
        self.orchestrator().shutdown().await;
    }

    /// Swap `failed` for a fresh orchestrator and return whichever is
    /// current afterwards.
    fn replace(&self, failed: &Orchestrator) -> Orchestrator {
        let fresh = {
            let mut state = self.lock();
            if !state.orchestrator.same_instance(failed) {
                // Another caller already replaced it.
                return state.orchestrator.clone();
            }
            let fresh = Orchestrator::spawn(self.config.clone(), self.launcher.clone());
            for observer in &mut state.observers {
                if let Some(old) = observer.subscription.take() {
                    old.unsubscribe();
                }
                observer.subscription = Some(attach(&fresh, &observer.callback));
            }
            state.orchestrator = fresh.clone();
            fresh
        };
        warm_up(fresh.clone(), Arc::downgrade(&self.state));
        fresh
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Session")
            .field("orchestrator", &state.orchestrator)
            .field("observers", &state.observers.len())
            .field("last_error", &state.last_error)
            .finish()
    }
}

fn attach(orchestrator: &Orchestrator, callback: &Callback) -> Subscription {
    let callback = callback.clone();
    orchestrator.subscribe(move |status| callback(status))
}

fn warm_up(orchestrator: Orchestrator, state: Weak<Mutex<SessionState>>) {
    tokio::spawn(async move {
        if let Err(e) = orchestrator.initialize().await {
            tracing::warn!(error = %e, "Background runtime load failed");
            if let Some(state) = state.upgrade() {
                let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
                if state.orchestrator.same_instance(&orchestrator) {
                    state.last_error = Some(e.to_string());
                }
            }
        }
    });
}

/// Handle returned by [`Session::subscribe`].
#[must_use = "keep the subscription to be able to unsubscribe"]
#[derive(Debug)]
pub struct SessionSubscription {
    id: u64,
    state: Weak<Mutex<SessionState>>,
}

impl SessionSubscription {
    pub fn unsubscribe(self) {
        let Some(state) = self.state.upgrade() else {
            return;
        };
        let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(pos) = state.observers.iter().position(|o| o.id == self.id) {
            let observer = state.observers.remove(pos);
            if let Some(subscription) = observer.subscription {
                subscription.unsubscribe();
            }
        }
    }
}
