//! Orchestrator lifecycle state and its observers.
//!
//! ```text
//! Idle ──► Loading ──► Ready ◄──► Running
//!   ▲         │          │           │
//!   └─────────┼──────────┘           │
//!             └──────► Error ◄───────┘
//! ```
//!
//! `Error` is terminal. Every transition is delivered synchronously to all
//! observers in subscription order, and a new observer is immediately told
//! the current state.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Idle,
    Loading,
    Ready,
    Running,
    Error,
}

impl WorkerStatus {
    /// Whether `self → next` is an edge of the lifecycle graph.
    pub fn can_transition_to(self, next: WorkerStatus) -> bool {
        use WorkerStatus::*;
        matches!(
            (self, next),
            (Idle, Loading)
                | (Loading, Ready)
                | (Loading, Error)
                | (Ready, Running)
                | (Ready, Idle)
                | (Running, Ready)
                | (Running, Error)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == WorkerStatus::Error
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerStatus::Idle => write!(f, "idle"),
            WorkerStatus::Loading => write!(f, "loading"),
            WorkerStatus::Ready => write!(f, "ready"),
            WorkerStatus::Running => write!(f, "running"),
            WorkerStatus::Error => write!(f, "error"),
        }
    }
}

type Observer = Box<dyn Fn(WorkerStatus) + Send + Sync>;

struct Inner {
    status: WorkerStatus,
    next_id: u64,
    observers: Vec<(u64, Observer)>,
}

/// Owns the current [`WorkerStatus`] and broadcasts transitions.
///
/// Observers are called while the machine is locked, which is what keeps
/// delivery ordered. They must not call back into the same machine, and
/// should not panic: a panicking observer is logged and skipped.
pub struct StatusMachine {
    inner: Arc<Mutex<Inner>>,
}

impl Default for StatusMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusMachine {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                status: WorkerStatus::Idle,
                next_id: 0,
                observers: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking observer must not wedge the lifecycle.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn current(&self) -> WorkerStatus {
        self.lock().status
    }

    /// Move to `next` and notify every observer.
    ///
    /// # Panics
    ///
    /// Panics if `current → next` is not a lifecycle edge. The state is
    /// left untouched; an illegal transition means the coordinator's own
    /// bookkeeping is broken.
    pub fn transition(&self, next: WorkerStatus) {
        let mut inner = self.lock();
        let current = inner.status;
        if !current.can_transition_to(next) {
            drop(inner);
            panic!("illegal status transition: {current} -> {next}");
        }
        inner.status = next;
        tracing::debug!(from = %current, to = %next, "Status transition");
        for (id, observer) in &inner.observers {
            notify(*id, observer.as_ref(), next);
        }
    }

    /// Register `observer`, invoking it once with the current state before
    /// returning.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(WorkerStatus) + Send + Sync + 'static,
    {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        notify(id, &observer, inner.status);
        inner.observers.push((id, Box::new(observer)));
        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn observer_count(&self) -> usize {
        self.lock().observers.len()
    }
}

/// Call one observer. A panic inside it is logged and swallowed so the
/// transition and the remaining observers still go through.
fn notify(id: u64, observer: &(dyn Fn(WorkerStatus) + Send + Sync), status: WorkerStatus) {
    if catch_unwind(AssertUnwindSafe(|| observer(status))).is_err() {
        tracing::error!(observer = id, status = %status, "Status observer panicked");
    }
}

impl fmt::Debug for StatusMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("StatusMachine")
            .field("status", &inner.status)
            .field("observers", &inner.observers.len())
            .finish()
    }
}

/// Handle returned by [`StatusMachine::subscribe`].
///
/// Dropping it leaves the observer registered; call
/// [`Subscription::unsubscribe`] to remove it.
#[must_use = "keep the subscription to be able to unsubscribe"]
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    inner: Weak<Mutex<Inner>>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(inner) = self.inner.upgrade() {
            let mut inner = inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.observers.retain(|(id, _)| *id != self.id);
        }
    }
}
