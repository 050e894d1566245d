//! Admission control and graceful shutdown coordination.
//!
//! Two pieces cooperate here:
//!
//! * [`AdmissionGate`] combines the "accepting work" flag with a counter of
//!   outstanding jobs. Admission reads the flag under a shared lock and bumps
//!   the counter before releasing it; closing takes the exclusive lock. Once
//!   [`AdmissionGate::close`] returns, no job can slip in unseen by the drain.
//! * [`ShutdownController`] walks the service through
//!   `Running -> ShutdownRequested -> Draining -> Terminated`. The request is
//!   synchronous and idempotent, so it can be called from a signal handler;
//!   the drain runs on the async runtime via [`ShutdownController::drive`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hashgen::shutdown::{AdmissionGate, ShutdownController};
//!
//! # async fn example() {
//! let gate = Arc::new(AdmissionGate::new());
//! let controller = Arc::new(ShutdownController::new(Arc::clone(&gate)));
//! let driver = controller.spawn_driver();
//!
//! let permit = gate.try_admit().expect("gate is open");
//! controller.request_shutdown();
//! assert!(gate.try_admit().is_none());
//!
//! drop(permit);
//! controller.await_terminated().await;
//! driver.await.unwrap();
//! # }
//! ```

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Lifecycle of the service with respect to shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    /// Accepting new jobs.
    Running,
    /// A shutdown was requested; new jobs are refused.
    ShutdownRequested,
    /// Waiting for outstanding jobs to finish.
    Draining,
    /// All admitted jobs are done and the transport has been told to stop.
    Terminated,
}

impl fmt::Display for ShutdownState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::ShutdownRequested => write!(f, "shutdown requested"),
            Self::Draining => write!(f, "draining"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

/// Admission flag plus outstanding-work counter.
///
/// The counter is a `watch` channel so the drain can wait for it to reach
/// zero without polling.
#[derive(Debug)]
pub struct AdmissionGate {
    closed: RwLock<bool>,
    outstanding: watch::Sender<usize>,
}

impl AdmissionGate {
    /// Create an open gate with no outstanding work.
    #[must_use]
    pub fn new() -> Self {
        Self {
            closed: RwLock::new(false),
            outstanding: watch::channel(0).0,
        }
    }

    /// Admit one unit of work unless the gate is closed.
    ///
    /// The returned permit keeps the work counted until it is dropped.
    #[must_use]
    pub fn try_admit(self: &Arc<Self>) -> Option<WorkPermit> {
        let closed = self.closed.read().unwrap_or_else(PoisonError::into_inner);
        if *closed {
            return None;
        }
        self.outstanding.send_modify(|n| *n += 1);
        drop(closed);

        Some(WorkPermit {
            gate: Arc::clone(self),
        })
    }

    /// Stop admitting work. Returns `true` if this call closed the gate.
    pub fn close(&self) -> bool {
        let mut closed = self.closed.write().unwrap_or_else(PoisonError::into_inner);
        !std::mem::replace(&mut *closed, true)
    }

    /// Whether the gate has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.closed.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of admitted units of work that have not finished.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        *self.outstanding.borrow()
    }

    /// Resolve once no admitted work is outstanding.
    pub async fn drained(&self) {
        let mut rx = self.outstanding.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    fn release(&self) {
        self.outstanding.send_modify(|n| *n = n.saturating_sub(1));
    }
}

impl Default for AdmissionGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Proof that one unit of work was admitted.
///
/// Dropping the permit marks the work done, including on panic unwinds.
#[derive(Debug)]
pub struct WorkPermit {
    gate: Arc<AdmissionGate>,
}

impl Drop for WorkPermit {
    fn drop(&mut self) {
        self.gate.release();
    }
}

/// Drives the service from `Running` to `Terminated`.
#[derive(Debug)]
pub struct ShutdownController {
    gate: Arc<AdmissionGate>,
    state: watch::Sender<ShutdownState>,
    transport_stop: watch::Sender<bool>,
}

impl ShutdownController {
    /// Create a controller guarding `gate`.
    #[must_use]
    pub fn new(gate: Arc<AdmissionGate>) -> Self {
        Self {
            gate,
            state: watch::channel(ShutdownState::Running).0,
            transport_stop: watch::channel(false).0,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ShutdownState {
        *self.state.borrow()
    }

    /// Whether shutdown has been requested (in any post-`Running` state).
    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.state() != ShutdownState::Running
    }

    /// Request a graceful shutdown.
    ///
    /// Closes the admission gate before publishing the new state, so any
    /// submission that observes `ShutdownRequested` is already refused.
    /// Safe to call any number of times, from any thread.
    pub fn request_shutdown(&self) {
        self.gate.close();
        let changed = self.state.send_if_modified(|state| {
            if *state == ShutdownState::Running {
                *state = ShutdownState::ShutdownRequested;
                true
            } else {
                false
            }
        });
        if changed {
            log::info!(
                "Shutdown requested; {} job(s) outstanding",
                self.gate.outstanding()
            );
        }
    }

    /// Wait for a shutdown request, drain outstanding work, stop the
    /// transport, and mark the service terminated.
    ///
    /// No job is cancelled and there is no timeout: the drain lasts as long
    /// as the slowest admitted job.
    pub async fn drive(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx
            .wait_for(|state| *state != ShutdownState::Running)
            .await;

        self.transition(ShutdownState::ShutdownRequested, ShutdownState::Draining);
        log::info!(
            "Draining {} outstanding job(s)...",
            self.gate.outstanding()
        );
        self.gate.drained().await;
        log::info!("All jobs finished; stopping transport");

        self.transport_stop.send_replace(true);
        self.transition(ShutdownState::Draining, ShutdownState::Terminated);
        log::info!("Shutdown complete");
    }

    /// Run [`drive`](Self::drive) on the current tokio runtime.
    #[must_use]
    pub fn spawn_driver(self: &Arc<Self>) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        tokio::spawn(async move { controller.drive().await })
    }

    /// Resolve once the drain has finished and the transport should stop.
    ///
    /// Intended as an HTTP server's graceful-shutdown future.
    pub async fn transport_stopped(&self) {
        let mut rx = self.transport_stop.subscribe();
        let _ = rx.wait_for(|stop| *stop).await;
    }

    /// Resolve once the controller reaches [`ShutdownState::Terminated`].
    pub async fn await_terminated(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx
            .wait_for(|state| *state == ShutdownState::Terminated)
            .await;
    }

    fn transition(&self, from: ShutdownState, to: ShutdownState) {
        self.state.send_if_modified(|state| {
            if *state == from {
                log::debug!("Shutdown state {} -> {}", from, to);
                *state = to;
                true
            } else {
                false
            }
        });
    }
}
