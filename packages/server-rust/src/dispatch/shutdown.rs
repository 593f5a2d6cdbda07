//! Drain controller for the dispatch pool.
//!
//! Uses `ArcSwap` for lock-free state transitions and an atomic counter with
//! RAII guards for accurate in-flight task tracking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::watch;

/// Pool lifecycle state.
///
/// State machine: Running -> Draining -> Stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    /// Accepting new tasks.
    Running,
    /// Rejecting new tasks while in-flight tasks finish.
    Draining,
    /// All in-flight tasks have completed.
    Stopped,
}

/// Coordinates shutdown: submitters take an [`InFlightGuard`] and then check
/// [`state`](Self::state); shutdown flips the state and waits for the guard
/// count to reach zero. A submission either sees `Running` and is counted
/// before the drain starts waiting, or sees `Draining` and is rejected.
#[derive(Debug)]
pub struct ShutdownController {
    shutdown_signal: watch::Sender<bool>,
    in_flight: Arc<AtomicU64>,
    state: ArcSwap<PoolState>,
}

impl ShutdownController {
    /// Creates a new controller in the `Running` state.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            shutdown_signal: tx,
            in_flight: Arc::new(AtomicU64::new(0)),
            state: ArcSwap::from_pointee(PoolState::Running),
        }
    }

    /// Returns a receiver that flips to `true` when shutdown is triggered.
    ///
    /// Long-running tasks can select on it to finish early.
    #[must_use]
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_signal.subscribe()
    }

    /// Moves `Running` to `Draining` and signals receivers.
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn trigger_shutdown(&self) -> bool {
        let previous = self.state.rcu(|current| {
            if **current == PoolState::Running {
                Arc::new(PoolState::Draining)
            } else {
                Arc::clone(current)
            }
        });
        let transitioned = *previous == PoolState::Running;
        if transitioned {
            // Ignore send errors -- receivers may have been dropped
            let _ = self.shutdown_signal.send(true);
        }
        transitioned
    }

    #[must_use]
    pub fn state(&self) -> PoolState {
        **self.state.load()
    }

    /// Creates an RAII guard that tracks an in-flight task.
    ///
    /// The counter is decremented when the guard is dropped, including when
    /// the task is dropped by the runtime.
    #[must_use]
    pub fn in_flight_guard(&self) -> InFlightGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    #[must_use]
    pub fn in_flight_count(&self) -> u64 {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Waits for all in-flight tasks to complete, up to the given timeout.
    ///
    /// Returns `true` if everything drained (state becomes `Stopped`), `false`
    /// if the timeout expired (state remains `Draining`).
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if self.in_flight.load(Ordering::SeqCst) == 0 {
                self.state.store(Arc::new(PoolState::Stopped));
                return true;
            }

            if tokio::time::Instant::now() >= deadline {
                return false;
            }

            // Poll at 10ms intervals to avoid busy-waiting
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard that decrements the in-flight counter when dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    in_flight: Arc<AtomicU64>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
