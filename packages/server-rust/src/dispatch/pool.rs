//! The dispatch pool: bounded asynchronous execution of send/receive work.
//!
//! Tasks run on the tokio runtime that was current when the pool was built.
//! A semaphore with `worker_count` permits bounds how many execute at once;
//! submission itself never waits. Every task is isolated: errors and panics
//! are caught inside the task and never reach the runtime or other tasks.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, info, warn};

use super::handle::{panic_message, DispatchError, DispatchHandle, TaskError};
use super::shutdown::{PoolState, ShutdownController};
use crate::service::config::DispatchConfig;
use crate::service::registry::{ManagedService, ServiceContext};

pub struct DispatchPool {
    runtime: Handle,
    permits: Arc<Semaphore>,
    worker_count: usize,
    shutdown_timeout: Duration,
    controller: ShutdownController,
}

impl DispatchPool {
    /// Builds a pool on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::NoRuntime`] when called outside a tokio runtime.
    pub fn new(config: &DispatchConfig) -> Result<Self, DispatchError> {
        let runtime = Handle::try_current().map_err(|_| DispatchError::NoRuntime)?;
        let worker_count = config.effective_worker_count();
        debug!(worker_count, "dispatch pool created");
        Ok(Self {
            runtime,
            permits: Arc::new(Semaphore::new(worker_count)),
            worker_count,
            shutdown_timeout: config.shutdown_timeout(),
            controller: ShutdownController::new(),
        })
    }

    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    #[must_use]
    pub fn state(&self) -> PoolState {
        self.controller.state()
    }

    /// Number of submitted tasks that have not finished yet.
    #[must_use]
    pub fn in_flight(&self) -> u64 {
        self.controller.in_flight_count()
    }

    /// Receiver that flips to `true` when shutdown starts.
    #[must_use]
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.controller.shutdown_receiver()
    }

    // -- submission --------------------------------------------------------

    /// Fire-and-forget. A failing or panicking task is logged and the handle
    /// still completes normally.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::ShuttingDown`] once shutdown has started.
    pub fn run<F>(&self, task: F) -> Result<DispatchHandle<()>, DispatchError>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        let inner = self.spawn(async move {
            if let Err(err) = with_permit(permits, catching(task)).await {
                log_failure("run", &err);
            }
        })?;
        Ok(DispatchHandle::new(inner, |_| ()))
    }

    /// Runs a value-producing task. A failing or panicking task is logged and
    /// the handle resolves to `None`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::ShuttingDown`] once shutdown has started.
    pub fn supply<F, T>(&self, task: F) -> Result<DispatchHandle<Option<T>>, DispatchError>
    where
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        let inner = self.spawn(async move {
            with_permit(permits, catching(task))
                .await
                .map_err(|err| log_failure("supply", &err))
                .ok()
        })?;
        Ok(DispatchHandle::new(inner, |_| None))
    }

    /// Runs a task and hands its outcome, success or failure, to the caller.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::ShuttingDown`] once shutdown has started.
    pub fn submit<F, T>(&self, task: F) -> Result<DispatchHandle<Result<T, TaskError>>, DispatchError>
    where
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        let inner = self.spawn(with_permit(permits, catching(task)))?;
        Ok(DispatchHandle::new(inner, |err| Err(TaskError::from_join_error(err))))
    }

    /// Like [`run`](Self::run) for blocking work, executed on the runtime's
    /// blocking thread pool.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::ShuttingDown`] once shutdown has started.
    pub fn run_blocking<F>(&self, task: F) -> Result<DispatchHandle<()>, DispatchError>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        let inner = self.spawn(async move {
            if let Err(err) = with_permit(permits, blocking(task)).await {
                log_failure("run_blocking", &err);
            }
        })?;
        Ok(DispatchHandle::new(inner, |_| ()))
    }

    /// Like [`supply`](Self::supply) for blocking work.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::ShuttingDown`] once shutdown has started.
    pub fn supply_blocking<F, T>(&self, task: F) -> Result<DispatchHandle<Option<T>>, DispatchError>
    where
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        let inner = self.spawn(async move {
            with_permit(permits, blocking(task))
                .await
                .map_err(|err| log_failure("supply_blocking", &err))
                .ok()
        })?;
        Ok(DispatchHandle::new(inner, |_| None))
    }

    /// Registers the task as in flight, then spawns it if the pool still runs.
    fn spawn<F>(&self, fut: F) -> Result<tokio::task::JoinHandle<F::Output>, DispatchError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let guard = self.controller.in_flight_guard();
        if self.controller.state() != PoolState::Running {
            return Err(DispatchError::ShuttingDown);
        }

        let gauge = metrics::gauge!("as4_dispatch_in_flight");
        gauge.increment(1.0);
        Ok(self.runtime.spawn(async move {
            let output = fut.await;
            gauge.decrement(1.0);
            drop(guard);
            output
        }))
    }

    // -- shutdown ----------------------------------------------------------

    /// Stops accepting work and waits up to `timeout` for in-flight tasks.
    /// Tasks are never cancelled. Idempotent.
    ///
    /// Returns `true` if every task finished in time.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        if self.controller.trigger_shutdown() {
            info!(
                in_flight = self.controller.in_flight_count(),
                "dispatch pool about to be closed"
            );
        }

        let drained = self.controller.wait_for_drain(timeout).await;
        if drained {
            info!("dispatch pool closed");
        } else {
            warn!(
                in_flight = self.controller.in_flight_count(),
                timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                "dispatch pool drain timed out; remaining tasks keep running"
            );
        }
        drained
    }
}

#[async_trait]
impl ManagedService for DispatchPool {
    fn name(&self) -> &'static str {
        "dispatch"
    }

    async fn init(&self, _ctx: &ServiceContext) -> anyhow::Result<()> {
        info!(worker_count = self.worker_count, "dispatch pool ready");
        Ok(())
    }

    async fn reset(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn shutdown(&self, terminate: bool) -> anyhow::Result<()> {
        let timeout = if terminate {
            Duration::ZERO
        } else {
            self.shutdown_timeout
        };
        if !DispatchPool::shutdown(self, timeout).await {
            anyhow::bail!(
                "dispatch pool still has {} task(s) in flight",
                self.controller.in_flight_count()
            );
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Task execution helpers
// ---------------------------------------------------------------------------

async fn with_permit<T, F>(permits: Arc<Semaphore>, fut: F) -> Result<T, TaskError>
where
    F: Future<Output = Result<T, TaskError>>,
{
    let Ok(_permit) = permits.acquire_owned().await else {
        return Err(TaskError::Cancelled);
    };
    let outcome = fut.await;
    let label = match &outcome {
        Ok(_) => "ok",
        Err(err) => err.outcome_label(),
    };
    metrics::counter!("as4_dispatch_tasks_total", "outcome" => label).increment(1);
    outcome
}

async fn catching<T, F>(fut: F) -> Result<T, TaskError>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(TaskError::Failed(err)),
        Err(payload) => Err(TaskError::Panicked(panic_message(payload.as_ref()))),
    }
}

async fn blocking<T, F>(task: F) -> Result<T, TaskError>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(task).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(TaskError::Failed(err)),
        Err(join) => Err(TaskError::from_join_error(join)),
    }
}

fn log_failure(operation: &'static str, err: &TaskError) {
    warn!(operation, error = %err, "dispatched task failed");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
