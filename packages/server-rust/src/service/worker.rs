//! Background worker for queued and periodic tasks.
//!
//! Provides a generic `BackgroundWorker<R>` that processes tasks from an mpsc channel
//! via a `BackgroundRunnable` implementation, with optional periodic tick callbacks.
//! Tasks still queued when the worker stops are drained before `shutdown()` runs.

use async_trait::async_trait;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// BackgroundRunnable trait
// ---------------------------------------------------------------------------

/// Trait for task handlers executed by `BackgroundWorker`.
///
/// Implementors define how individual tasks are processed, what happens on each
/// periodic tick, and how to clean up on shutdown.
#[async_trait]
pub trait BackgroundRunnable: Send + 'static {
    /// The type of task this runnable processes.
    type Task: Send + 'static;

    /// Process a single task.
    async fn run(&mut self, task: Self::Task);

    /// Called periodically (on each tick interval). Default is a no-op.
    async fn on_tick(&mut self) {}

    /// Called once when the worker is shutting down. Default is a no-op.
    async fn shutdown(&mut self) {}
}

// ---------------------------------------------------------------------------
// BackgroundWorker
// ---------------------------------------------------------------------------

/// Generic background worker that processes tasks via an mpsc channel.
///
/// The worker spawns a tokio task that:
/// 1. Listens for tasks on the mpsc channel
/// 2. Calls `BackgroundRunnable::run()` for each task
/// 3. Periodically calls `BackgroundRunnable::on_tick()` at the configured interval
/// 4. Drains queued tasks and calls `BackgroundRunnable::shutdown()` when stopped
pub struct BackgroundWorker<R: BackgroundRunnable> {
    tx: Option<mpsc::Sender<R::Task>>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl<R: BackgroundRunnable> BackgroundWorker<R> {
    /// Start the background worker with the given runnable, tick interval and
    /// channel capacity.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(mut runnable: R, tick_interval_ms: u64, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<R::Task>(capacity.max(1));
        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut tick_interval =
                tokio::time::interval(std::time::Duration::from_millis(tick_interval_ms.max(1)));
            // Skip the first immediate tick so on_tick doesn't fire at startup.
            tick_interval.tick().await;

            loop {
                tokio::select! {
                    task = rx.recv() => {
                        match task {
                            Some(t) => runnable.run(t).await,
                            None => break, // Channel closed.
                        }
                    }
                    _ = tick_interval.tick() => {
                        runnable.on_tick().await;
                    }
                    _ = &mut shutdown_rx => {
                        while let Ok(t) = rx.try_recv() {
                            runnable.run(t).await;
                        }
                        break;
                    }
                }
            }

            runnable.shutdown().await;
        });

        Self {
            tx: Some(tx),
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// A sender feeding this worker's queue, for producers that outlive `&self`.
    #[must_use]
    pub fn sender(&self) -> Option<mpsc::Sender<R::Task>> {
        self.tx.clone()
    }

    /// Stop the worker gracefully, waiting for queued tasks and the worker task to complete.
    pub async fn stop(&mut self) {
        // Signal shutdown.
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        // Close the task channel.
        self.tx.take();
        // Wait for the worker task to finish.
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    struct CountingRunnable {
        run_count: Arc<AtomicU32>,
        tick_count: Arc<AtomicU32>,
        shutdown_called: Arc<AtomicU32>,
    }

    impl CountingRunnable {
        fn new() -> Self {
            Self {
                run_count: Arc::new(AtomicU32::new(0)),
                tick_count: Arc::new(AtomicU32::new(0)),
                shutdown_called: Arc::new(AtomicU32::new(0)),
            }
        }
    }

    #[async_trait]
    impl BackgroundRunnable for CountingRunnable {
        type Task = String;

        async fn run(&mut self, _task: String) {
            self.run_count.fetch_add(1, Ordering::SeqCst);
        }

        async fn on_tick(&mut self) {
            self.tick_count.fetch_add(1, Ordering::SeqCst);
        }

        async fn shutdown(&mut self) {
            self.shutdown_called.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn queued_tasks_drain_on_stop() {
        let runnable = CountingRunnable::new();
        let run_count = runnable.run_count.clone();
        let shutdown_called = runnable.shutdown_called.clone();

        let mut worker = BackgroundWorker::start(runnable, 60_000, 16);

        let tx = worker.sender().unwrap();
        tx.send("task-1".to_string()).await.unwrap();
        tx.send("task-2".to_string()).await.unwrap();
        tx.try_send("task-3".to_string()).unwrap();
        drop(tx);

        worker.stop().await;

        // Queued tasks are drained before shutdown.
        assert_eq!(run_count.load(Ordering::SeqCst), 3);
        assert_eq!(shutdown_called.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn tick_fires_periodically() {
        let runnable = CountingRunnable::new();
        let tick_count = runnable.tick_count.clone();

        // Very short tick interval for testing.
        let mut worker = BackgroundWorker::start(runnable, 20, 16);

        // Wait for a few ticks.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        worker.stop().await;

        // Should have at least 2 ticks in 100ms with 20ms interval.
        assert!(tick_count.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn sender_is_gone_after_stop() {
        let mut worker = BackgroundWorker::start(CountingRunnable::new(), 60_000, 16);
        let early = worker.sender().unwrap();
        worker.stop().await;

        assert!(worker.sender().is_none());
        assert!(early.try_send("late-task".to_string()).is_err());
    }

    #[tokio::test]
    async fn external_sender_feeds_the_worker() {
        let runnable = CountingRunnable::new();
        let run_count = runnable.run_count.clone();
        let mut worker = BackgroundWorker::start(runnable, 60_000, 4);

        let tx = worker.sender().unwrap();
        tx.try_send("from-outside".to_string()).unwrap();

        worker.stop().await;
        assert_eq!(run_count.load(Ordering::SeqCst), 1);
    }
}
