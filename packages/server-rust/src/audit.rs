//! Audit events for store mutations and the sinks that receive them.
//!
//! Every PMode store mutation emits one [`AuditEvent`]. Emission is a
//! best-effort side channel: sinks must never block or fail the mutation,
//! and the store only emits after its write lock is released.
//!
//! [`AuditService`] decouples producers from slow downstream sinks: events are
//! queued with `try_send` into a bounded channel drained by a
//! [`BackgroundWorker`]. When the queue is full the event is dropped and
//! counted; the forwarder reports drops on each tick.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::service::config::AuditConfig;
use crate::service::registry::{ManagedService, ServiceContext};
use crate::service::worker::{BackgroundRunnable, BackgroundWorker};

/// Object type recorded for PMode audit events.
pub const OBJECT_TYPE_PMODE: &str = "pmode";

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditAction {
    Create,
    Modify,
    Delete,
}

impl AuditAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Modify => "modify",
            AuditAction::Delete => "delete",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason token attached to a failed mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditFailure {
    /// Update target does not exist.
    NoSuchId,
    /// Delete target does not exist.
    NoSuchObjectId,
    AlreadyDeleted,
    DuplicateId,
    PersistenceError,
}

impl AuditFailure {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            AuditFailure::NoSuchId => "no-such-id",
            AuditFailure::NoSuchObjectId => "no-such-object-id",
            AuditFailure::AlreadyDeleted => "already-deleted",
            AuditFailure::DuplicateId => "duplicate-id",
            AuditFailure::PersistenceError => "persistence-error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditOutcome {
    Success,
    Failure(AuditFailure),
}

/// One audited mutation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    pub object_type: &'static str,
    pub object_id: String,
    pub action: AuditAction,
    pub outcome: AuditOutcome,
    /// Wall-clock millis since epoch.
    pub timestamp: i64,
}

impl AuditEvent {
    #[must_use]
    pub fn success(
        object_type: &'static str,
        object_id: impl Into<String>,
        action: AuditAction,
        timestamp: i64,
    ) -> Self {
        Self {
            object_type,
            object_id: object_id.into(),
            action,
            outcome: AuditOutcome::Success,
            timestamp,
        }
    }

    #[must_use]
    pub fn failure(
        object_type: &'static str,
        object_id: impl Into<String>,
        action: AuditAction,
        reason: AuditFailure,
        timestamp: i64,
    ) -> Self {
        Self {
            object_type,
            object_id: object_id.into(),
            action,
            outcome: AuditOutcome::Failure(reason),
            timestamp,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome == AuditOutcome::Success
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Receiver of audit events. Implementations must return promptly.
///
/// Used as `Arc<dyn AuditSink>`.
pub trait AuditSink: Send + Sync {
    fn on_event(&self, event: &AuditEvent);
}

/// Composite sink that fans out to multiple sinks. Empty means "discard".
#[derive(Default)]
pub struct CompositeAuditSink {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl CompositeAuditSink {
    #[must_use]
    pub fn new(sinks: Vec<Arc<dyn AuditSink>>) -> Self {
        Self { sinks }
    }

    pub fn add(&mut self, sink: Arc<dyn AuditSink>) {
        self.sinks.push(sink);
    }
}

impl AuditSink for CompositeAuditSink {
    fn on_event(&self, event: &AuditEvent) {
        for sink in &self.sinks {
            sink.on_event(event);
        }
    }
}

/// Writes every event as a structured `tracing` record on target `as4::audit`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn on_event(&self, event: &AuditEvent) {
        match event.outcome {
            AuditOutcome::Success => info!(
                target: "as4::audit",
                object_type = event.object_type,
                object_id = %event.object_id,
                action = event.action.as_str(),
                timestamp = event.timestamp,
                "audit success"
            ),
            AuditOutcome::Failure(reason) => warn!(
                target: "as4::audit",
                object_type = event.object_type,
                object_id = %event.object_id,
                action = event.action.as_str(),
                reason = reason.as_str(),
                timestamp = event.timestamp,
                "audit failure"
            ),
        }
    }
}

/// Keeps every event in memory. Intended for tests and diagnostics.
#[derive(Debug, Default)]
pub struct RecordingAuditSink {
    events: parking_lot::Mutex<Vec<AuditEvent>>,
}

impl RecordingAuditSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    #[must_use]
    pub fn last(&self) -> Option<AuditEvent> {
        self.events.lock().last().cloned()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl AuditSink for RecordingAuditSink {
    fn on_event(&self, event: &AuditEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Non-blocking sink that enqueues events for an [`AuditForwarder`].
pub struct ChannelAuditSink {
    tx: mpsc::Sender<AuditEvent>,
    dropped: Arc<AtomicU64>,
}

impl ChannelAuditSink {
    fn new(tx: mpsc::Sender<AuditEvent>, dropped: Arc<AtomicU64>) -> Self {
        Self { tx, dropped }
    }

    /// Total number of events discarded because the queue was full or closed.
    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl AuditSink for ChannelAuditSink {
    fn on_event(&self, event: &AuditEvent) {
        if self.tx.try_send(event.clone()).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("as4_audit_events_dropped_total").increment(1);
        }
    }
}

// ---------------------------------------------------------------------------
// AuditForwarder
// ---------------------------------------------------------------------------

/// Background runnable that hands queued events to the downstream sink.
pub struct AuditForwarder {
    downstream: Arc<dyn AuditSink>,
    dropped: Arc<AtomicU64>,
    reported_drops: u64,
    forwarded: u64,
}

impl AuditForwarder {
    #[must_use]
    pub fn new(downstream: Arc<dyn AuditSink>, dropped: Arc<AtomicU64>) -> Self {
        Self {
            downstream,
            dropped,
            reported_drops: 0,
            forwarded: 0,
        }
    }

    fn report_drops(&mut self) {
        let total = self.dropped.load(Ordering::Relaxed);
        if total > self.reported_drops {
            warn!(
                dropped = total - self.reported_drops,
                total_dropped = total,
                "audit queue overflowed; events were discarded"
            );
            self.reported_drops = total;
        }
    }
}

#[async_trait]
impl BackgroundRunnable for AuditForwarder {
    type Task = AuditEvent;

    async fn run(&mut self, event: AuditEvent) {
        self.downstream.on_event(&event);
        self.forwarded += 1;
    }

    async fn on_tick(&mut self) {
        self.report_drops();
    }

    async fn shutdown(&mut self) {
        self.report_drops();
        info!(forwarded = self.forwarded, "audit forwarder stopped");
    }
}

// ---------------------------------------------------------------------------
// AuditService
// ---------------------------------------------------------------------------

/// Lifecycle-managed audit pipeline: a [`ChannelAuditSink`] feeding a
/// background [`AuditForwarder`].
pub struct AuditService {
    sink: Arc<ChannelAuditSink>,
    worker: parking_lot::Mutex<Option<BackgroundWorker<AuditForwarder>>>,
}

impl AuditService {
    /// Starts the forwarder. Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker queue could not be created.
    pub fn start(downstream: Arc<dyn AuditSink>, config: &AuditConfig) -> anyhow::Result<Self> {
        let dropped = Arc::new(AtomicU64::new(0));
        let forwarder = AuditForwarder::new(downstream, dropped.clone());
        let worker = BackgroundWorker::start(
            forwarder,
            config.report_interval_ms,
            config.channel_capacity,
        );
        let tx = worker
            .sender()
            .ok_or_else(|| anyhow::anyhow!("audit worker did not start"))?;

        Ok(Self {
            sink: Arc::new(ChannelAuditSink::new(tx, dropped)),
            worker: parking_lot::Mutex::new(Some(worker)),
        })
    }

    /// The producer-side sink to hand to the PMode store.
    #[must_use]
    pub fn sink(&self) -> Arc<ChannelAuditSink> {
        Arc::clone(&self.sink)
    }

    /// Stops the forwarder after it has drained the queue. Idempotent.
    pub async fn stop(&self) {
        let worker = self.worker.lock().take();
        if let Some(mut worker) = worker {
            worker.stop().await;
        }
    }
}

#[async_trait]
impl ManagedService for AuditService {
    fn name(&self) -> &'static str {
        "audit"
    }

    async fn init(&self, _ctx: &ServiceContext) -> anyhow::Result<()> {
        Ok(())
    }

    async fn reset(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn shutdown(&self, _terminate: bool) -> anyhow::Result<()> {
        self.stop().await;
        Ok(())
    }
}
