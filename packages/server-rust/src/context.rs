//! Explicit application context wiring the AS4 services together.
//!
//! [`As4Context`] replaces process-wide singletons: it owns the PMode store,
//! the dispatch pool and the audit pipeline, registers them with a
//! [`ServiceRegistry`] and drives their lifecycle. Services are registered as
//! audit, pmode, dispatch, so shutdown drains dispatched work first, then
//! checkpoints the store, then flushes the remaining audit events.

use std::sync::Arc;

use as4_core::{ClockSource, SystemClock};
use tracing::info;

use crate::audit::{AuditService, AuditSink, CompositeAuditSink, TracingAuditSink};
use crate::dispatch::DispatchPool;
use crate::service::config::As4Config;
use crate::service::registry::{ServiceContext, ServiceRegistry};
use crate::storage::{open_data_store, PModeStore};

pub struct As4Context {
    config: Arc<As4Config>,
    registry: ServiceRegistry,
    pmode_store: Arc<PModeStore>,
    dispatch_pool: Arc<DispatchPool>,
    audit: Option<Arc<AuditService>>,
}

impl As4Context {
    /// Builds every service from `config`, logging audit events through
    /// `tracing`. Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is inconsistent, the data store
    /// cannot be opened or loaded, or no runtime is available.
    pub fn build(config: As4Config) -> anyhow::Result<Self> {
        Self::build_with(config, Arc::new(TracingAuditSink), Arc::new(SystemClock))
    }

    /// Like [`build`](Self::build) with an explicit audit destination and clock.
    ///
    /// # Errors
    ///
    /// See [`build`](Self::build).
    pub fn build_with(
        config: As4Config,
        audit_downstream: Arc<dyn AuditSink>,
        clock: Arc<dyn ClockSource>,
    ) -> anyhow::Result<Self> {
        config.check()?;
        let config = Arc::new(config);
        let registry = ServiceRegistry::new();

        let (audit, audit_sink): (Option<Arc<AuditService>>, Arc<dyn AuditSink>) =
            if config.audit.enabled {
                let service = Arc::new(AuditService::start(audit_downstream, &config.audit)?);
                registry.register_arc(Arc::clone(&service));
                let sink: Arc<dyn AuditSink> = service.sink();
                (Some(service), sink)
            } else {
                let discard: Arc<dyn AuditSink> = Arc::new(CompositeAuditSink::default());
                (None, discard)
            };

        let data_store = open_data_store(&config.pmode)?;
        let pmode_store = Arc::new(PModeStore::open(
            data_store,
            audit_sink,
            clock,
            config.pmode.clone(),
        )?);
        registry.register_arc(Arc::clone(&pmode_store));

        let dispatch_pool = Arc::new(DispatchPool::new(&config.dispatch)?);
        registry.register_arc(Arc::clone(&dispatch_pool));

        info!(
            node_id = %config.node_id,
            services = ?registry.names(),
            "as4 context built"
        );

        Ok(Self {
            config,
            registry,
            pmode_store,
            dispatch_pool,
            audit,
        })
    }

    /// Initializes all services in registration order.
    ///
    /// # Errors
    ///
    /// Returns the first service initialization failure.
    pub async fn start(&self) -> anyhow::Result<()> {
        let ctx = ServiceContext {
            config: Arc::clone(&self.config),
        };
        self.registry.init_all(&ctx).await
    }

    /// Returns every service to its freshly-started state; the PMode store
    /// reloads its document from the data store.
    ///
    /// # Errors
    ///
    /// Returns the first service reset failure.
    pub async fn reset(&self) -> anyhow::Result<()> {
        self.registry.reset_all().await?;
        info!(records = self.pmode_store.len(), "as4 context reset");
        Ok(())
    }

    /// Graceful shutdown: drains dispatch within its configured timeout,
    /// checkpoints the store and flushes audit events.
    ///
    /// # Errors
    ///
    /// Returns the first failure; every service is still asked to stop.
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.registry.shutdown_all(false).await
    }

    /// Shutdown without waiting for in-flight dispatched tasks.
    ///
    /// # Errors
    ///
    /// Returns the first failure; every service is still asked to stop.
    pub async fn terminate(&self) -> anyhow::Result<()> {
        self.registry.shutdown_all(true).await
    }

    #[must_use]
    pub fn config(&self) -> &As4Config {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    #[must_use]
    pub fn pmode_store(&self) -> &Arc<PModeStore> {
        &self.pmode_store
    }

    #[must_use]
    pub fn dispatch_pool(&self) -> &Arc<DispatchPool> {
        &self.dispatch_pool
    }

    /// The audit pipeline, if auditing is enabled.
    #[must_use]
    pub fn audit(&self) -> Option<&Arc<AuditService>> {
        self.audit.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use as4_core::{ManualClock, Mep, MepBinding, PMode, PModeParty};

    use super::*;
    use crate::audit::{AuditAction, RecordingAuditSink};
    use crate::dispatch::{DispatchError, PoolState};

    fn pmode(id: &str) -> PMode {
        PMode {
            id: id.to_string(),
            agreement: None,
            mep: Some(Mep::TwoWay),
            mep_binding: Some(MepBinding::Sync),
            initiator: None,
            responder: Some(PModeParty::new("receiver", "http://example.org/roles/receiver")),
        }
    }

    #[tokio::test]
    async fn registers_services_in_lifecycle_order() {
        let ctx = As4Context::build(As4Config::default()).unwrap();
        assert_eq!(ctx.registry().names(), vec!["audit", "pmode", "dispatch"]);
        assert!(ctx.registry().get::<PModeStore>().is_some());
        assert!(ctx.audit().is_some());
        ctx.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn audit_can_be_disabled() {
        let mut config = As4Config::default();
        config.audit.enabled = false;
        let ctx = As4Context::build(config).unwrap();
        assert_eq!(ctx.registry().names(), vec!["pmode", "dispatch"]);
        assert!(ctx.audit().is_none());
        ctx.pmode_store().create(pmode("pm-1")).unwrap();
        ctx.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn dispatched_work_reads_the_store_and_audit_is_flushed_on_shutdown() {
        let downstream = Arc::new(RecordingAuditSink::new());
        let ctx = As4Context::build_with(
            As4Config::default(),
            downstream.clone(),
            Arc::new(ManualClock::new(42)),
        )
        .unwrap();
        ctx.start().await.unwrap();

        ctx.pmode_store().create(pmode("pm-1")).unwrap();

        let store = Arc::clone(ctx.pmode_store());
        let handle = ctx
            .dispatch_pool()
            .supply(async move {
                store
                    .get_by_id("pm-1")
                    .ok_or_else(|| anyhow::anyhow!("pmode not found"))
            })
            .unwrap();
        assert_eq!(handle.await, Some(pmode("pm-1")));

        ctx.shutdown().await.unwrap();

        let events = downstream.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, AuditAction::Create);
        assert_eq!(events[0].timestamp, 42);

        assert_eq!(ctx.dispatch_pool().state(), PoolState::Stopped);
        assert!(matches!(
            ctx.dispatch_pool().run(async { Ok(()) }),
            Err(DispatchError::ShuttingDown)
        ));
    }

    #[tokio::test]
    async fn start_fails_on_invalid_stored_pmode() {
        let ctx = As4Context::build(As4Config::default()).unwrap();
        let mut broken = pmode("broken");
        broken.mep_binding = None;
        ctx.pmode_store().create(broken).unwrap();

        let err = ctx.start().await.unwrap_err();
        assert!(format!("{err:#}").contains("pmode"));
        ctx.terminate().await.unwrap();
    }

    #[tokio::test]
    async fn reset_picks_up_changes_written_to_the_data_store() {
        use crate::storage::data_store::{PModeDataStore, StoreMutation};
        use crate::storage::datastores::WalFileDataStore;
        use crate::storage::record::PModeRecord;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pmodes.json");
        let mut config = As4Config::default();
        config.pmode.backend = crate::service::config::StorageBackend::Wal;
        config.pmode.path = Some(path.clone());

        let ctx = As4Context::build(config).unwrap();
        ctx.start().await.unwrap();
        ctx.pmode_store().create(pmode("pm-1")).unwrap();

        let side_channel = WalFileDataStore::open(&path).unwrap();
        side_channel
            .append(&StoreMutation::Put {
                record: PModeRecord::new(pmode("pm-2"), 7),
            })
            .unwrap();
        assert!(ctx.pmode_store().get_record("pm-2").is_none());

        ctx.reset().await.unwrap();
        let ids: Vec<String> = ctx
            .pmode_store()
            .get_all()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec!["pm-1", "pm-2"]);

        ctx.shutdown().await.unwrap();
    }

    #[test]
    fn build_rejects_inconsistent_config() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let _guard = rt.enter();

        let mut config = As4Config::default();
        config.pmode.backend = crate::service::config::StorageBackend::Wal;
        assert!(As4Context::build(config).is_err());
    }
}
