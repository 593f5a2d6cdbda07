//! End-to-end lifecycle: build a context over a durable backend, mutate the
//! store, shut down, rebuild and check that everything came back.

use std::path::Path;
use std::sync::Arc;

use as4_core::{ManualClock, Mep, MepBinding, PMode, PModeParty};
use as4_server::audit::{AuditAction, AuditFailure, AuditOutcome, RecordingAuditSink};
use as4_server::service::{As4Config, StorageBackend};
use as4_server::{As4Context, Change};

fn pmode(id: &str) -> PMode {
    PMode {
        id: id.to_string(),
        agreement: Some("urn:as4:agreement:default".to_string()),
        mep: Some(Mep::OneWay),
        mep_binding: Some(MepBinding::Push),
        initiator: Some(
            PModeParty::new("AP_SENDER", "http://docs.oasis-open.org/ebxml-msg/ebms/v3.0/ns/core/200704/initiator")
                .with_id_type("urn:oasis:names:tc:ebcore:partyid-type:unregistered"),
        ),
        responder: Some(PModeParty::new(
            "AP_RECEIVER",
            "http://docs.oasis-open.org/ebxml-msg/ebms/v3.0/ns/core/200704/responder",
        )),
    }
}

fn config(backend: StorageBackend, path: &Path) -> As4Config {
    let mut config = As4Config::default();
    config.node_id = "msh-test".to_string();
    config.pmode.backend = backend;
    config.pmode.path = Some(path.to_path_buf());
    config.pmode.checkpoint_threshold = 3;
    config.dispatch.worker_count = 2;
    config
}

async fn populate(config: As4Config, audit: Arc<RecordingAuditSink>) {
    let ctx = As4Context::build_with(config, audit, Arc::new(ManualClock::new(1_000))).unwrap();
    ctx.start().await.unwrap();

    let store = ctx.pmode_store();
    store.create(pmode("pm-a")).unwrap();
    store.create(pmode("pm-b")).unwrap();
    store.create(pmode("pm-c")).unwrap();

    let mut updated = pmode("pm-a");
    updated.mep = Some(Mep::TwoWayPushPull);
    updated.mep_binding = Some(MepBinding::Pull);
    assert_eq!(store.update(updated).unwrap(), Change::Changed);

    assert_eq!(store.soft_delete("pm-b").unwrap(), Change::Changed);
    assert_eq!(store.soft_delete("pm-b").unwrap(), Change::Unchanged);
    assert_eq!(store.hard_delete("pm-c").unwrap(), Change::Changed);
    assert_eq!(store.set_default_id(Some("pm-a")).unwrap(), Change::Changed);

    // Work dispatched before shutdown still completes.
    let reader = Arc::clone(store);
    let handle = ctx
        .dispatch_pool()
        .supply(async move { Ok(reader.get_all().len()) })
        .unwrap();
    assert_eq!(handle.await, Some(1));

    ctx.shutdown().await.unwrap();
}

async fn verify(config: As4Config) {
    let ctx = As4Context::build(config).unwrap();
    ctx.start().await.unwrap();
    let store = ctx.pmode_store();

    let all = store.get_all();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, "pm-a");
    assert_eq!(all[0].mep, Some(Mep::TwoWayPushPull));
    assert_eq!(all[0].mep_binding, Some(MepBinding::Pull));
    assert_eq!(all[0], {
        let mut expected = pmode("pm-a");
        expected.mep = Some(Mep::TwoWayPushPull);
        expected.mep_binding = Some(MepBinding::Pull);
        expected
    });

    let deleted = store.get_record("pm-b").unwrap();
    assert_eq!(deleted.metadata.deletion_time, Some(1_000));
    assert!(store.get_record("pm-c").is_none());

    assert_eq!(store.get_default_id().as_deref(), Some("pm-a"));
    assert_eq!(store.get_by_id("pm-b").unwrap().id, "pm-a");
    assert_eq!(store.get_by_id("unknown").unwrap().id, "pm-a");

    let record = store.get_record("pm-a").unwrap();
    assert_eq!(record.metadata.version, 2);
    assert_eq!(record.metadata.creation_time, 1_000);

    ctx.shutdown().await.unwrap();
}

fn assert_audit_trail(audit: &RecordingAuditSink) {
    let summary: Vec<(String, AuditAction, AuditOutcome)> = audit
        .events()
        .into_iter()
        .map(|e| (e.object_id, e.action, e.outcome))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("pm-a".to_string(), AuditAction::Create, AuditOutcome::Success),
            ("pm-b".to_string(), AuditAction::Create, AuditOutcome::Success),
            ("pm-c".to_string(), AuditAction::Create, AuditOutcome::Success),
            ("pm-a".to_string(), AuditAction::Modify, AuditOutcome::Success),
            ("pm-b".to_string(), AuditAction::Delete, AuditOutcome::Success),
            (
                "pm-b".to_string(),
                AuditAction::Delete,
                AuditOutcome::Failure(AuditFailure::AlreadyDeleted)
            ),
            ("pm-c".to_string(), AuditAction::Delete, AuditOutcome::Success),
        ]
    );
}

#[tokio::test]
async fn wal_backend_round_trips_store_state() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pmodes.json");
    let audit = Arc::new(RecordingAuditSink::new());

    populate(config(StorageBackend::Wal, &path), audit.clone()).await;
    assert_audit_trail(&audit);

    // Shutdown checkpointed: the snapshot holds everything and the log is empty.
    let wal_path = dir.path().join("pmodes.json.wal");
    assert_eq!(std::fs::metadata(&wal_path).unwrap().len(), 0);
    let snapshot: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(snapshot["defaultId"], "pm-a");

    verify(config(StorageBackend::Wal, &path)).await;
}

#[cfg(feature = "redb")]
#[tokio::test]
async fn redb_backend_round_trips_store_state() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pmodes.redb");
    let audit = Arc::new(RecordingAuditSink::new());

    populate(config(StorageBackend::Redb, &path), audit.clone()).await;
    assert_audit_trail(&audit);

    verify(config(StorageBackend::Redb, &path)).await;
}

#[tokio::test]
async fn config_file_drives_the_context() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("data").join("pmodes.json");
    let config_path = dir.path().join("as4.json");
    let json = serde_json::json!({
        "nodeId": "msh-file",
        "pmode": { "backend": "wal", "path": store_path },
        "dispatch": { "workerCount": 1, "shutdownTimeoutMs": 500 },
        "audit": { "enabled": false }
    });
    std::fs::write(&config_path, serde_json::to_vec(&json).unwrap()).unwrap();

    let config = As4Config::from_json_file(&config_path).unwrap();
    let ctx = As4Context::build(config).unwrap();
    ctx.start().await.unwrap();
    assert_eq!(ctx.config().node_id, "msh-file");
    assert_eq!(ctx.dispatch_pool().worker_count(), 1);

    ctx.pmode_store().create(pmode("pm-file")).unwrap();
    ctx.shutdown().await.unwrap();
    assert!(store_path.exists());
}
