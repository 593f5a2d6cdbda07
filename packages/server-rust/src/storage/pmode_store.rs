//! The PMode store: a persisted, keyed repository of Processing Modes.
//!
//! All mutations take the single writer lock, append to the
//! [`PModeDataStore`] and only then change the in-memory document, so a
//! failed append leaves the store untouched. Reads take the shared lock and
//! return owned copies. Audit events are emitted after the lock is released,
//! so racing writers on the same id may deliver their events out of commit
//! order; consumers that need ordering use [`AuditEvent::timestamp`].
//!
//! Soft-deleted records stay in the document (and on disk) but are hidden
//! from [`PModeStore::get_all`] and [`PModeStore::get_by_id`];
//! [`PModeStore::get_record`] still returns them with their metadata.

use std::fmt;
use std::sync::Arc;

use as4_core::{ClockSource, PMode, PModeValidationError, SystemClock};
use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{info, warn};

use super::data_store::{PModeDataStore, PModeDocument, StoreMutation};
use super::datastores::NullDataStore;
use super::record::PModeRecord;
use crate::audit::{
    AuditAction, AuditEvent, AuditFailure, AuditSink, CompositeAuditSink, OBJECT_TYPE_PMODE,
};
use crate::service::config::PModeStoreConfig;
use crate::service::registry::{ManagedService, ServiceContext};

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Whether a mutation changed the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Changed,
    Unchanged,
}

impl Change {
    #[must_use]
    pub fn is_changed(self) -> bool {
        self == Change::Changed
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::Changed => f.write_str("changed"),
            Change::Unchanged => f.write_str("unchanged"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PModeStoreError {
    /// A required argument was missing or blank.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("pmode '{id}' already exists")]
    DuplicateId { id: String },

    #[error("pmode '{id}' is invalid: {source}")]
    Invalid {
        id: String,
        #[source]
        source: PModeValidationError,
    },

    /// The data store rejected the write; in-memory state is unchanged.
    #[error("persistence failure: {0}")]
    Persistence(#[from] anyhow::Error),
}

impl PModeStoreError {
    fn audit_reason(&self) -> Option<AuditFailure> {
        match self {
            PModeStoreError::DuplicateId { .. } => Some(AuditFailure::DuplicateId),
            PModeStoreError::Persistence(_) => Some(AuditFailure::PersistenceError),
            PModeStoreError::InvalidArgument(_) | PModeStoreError::Invalid { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// PModeStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct StoreState {
    document: PModeDocument,
    mutations_since_checkpoint: u64,
}

impl StoreState {
    fn live(&self, id: &str) -> Option<&PMode> {
        self.document
            .records
            .get(id)
            .filter(|r| r.is_live())
            .map(|r| &r.pmode)
    }
}

pub struct PModeStore {
    state: RwLock<StoreState>,
    data_store: Arc<dyn PModeDataStore>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn ClockSource>,
    config: PModeStoreConfig,
}

impl PModeStore {
    /// Opens the store, loading the persisted document from `data_store`.
    ///
    /// # Errors
    ///
    /// Returns [`PModeStoreError::Persistence`] if the document cannot be loaded.
    pub fn open(
        data_store: Arc<dyn PModeDataStore>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn ClockSource>,
        config: PModeStoreConfig,
    ) -> Result<Self, PModeStoreError> {
        let document = data_store.load()?;
        info!(
            records = document.records.len(),
            default_id = ?document.default_id,
            persistent = !data_store.is_null(),
            "pmode store opened"
        );
        Ok(Self {
            state: RwLock::new(StoreState {
                document,
                mutations_since_checkpoint: 0,
            }),
            data_store,
            audit,
            clock,
            config,
        })
    }

    /// An empty, non-persistent store with no audit sink.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            data_store: Arc::new(NullDataStore),
            audit: Arc::new(CompositeAuditSink::default()),
            clock: Arc::new(SystemClock),
            config: PModeStoreConfig::default(),
        }
    }

    // -- mutations ---------------------------------------------------------

    /// Stores a new PMode and returns the stored record.
    ///
    /// # Errors
    ///
    /// - [`PModeStoreError::InvalidArgument`] if the id is blank.
    /// - [`PModeStoreError::DuplicateId`] if a record (live or soft-deleted) has this id.
    /// - [`PModeStoreError::Persistence`] if the write could not be made durable.
    pub fn create(&self, pmode: PMode) -> Result<PModeRecord, PModeStoreError> {
        if !pmode.has_id() {
            return Err(PModeStoreError::InvalidArgument("pmode id must not be blank"));
        }
        let id = pmode.id.clone();
        let now = self.clock.now_millis();

        let result = {
            let mut state = self.state.write();
            if state.document.records.contains_key(&id) {
                Err(PModeStoreError::DuplicateId { id: id.clone() })
            } else {
                let record = PModeRecord::new(pmode, now);
                self.commit(
                    &mut state,
                    StoreMutation::Put {
                        record: record.clone(),
                    },
                )
                .map(|()| record)
            }
        };

        match &result {
            Ok(_) => {
                self.audit_success(&id, AuditAction::Create, now);
                info!(pmode_id = %id, "created pmode");
            }
            Err(e) => self.audit_error(&id, AuditAction::Create, e, now),
        }
        result
    }

    /// Replaces the stored PMode with the same id.
    ///
    /// Returns [`Change::Unchanged`] (and audits a failure) if no record has
    /// this id. Updating a soft-deleted record keeps it deleted.
    ///
    /// # Errors
    ///
    /// - [`PModeStoreError::InvalidArgument`] if the id is blank.
    /// - [`PModeStoreError::Persistence`] if the write could not be made durable.
    pub fn update(&self, pmode: PMode) -> Result<Change, PModeStoreError> {
        if !pmode.has_id() {
            return Err(PModeStoreError::InvalidArgument("pmode id must not be blank"));
        }
        let id = pmode.id.clone();
        let now = self.clock.now_millis();

        let result = {
            let mut state = self.state.write();
            match state.document.records.get(&id) {
                None => Ok(Change::Unchanged),
                Some(existing) => {
                    let mut metadata = existing.metadata.clone();
                    metadata.on_update(now);
                    let record = PModeRecord { pmode, metadata };
                    self.commit(&mut state, StoreMutation::Put { record })
                        .map(|()| Change::Changed)
                }
            }
        };

        match &result {
            Ok(Change::Changed) => {
                self.audit_success(&id, AuditAction::Modify, now);
                info!(pmode_id = %id, "updated pmode");
            }
            Ok(Change::Unchanged) => {
                self.audit_failure(&id, AuditAction::Modify, AuditFailure::NoSuchId, now);
            }
            Err(e) => self.audit_error(&id, AuditAction::Modify, e, now),
        }
        result
    }

    /// Marks a record as deleted without removing it. Idempotent: a second
    /// call on the same id returns [`Change::Unchanged`].
    ///
    /// # Errors
    ///
    /// Returns [`PModeStoreError::Persistence`] if the write could not be made durable.
    pub fn soft_delete(&self, id: &str) -> Result<Change, PModeStoreError> {
        let now = self.clock.now_millis();

        let result = {
            let mut state = self.state.write();
            match state.document.records.get(id) {
                None => Err(AuditFailure::NoSuchObjectId),
                Some(existing) if existing.metadata.is_deleted() => {
                    Err(AuditFailure::AlreadyDeleted)
                }
                Some(existing) => {
                    let mut record = existing.clone();
                    record.metadata.mark_deleted(now);
                    Ok(self.commit(&mut state, StoreMutation::Put { record }))
                }
            }
        };

        match result {
            Err(reason) => {
                self.audit_failure(id, AuditAction::Delete, reason, now);
                Ok(Change::Unchanged)
            }
            Ok(Ok(())) => {
                self.audit_success(id, AuditAction::Delete, now);
                info!(pmode_id = %id, "marked pmode as deleted");
                Ok(Change::Changed)
            }
            Ok(Err(e)) => {
                self.audit_error(id, AuditAction::Delete, &e, now);
                Err(e)
            }
        }
    }

    /// Physically removes a record, live or soft-deleted.
    ///
    /// # Errors
    ///
    /// Returns [`PModeStoreError::Persistence`] if the write could not be made durable.
    pub fn hard_delete(&self, id: &str) -> Result<Change, PModeStoreError> {
        let now = self.clock.now_millis();

        let result = {
            let mut state = self.state.write();
            if state.document.records.contains_key(id) {
                self.commit(
                    &mut state,
                    StoreMutation::Remove { id: id.to_string() },
                )
                .map(|()| Change::Changed)
            } else {
                Ok(Change::Unchanged)
            }
        };

        match &result {
            Ok(Change::Changed) => {
                self.audit_success(id, AuditAction::Delete, now);
                info!(pmode_id = %id, "deleted pmode");
            }
            Ok(Change::Unchanged) => {
                self.audit_failure(id, AuditAction::Delete, AuditFailure::NoSuchObjectId, now);
            }
            Err(e) => self.audit_error(id, AuditAction::Delete, e, now),
        }
        result
    }

    /// Sets or clears the default-PMode pointer. The id does not need to
    /// resolve to a record. A blank id clears the pointer.
    ///
    /// # Errors
    ///
    /// Returns [`PModeStoreError::Persistence`] if the write could not be made durable.
    pub fn set_default_id(&self, id: Option<&str>) -> Result<Change, PModeStoreError> {
        let id = id.filter(|s| !s.trim().is_empty()).map(str::to_string);

        let mut state = self.state.write();
        if state.document.default_id == id {
            return Ok(Change::Unchanged);
        }
        self.commit(&mut state, StoreMutation::SetDefault { id: id.clone() })?;
        drop(state);

        info!(default_id = ?id, "default pmode changed");
        Ok(Change::Changed)
    }

    // -- reads -------------------------------------------------------------

    /// Snapshot of all live PModes, ordered by id.
    #[must_use]
    pub fn get_all(&self) -> Vec<PMode> {
        self.state
            .read()
            .document
            .records
            .values()
            .filter(|r| r.is_live())
            .map(|r| r.pmode.clone())
            .collect()
    }

    /// Live PMode with this id, falling back once to the default PMode.
    #[must_use]
    pub fn get_by_id(&self, id: &str) -> Option<PMode> {
        let state = self.state.read();
        state
            .live(id)
            .or_else(|| {
                state
                    .document
                    .default_id
                    .as_deref()
                    .and_then(|default_id| state.live(default_id))
            })
            .cloned()
    }

    /// The stored record with this id, including soft-deleted ones. No fallback.
    #[must_use]
    pub fn get_record(&self, id: &str) -> Option<PModeRecord> {
        self.state.read().document.records.get(id).cloned()
    }

    #[must_use]
    pub fn get_default_id(&self) -> Option<String> {
        self.state.read().document.default_id.clone()
    }

    /// Number of live records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state
            .read()
            .document
            .records
            .values()
            .filter(|r| r.is_live())
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // -- validation --------------------------------------------------------

    /// Checks the structural invariants of `pmode`.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self, pmode: &PMode) -> Result<(), PModeValidationError> {
        pmode.validate()
    }

    /// Validates every live record, in id order.
    ///
    /// # Errors
    ///
    /// Returns [`PModeStoreError::Invalid`] for the first invalid record.
    pub fn validate_all(&self) -> Result<(), PModeStoreError> {
        let state = self.state.read();
        for record in state.document.records.values().filter(|r| r.is_live()) {
            record
                .pmode
                .validate()
                .map_err(|source| PModeStoreError::Invalid {
                    id: record.id().to_string(),
                    source,
                })?;
        }
        Ok(())
    }

    // -- persistence -------------------------------------------------------

    /// Folds the data store's log into a fresh snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`PModeStoreError::Persistence`] if the snapshot could not be written.
    pub fn checkpoint(&self) -> Result<(), PModeStoreError> {
        let mut state = self.state.write();
        self.data_store.checkpoint(&state.document)?;
        state.mutations_since_checkpoint = 0;
        Ok(())
    }

    /// Discards in-memory state and reloads it from the data store.
    ///
    /// # Errors
    ///
    /// Returns [`PModeStoreError::Persistence`] if the document cannot be loaded;
    /// the current state is kept in that case.
    pub fn reload(&self) -> Result<(), PModeStoreError> {
        // Load under the writer lock so no commit lands between read and swap.
        let mut state = self.state.write();
        state.document = self.data_store.load()?;
        state.mutations_since_checkpoint = 0;
        Ok(())
    }

    /// Write-ahead commit. Must be called with the writer lock held.
    fn commit(&self, state: &mut StoreState, mutation: StoreMutation) -> Result<(), PModeStoreError> {
        self.data_store.append(&mutation)?;
        state.document.apply(mutation);
        state.mutations_since_checkpoint += 1;

        let threshold = self.config.checkpoint_threshold;
        if self.data_store.is_log_structured()
            && threshold > 0
            && state.mutations_since_checkpoint >= threshold
        {
            match self.data_store.checkpoint(&state.document) {
                Ok(()) => state.mutations_since_checkpoint = 0,
                // The mutation is already durable in the log; retry on the next one.
                Err(e) => warn!(error = %e, "pmode checkpoint failed"),
            }
        }
        Ok(())
    }

    // -- audit -------------------------------------------------------------

    fn audit_success(&self, id: &str, action: AuditAction, now: i64) {
        self.audit
            .on_event(&AuditEvent::success(OBJECT_TYPE_PMODE, id, action, now));
    }

    fn audit_failure(&self, id: &str, action: AuditAction, reason: AuditFailure, now: i64) {
        self.audit.on_event(&AuditEvent::failure(
            OBJECT_TYPE_PMODE,
            id,
            action,
            reason,
            now,
        ));
    }

    fn audit_error(&self, id: &str, action: AuditAction, error: &PModeStoreError, now: i64) {
        if matches!(error, PModeStoreError::Persistence(_)) {
            warn!(pmode_id = %id, action = %action, error = %error, "pmode mutation failed");
        }
        if let Some(reason) = error.audit_reason() {
            self.audit_failure(id, action, reason, now);
        }
    }
}

#[async_trait]
impl ManagedService for PModeStore {
    fn name(&self) -> &'static str {
        "pmode"
    }

    async fn init(&self, _ctx: &ServiceContext) -> anyhow::Result<()> {
        if self.config.validate_on_start {
            self.validate_all()?;
        }
        info!(records = self.len(), "pmode store ready");
        Ok(())
    }

    async fn reset(&self) -> anyhow::Result<()> {
        self.reload()?;
        Ok(())
    }

    async fn shutdown(&self, _terminate: bool) -> anyhow::Result<()> {
        if self.data_store.is_log_structured() {
            self.checkpoint()?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
