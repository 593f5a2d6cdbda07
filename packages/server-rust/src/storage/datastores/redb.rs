//! [`PModeDataStore`] backed by an embedded redb database.
//!
//! Records live in the `pmodes` table (id -> MessagePack-encoded
//! [`PModeRecord`]); the default-PMode pointer lives under a fixed key in the
//! `meta` table. Every mutation is its own durable write transaction, so no
//! log compaction is needed.

use std::path::Path;

use anyhow::Context;
use redb::{Database, ReadableTable, TableDefinition};

use crate::storage::data_store::{PModeDataStore, PModeDocument, StoreMutation};
use crate::storage::record::PModeRecord;

const PMODES: TableDefinition<&str, &[u8]> = TableDefinition::new("pmodes");
const META: TableDefinition<&str, &str> = TableDefinition::new("meta");
const DEFAULT_ID_KEY: &str = "default_pmode";

pub struct RedbDataStore {
    db: Database,
}

impl RedbDataStore {
    /// Opens (creating if needed) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("cannot create {}", parent.display()))?;
            }
        }
        let db = Database::create(path)
            .with_context(|| format!("cannot open redb database {}", path.display()))?;

        // Create both tables up front so read transactions never miss them.
        let txn = db.begin_write()?;
        {
            txn.open_table(PMODES)?;
            txn.open_table(META)?;
        }
        txn.commit()?;

        Ok(Self { db })
    }
}

impl PModeDataStore for RedbDataStore {
    fn load(&self) -> anyhow::Result<PModeDocument> {
        let txn = self.db.begin_read()?;
        let mut document = PModeDocument::default();

        let records = txn.open_table(PMODES)?;
        for entry in records.iter()? {
            let (key, value) = entry?;
            let record: PModeRecord = rmp_serde::from_slice(value.value())
                .with_context(|| format!("corrupt pmode record '{}'", key.value()))?;
            document.records.insert(key.value().to_string(), record);
        }

        let meta = txn.open_table(META)?;
        document.default_id = meta.get(DEFAULT_ID_KEY)?.map(|v| v.value().to_string());

        Ok(document)
    }

    fn append(&self, mutation: &StoreMutation) -> anyhow::Result<()> {
        let txn = self.db.begin_write()?;
        match mutation {
            StoreMutation::Put { record } => {
                let bytes = rmp_serde::to_vec_named(record)?;
                let mut table = txn.open_table(PMODES)?;
                table.insert(record.id(), bytes.as_slice())?;
            }
            StoreMutation::Remove { id } => {
                let mut table = txn.open_table(PMODES)?;
                table.remove(id.as_str())?;
            }
            StoreMutation::SetDefault { id } => {
                let mut table = txn.open_table(META)?;
                match id {
                    Some(id) => {
                        table.insert(DEFAULT_ID_KEY, id.as_str())?;
                    }
                    None => {
                        table.remove(DEFAULT_ID_KEY)?;
                    }
                }
            }
        }
        txn.commit()?;
        Ok(())
    }

    fn checkpoint(&self, document: &PModeDocument) -> anyhow::Result<()> {
        let txn = self.db.begin_write()?;
        txn.delete_table(PMODES)?;
        {
            let mut table = txn.open_table(PMODES)?;
            for (id, record) in &document.records {
                let bytes = rmp_serde::to_vec_named(record)?;
                table.insert(id.as_str(), bytes.as_slice())?;
            }
            let mut meta = txn.open_table(META)?;
            match &document.default_id {
                Some(id) => {
                    meta.insert(DEFAULT_ID_KEY, id.as_str())?;
                }
                None => {
                    meta.remove(DEFAULT_ID_KEY)?;
                }
            }
        }
        txn.commit()?;
        Ok(())
    }
}
