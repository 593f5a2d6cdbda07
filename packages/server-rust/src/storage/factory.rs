//! Builds the configured [`PModeDataStore`] backend.

use std::path::Path;
use std::sync::Arc;

use crate::service::config::{PModeStoreConfig, StorageBackend};
use crate::storage::data_store::PModeDataStore;
use crate::storage::datastores::{NullDataStore, WalFileDataStore};

/// Opens the data store selected by `config.backend`.
///
/// # Errors
///
/// Returns an error if a durable backend has no path, was compiled out, or
/// cannot be opened.
pub fn open_data_store(config: &PModeStoreConfig) -> anyhow::Result<Arc<dyn PModeDataStore>> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(NullDataStore)),
        StorageBackend::Wal => {
            let path = required_path(config)?;
            Ok(Arc::new(WalFileDataStore::open(path)?))
        }
        StorageBackend::Redb => open_redb(required_path(config)?),
    }
}

fn required_path(config: &PModeStoreConfig) -> anyhow::Result<&Path> {
    config
        .path
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("pmode.path is required for the {:?} backend", config.backend))
}

#[cfg(feature = "redb")]
fn open_redb(path: &Path) -> anyhow::Result<Arc<dyn PModeDataStore>> {
    Ok(Arc::new(crate::storage::datastores::RedbDataStore::open(path)?))
}

#[cfg(not(feature = "redb"))]
fn open_redb(_path: &Path) -> anyhow::Result<Arc<dyn PModeDataStore>> {
    anyhow::bail!("the redb backend requires the `redb` feature")
}
