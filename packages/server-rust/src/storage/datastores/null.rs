//! No-op [`PModeDataStore`] implementation.
//!
//! [`NullDataStore`] discards all writes and loads an empty document.
//! Used for in-memory deployments and tests.

use crate::storage::data_store::{PModeDataStore, PModeDocument, StoreMutation};

/// No-op `PModeDataStore` for in-memory stores.
///
/// All write operations succeed immediately without side effects. This is the
/// default data store when no persistence backend is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDataStore;

impl PModeDataStore for NullDataStore {
    fn load(&self) -> anyhow::Result<PModeDocument> {
        Ok(PModeDocument::default())
    }

    fn append(&self, _mutation: &StoreMutation) -> anyhow::Result<()> {
        Ok(())
    }

    fn checkpoint(&self, _document: &PModeDocument) -> anyhow::Result<()> {
        Ok(())
    }

    fn is_null(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_store_is_empty_and_accepts_writes() {
        let store = NullDataStore;
        assert!(store.is_null());
        assert!(!store.is_log_structured());
        store
            .append(&StoreMutation::Remove { id: "x".to_string() })
            .unwrap();
        store.checkpoint(&PModeDocument::default()).unwrap();
        assert_eq!(store.load().unwrap(), PModeDocument::default());
    }
}
