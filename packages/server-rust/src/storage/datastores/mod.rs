//! `PModeDataStore` implementations.
//!
//! Provides concrete backends for the [`PModeDataStore`](super::PModeDataStore) trait:
//! [`NullDataStore`] for in-memory stores, [`WalFileDataStore`] for a JSON
//! snapshot plus write-ahead log, and (with the `redb` feature) [`RedbDataStore`].

mod null;
#[cfg(feature = "redb")]
mod redb;
mod wal;

pub use null::NullDataStore;
#[cfg(feature = "redb")]
pub use self::redb::RedbDataStore;
pub use wal::WalFileDataStore;
