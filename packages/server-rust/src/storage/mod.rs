//! PMode storage for the AS4 server.
//!
//! Two layers:
//!
//! - [`PModeStore`]: the in-memory record map with soft delete, the
//!   default-PMode fallback, validation and audit emission
//! - [`PModeDataStore`]: the durable backend every mutation is written
//!   through before it takes effect
//!
//! [`open_data_store`] picks the backend from configuration.

pub mod data_store;
pub mod datastores;
pub mod factory;
pub mod pmode_store;
pub mod record;

pub use data_store::*;
pub use factory::open_data_store;
pub use pmode_store::*;
pub use record::*;
