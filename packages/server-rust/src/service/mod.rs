//! Service infrastructure shared by the AS4 components.
//!
//! 1. **Configuration** (`config`): `As4Config` and its per-service sections
//! 2. **Lifecycle** (`registry`): `ManagedService` and the `ServiceRegistry`
//! 3. **Background workers** (`worker`): queued and periodic tasks (audit forwarding)

pub mod config;
pub mod registry;
pub mod worker;

// Re-export key types for convenient access.
pub use config::{
    As4Config, AuditConfig, DispatchConfig, LogFormat, LoggingConfig, PModeStoreConfig,
    StorageBackend,
};
pub use registry::{ManagedService, ServiceContext, ServiceRegistry};
pub use worker::{BackgroundRunnable, BackgroundWorker};
