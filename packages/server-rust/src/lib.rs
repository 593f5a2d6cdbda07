//! AS4 Server — PMode store, dispatch pool, audit pipeline and service lifecycle.

pub mod audit;
pub mod context;
pub mod dispatch;
pub mod service;
pub mod storage;
pub mod telemetry;

pub use context::As4Context;
pub use dispatch::{DispatchError, DispatchHandle, DispatchPool, TaskError};
pub use service::As4Config;
pub use storage::{Change, PModeStore, PModeStoreError};
