//! Asynchronous execution of send/receive units of work.
//!
//! [`DispatchPool`] is an explicitly constructed resource: build it once,
//! hand it to the components that submit work, and shut it down through
//! [`DispatchPool::shutdown`] (or the service registry).

pub mod handle;
pub mod pool;
pub mod shutdown;

pub use handle::{DispatchError, DispatchHandle, TaskError};
pub use pool::DispatchPool;
pub use shutdown::{InFlightGuard, PoolState, ShutdownController};
