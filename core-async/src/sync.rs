//! Synchronization primitives.
//!
//! Async-aware locks and channels come from `tokio::sync`. Cooperative
//! cancellation uses [`CancellationToken`] from `tokio-util`: long-running
//! loops poll [`CancellationToken::is_cancelled`] between steps, and callers
//! trigger it from any task or thread.
//!
//! ```rust
//! use core_async::sync::CancellationToken;
//!
//! let parent = CancellationToken::new();
//! let child = parent.child_token();
//! parent.cancel();
//! assert!(child.is_cancelled());
//! ```

pub use tokio::sync::{
    broadcast, mpsc, oneshot, watch, Mutex, MutexGuard, Notify, RwLock, RwLockReadGuard,
    RwLockWriteGuard, Semaphore, SemaphorePermit,
};

pub use tokio_util::sync::{CancellationToken, DropGuard, WaitForCancellationFuture};
