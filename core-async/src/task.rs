//! Task spawning.
//!
//! Decodes are CPU-bound between their poll points, so hosts typically run
//! them with [`spawn`] on a multi-threaded runtime, or offload whole
//! operations with [`spawn_blocking`] when they drive the engine
//! synchronously.

pub use tokio::task::{spawn_blocking, yield_now, JoinError, JoinHandle};

/// Spawns `future` onto the current runtime.
///
/// # Examples
///
/// ```rust
/// # async fn example() {
/// let handle = core_async::task::spawn(async { 42 });
/// assert_eq!(handle.await.unwrap(), 42);
/// # }
/// ```
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::task::spawn(future)
}

/// Result type for joined tasks.
pub type Result<T> = std::result::Result<T, JoinError>;
