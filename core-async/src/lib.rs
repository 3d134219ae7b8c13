//! Async runtime facade for the decode engine.
//!
//! Every other crate in the workspace reaches the executor through this crate
//! rather than depending on Tokio directly, so the choice of runtime stays in
//! one place.
//!
//! # Modules
//!
//! - `task`: spawning, yielding, blocking offload
//! - `time`: sleeps, timeouts, instants
//! - `sync`: channels, locks and [`sync::CancellationToken`]
//! - `runtime`: building a runtime and `block_on`
//!
//! # Examples
//!
//! ```rust
//! use core_async::sync::CancellationToken;
//! use core_async::time::{sleep, Duration};
//!
//! async fn example() {
//!     let cancel = CancellationToken::new();
//!     let child = cancel.child_token();
//!
//!     let handle = core_async::spawn(async move {
//!         while !child.is_cancelled() {
//!             sleep(Duration::from_millis(5)).await;
//!         }
//!     });
//!
//!     cancel.cancel();
//!     let _ = handle.await;
//! }
//! ```

// Entry-point and test attributes, so downstream crates never need Tokio's.
pub use core_async_macros::{main, test};

pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;

pub use task::spawn;
pub use time::{sleep, Duration, Instant};
