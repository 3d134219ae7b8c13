//! Runtime construction helpers.

pub use tokio::runtime::{Builder, Handle, Runtime};

/// Drives `future` to completion on a fresh current-thread runtime.
///
/// Used by the `#[core_async::main]` and `#[core_async::test]` attributes.
/// Panics if the runtime cannot be built, which only happens when the
/// process is out of OS resources.
pub fn block_on<F>(future: F) -> F::Output
where
    F: std::future::Future,
{
    Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|err| panic!("core_async::runtime::block_on: {err}"))
        .block_on(future)
}
