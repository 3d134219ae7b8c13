//! Workspace facade crate.
//!
//! Re-exports the decode engine and its runtime so host applications can
//! depend on `sonic-workspace` alone and toggle the `desktop-shims` feature
//! instead of wiring each crate individually.

pub use core_decode as decode;
pub use core_runtime as runtime;
