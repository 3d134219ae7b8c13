//! Thread-safety markers shared by every bridge trait.
//!
//! Sources and codecs are owned by one decode operation at a time, so they
//! only need to move between threads (`PlatformSend`). Factories and
//! providers are shared behind `Arc` and need `PlatformSendSync`.

/// Marker trait for `Send + Sync` bridge implementations.
pub trait PlatformSendSync: Send + Sync {}

impl<T> PlatformSendSync for T where T: Send + Sync {}

/// Marker trait for bridge objects that are moved, not shared.
pub trait PlatformSend: Send {}

impl<T> PlatformSend for T where T: Send {}
