//! # Host Bridge Traits
//!
//! Platform abstraction traits that each host supplies to the decode engine.
//!
//! ## Overview
//!
//! The engine never talks to a container parser or a codec directly. It
//! drives them through the traits in this crate, so the same orchestration
//! runs on top of symphonia on desktop, or on a platform codec service on
//! mobile.
//!
//! ## Traits
//!
//! ### Media
//! - [`ExtractorFactory`](media::ExtractorFactory) - Opens a [`MediaLocator`](media::MediaLocator)
//! - [`MediaExtractor`](media::MediaExtractor) - Track enumeration and compressed sample reads
//! - [`CodecProvider`](codec::CodecProvider) - Decoder lookup by track format
//! - [`MediaCodec`](codec::MediaCodec) - Slot-based buffer-exchange decoder
//!
//! ### Utilities
//! - [`LoggerSink`](logging::LoggerSink) - Forward structured logs to host logging
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate | Status |
//! |----------|---------------------|--------|
//! | Desktop  | `bridge-desktop`    | ✅ symphonia |
//! | Android  | TBD                 | 📋 Planned |
//! | iOS      | TBD                 | 📋 Planned |
//!
//! ## Fail-Fast Strategy
//!
//! The runtime refuses to build a configuration without both media bridges:
//!
//! ```ignore
//! let codecs = builder.codec_provider
//!     .ok_or_else(|| Error::CapabilityMissing {
//!         capability: "CodecProvider".to_string(),
//!         message: "No codec provider supplied. \
//!                   Desktop: enable the desktop-shims feature. \
//!                   Mobile: inject the platform codec adapter.".to_string(),
//!     })?;
//! ```
//!
//! ## Error Handling
//!
//! Every bridge returns [`BridgeError`](error::BridgeError). Implementations
//! should map platform failures into it with enough context (track index,
//! codec name, path) for the caller to act on.

pub mod codec;
pub mod error;
pub mod logging;
pub mod media;
pub mod platform;

pub use error::BridgeError;

pub use codec::{BufferFlags, BufferInfo, CodecProvider, MediaCodec, OutputEvent};
pub use logging::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
pub use media::{ExtractorFactory, MediaExtractor, MediaLocator, TrackFormat};
