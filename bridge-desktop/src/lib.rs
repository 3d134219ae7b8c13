//! # Desktop Bridge Implementations
//!
//! Default implementations of the media bridges for desktop platforms
//! (macOS, Windows, Linux), built on the pure-Rust `symphonia` stack.
//!
//! ## Overview
//!
//! - `ExtractorFactory` / `MediaExtractor` using symphonia's probe and format readers
//! - `CodecProvider` / `MediaCodec` using symphonia's decoders behind a
//!   slot-based buffer exchange
//! - Cache directory resolution using `dirs`
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{SymphoniaCodecProvider, SymphoniaExtractorFactory};
//! use std::sync::Arc;
//!
//! let extractors = Arc::new(SymphoniaExtractorFactory::new());
//! let codecs = Arc::new(SymphoniaCodecProvider::new());
//! // Hand both to the runtime configuration or directly to the decoder.
//! ```

mod codec;
mod codec_map;
mod extractor;
mod filesystem;
mod sample_converter;

pub use codec::{SymphoniaCodec, SymphoniaCodecProvider};
pub use extractor::{SymphoniaExtractor, SymphoniaExtractorFactory};
pub use filesystem::{default_cache_dir, ensure_dir};
