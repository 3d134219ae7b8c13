//! # Core Configuration Module
//!
//! Holds the host bridges and shared settings the decode engine runs on.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance. It enforces fail-fast validation so a missing media bridge is
//! reported when the host starts, not halfway through the first conversion.
//!
//! ## Required Dependencies
//!
//! - `ExtractorFactory` - Opens media sources and enumerates tracks
//! - `CodecProvider` - Finds and instantiates decoders
//!
//! When the `desktop-shims` feature is enabled, the symphonia-backed bridges
//! from `bridge-desktop` are injected automatically if not provided, and the
//! cache directory defaults to the user cache location.
//!
//! ## Usage
//!
//! ### Configuration with Desktop Defaults
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .cache_dir("/path/to/cache")
//!     .build()
//!     .expect("Failed to build config");
//! ```
//!
//! ### Configuration with Custom Bridges
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .cache_dir("/path/to/cache")
//!     .extractor_factory(Arc::new(MyExtractorFactory))
//!     .codec_provider(Arc::new(MyCodecProvider))
//!     .event_buffer_size(256)
//!     .build()
//!     .expect("Failed to build config");
//!
//! let events = config.event_bus();
//! ```

use crate::error::{Error, Result};
use crate::events::{EventBus, DEFAULT_EVENT_BUFFER_SIZE};
use bridge_traits::{CodecProvider, ExtractorFactory};
use std::path::PathBuf;
use std::sync::Arc;

/// Core configuration shared by every decode operation.
#[derive(Clone)]
pub struct CoreConfig {
    /// Directory for spooled PCM and other scratch files
    pub cache_dir: PathBuf,

    /// Opens media sources (required)
    pub extractor_factory: Arc<dyn ExtractorFactory>,

    /// Decoder lookup and instantiation (required)
    pub codec_provider: Arc<dyn CodecProvider>,

    /// Capacity of the event bus channel
    pub event_buffer_size: usize,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("cache_dir", &self.cache_dir)
            .field("extractor_factory", &"ExtractorFactory { ... }")
            .field("codec_provider", &"CodecProvider { ... }")
            .field("event_buffer_size", &self.event_buffer_size)
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Cache directory is not empty
    /// - Event buffer holds at least one event and at most 65 536
    pub fn validate(&self) -> Result<()> {
        if self.cache_dir.as_os_str().is_empty() {
            return Err(Error::Config("Cache directory cannot be empty".to_string()));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        if self.event_buffer_size > 65_536 {
            return Err(Error::Config(
                "Event buffer size cannot exceed 65536".to_string(),
            ));
        }

        Ok(())
    }

    /// A fresh event bus buffering up to `event_buffer_size` events per
    /// subscriber.
    pub fn event_bus(&self) -> EventBus {
        EventBus::new(self.event_buffer_size)
    }
}

fn extractor_factory_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "ExtractorFactory".to_string(),
        message: "ExtractorFactory implementation is required to open media sources. \
                 Desktop: ensure the 'desktop-shims' feature is enabled to use the default SymphoniaExtractorFactory. \
                 Mobile: inject the platform media extractor adapter."
            .to_string(),
    }
}

fn codec_provider_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "CodecProvider".to_string(),
        message: "CodecProvider implementation is required to decode audio. \
                 Desktop: ensure the 'desktop-shims' feature is enabled to use the default SymphoniaCodecProvider. \
                 Mobile: inject the platform codec adapter."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_extractor_factory() -> Result<Arc<dyn ExtractorFactory>> {
    use bridge_desktop::SymphoniaExtractorFactory;

    let factory: Arc<dyn ExtractorFactory> = Arc::new(SymphoniaExtractorFactory::new());
    Ok(factory)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_extractor_factory() -> Result<Arc<dyn ExtractorFactory>> {
    Err(extractor_factory_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_codec_provider() -> Result<Arc<dyn CodecProvider>> {
    use bridge_desktop::SymphoniaCodecProvider;

    let provider: Arc<dyn CodecProvider> = Arc::new(SymphoniaCodecProvider::new());
    Ok(provider)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_codec_provider() -> Result<Arc<dyn CodecProvider>> {
    Err(codec_provider_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_cache_dir() -> Result<PathBuf> {
    Ok(bridge_desktop::default_cache_dir())
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_cache_dir() -> Result<PathBuf> {
    Err(Error::Config(
        "Cache directory is required. Use .cache_dir() to set it.".to_string(),
    ))
}

/// Builder for constructing [`CoreConfig`] instances.
///
/// Call [`build()`](CoreConfigBuilder::build) once every bridge the host
/// provides has been set.
#[derive(Default)]
pub struct CoreConfigBuilder {
    cache_dir: Option<PathBuf>,
    extractor_factory: Option<Arc<dyn ExtractorFactory>>,
    codec_provider: Option<Arc<dyn CodecProvider>>,
    event_buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    /// Sets the cache directory.
    ///
    /// # Examples
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder()
    ///     .cache_dir("/path/to/cache");
    /// ```
    pub fn cache_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.cache_dir = Some(path.into());
        self
    }

    /// Sets the media extractor factory.
    ///
    /// If not provided, `SymphoniaExtractorFactory` is used when the
    /// `desktop-shims` feature is enabled.
    pub fn extractor_factory(mut self, factory: Arc<dyn ExtractorFactory>) -> Self {
        self.extractor_factory = Some(factory);
        self
    }

    /// Sets the codec provider.
    ///
    /// If not provided, `SymphoniaCodecProvider` is used when the
    /// `desktop-shims` feature is enabled.
    pub fn codec_provider(mut self, provider: Arc<dyn CodecProvider>) -> Self {
        self.codec_provider = Some(provider);
        self
    }

    /// Sets the event bus capacity. Defaults to [`DEFAULT_EVENT_BUFFER_SIZE`].
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Builds the configuration, filling platform defaults where available.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapabilityMissing`] when a media bridge is absent and
    /// no desktop default is compiled in, or [`Error::Config`] when a value
    /// fails validation.
    pub fn build(self) -> Result<CoreConfig> {
        let cache_dir = match self.cache_dir {
            Some(dir) => dir,
            None => provide_default_cache_dir()?,
        };

        let extractor_factory = match self.extractor_factory {
            Some(factory) => factory,
            None => provide_default_extractor_factory()?,
        };

        let codec_provider = match self.codec_provider {
            Some(provider) => provider,
            None => provide_default_codec_provider()?,
        };

        let config = CoreConfig {
            cache_dir,
            extractor_factory,
            codec_provider,
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;

        Ok(config)
    }
}
