//! Media Source Abstractions
//!
//! A media source exposes the tracks of a container and yields one track's
//! compressed samples in decode order. Hosts provide an [`ExtractorFactory`]
//! that opens a [`MediaLocator`] into a [`MediaExtractor`]:
//! - Desktop: symphonia format readers over files or in-memory bytes
//! - Android: `MediaExtractor` over a content URI
//! - iOS: `AVAssetReader`

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use crate::error::Result;
use crate::platform::{PlatformSend, PlatformSendSync};

/// Well-known MIME types reported in [`TrackFormat::mime`].
pub mod mime {
    pub const AUDIO_PREFIX: &str = "audio/";

    pub const AUDIO_MPEG: &str = "audio/mpeg";
    pub const AUDIO_AAC: &str = "audio/mp4a-latm";
    pub const AUDIO_FLAC: &str = "audio/flac";
    pub const AUDIO_VORBIS: &str = "audio/vorbis";
    pub const AUDIO_OPUS: &str = "audio/opus";
    pub const AUDIO_ALAC: &str = "audio/alac";
    pub const AUDIO_RAW: &str = "audio/raw";
    /// An audio track whose codec has no known mapping.
    pub const AUDIO_UNKNOWN: &str = "audio/x-unknown";

    pub const VIDEO_AVC: &str = "video/avc";
    pub const TEXT_VTT: &str = "text/vtt";
    /// A track with no codec at all (cover art, attachments).
    pub const APPLICATION_OCTET_STREAM: &str = "application/octet-stream";

    /// Returns true for any `audio/*` type.
    pub fn is_audio(mime: &str) -> bool {
        mime.starts_with(AUDIO_PREFIX)
    }
}

/// Keys for [`TrackFormat::extra`].
pub mod keys {
    /// Bit mask of speaker positions, decimal.
    pub const CHANNEL_MASK: &str = "channel-mask";
    /// Sample encoding of `audio/raw` tracks, e.g. `s16le`, `f32le`.
    pub const PCM_ENCODING: &str = "pcm-encoding";
    /// Number of frames the encoder delays the stream by.
    pub const ENCODER_DELAY: &str = "encoder-delay";
    /// Number of padding frames at the end of the stream.
    pub const ENCODER_PADDING: &str = "encoder-padding";
    /// Bits per coded sample when it differs from the decoded width.
    pub const BITS_PER_CODED_SAMPLE: &str = "bits-per-coded-sample";
    pub const LANGUAGE: &str = "language";
}

/// Where a media source comes from.
#[derive(Clone, PartialEq, Eq)]
pub enum MediaLocator {
    /// A file on the local filesystem.
    Path(PathBuf),
    /// Bytes the host already has in memory (for example a resolved content
    /// handle). The hint helps format probing, e.g. `"mp3"`.
    Memory {
        data: Bytes,
        extension_hint: Option<String>,
    },
}

impl MediaLocator {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    pub fn memory(data: impl Into<Bytes>, extension_hint: Option<&str>) -> Self {
        Self::Memory {
            data: data.into(),
            extension_hint: extension_hint.map(str::to_string),
        }
    }

    /// File extension usable as a probe hint.
    pub fn extension_hint(&self) -> Option<String> {
        match self {
            MediaLocator::Path(path) => path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.to_ascii_lowercase()),
            MediaLocator::Memory { extension_hint, .. } => {
                extension_hint.as_ref().map(|ext| ext.to_ascii_lowercase())
            }
        }
    }
}

impl fmt::Debug for MediaLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaLocator::Path(path) => f.debug_tuple("Path").field(path).finish(),
            MediaLocator::Memory {
                data,
                extension_hint,
            } => f
                .debug_struct("Memory")
                .field("len", &data.len())
                .field("extension_hint", extension_hint)
                .finish(),
        }
    }
}

/// Format of one track as reported by its container.
///
/// Only `mime` is mandatory. Audio tracks normally carry `sample_rate` and
/// `channel_count`; everything else is codec dependent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackFormat {
    pub mime: String,
    pub sample_rate: Option<u32>,
    pub channel_count: Option<u16>,
    pub bits_per_sample: Option<u32>,
    /// Track duration in microseconds.
    pub duration_us: Option<i64>,
    pub max_frames_per_packet: Option<u64>,
    /// Codec initialization data (e.g. an AAC AudioSpecificConfig).
    pub codec_specific_data: Option<Bytes>,
    /// Additional string-valued properties, see [`keys`].
    pub extra: HashMap<String, String>,
}

impl TrackFormat {
    pub fn new(mime: impl Into<String>) -> Self {
        Self {
            mime: mime.into(),
            ..Default::default()
        }
    }

    pub fn audio(mime: impl Into<String>, sample_rate: u32, channel_count: u16) -> Self {
        Self {
            mime: mime.into(),
            sample_rate: Some(sample_rate),
            channel_count: Some(channel_count),
            ..Default::default()
        }
    }

    pub fn with_bits_per_sample(mut self, bits: u32) -> Self {
        self.bits_per_sample = Some(bits);
        self
    }

    pub fn with_duration_us(mut self, duration_us: i64) -> Self {
        self.duration_us = Some(duration_us);
        self
    }

    pub fn with_codec_specific_data(mut self, data: impl Into<Bytes>) -> Self {
        self.codec_specific_data = Some(data.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn is_audio(&self) -> bool {
        mime::is_audio(&self.mime)
    }

    pub fn extra_u64(&self, key: &str) -> Option<u64> {
        self.extra.get(key).and_then(|v| v.parse().ok())
    }
}

/// A demuxer positioned on one selected track.
///
/// The calls mirror a pull-style extractor: select a track, then repeatedly
/// read the current sample and advance. Implementations are driven from a
/// single task and are never shared.
pub trait MediaExtractor: PlatformSend {
    /// Number of tracks in the container.
    fn track_count(&self) -> usize;

    /// Format of track `index`.
    fn track_format(&self, index: usize) -> Result<TrackFormat>;

    /// Restricts reading to track `index`. Must be called before reading.
    fn select_track(&mut self, index: usize) -> Result<()>;

    /// Replaces `buf` with the current sample's bytes.
    ///
    /// Returns `Ok(None)` once the selected track has no more samples.
    fn read_sample_data(&mut self, buf: &mut Vec<u8>) -> Result<Option<usize>>;

    /// Presentation time of the current sample in microseconds, or `None`
    /// when no sample is available.
    fn sample_time(&self) -> Option<i64>;

    /// Moves to the next sample. Returns `false` when there is none.
    fn advance(&mut self) -> Result<bool>;

    /// Releases the underlying container. Further calls are invalid.
    fn release(&mut self);
}

/// Opens media sources. Shared across decode operations.
#[async_trait]
pub trait ExtractorFactory: PlatformSendSync {
    async fn open(&self, locator: &MediaLocator) -> Result<Box<dyn MediaExtractor>>;
}
