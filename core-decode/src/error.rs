//! # Decode Error Types
//!
//! Every way a decode-and-remux operation can stop short of a finished file.
//! Cancellation is not an error; it is reported through
//! [`DecodeOutcome::Cancelled`](crate::DecodeOutcome::Cancelled).

use bridge_traits::error::BridgeError;
use std::fmt;
use std::io;
use thiserror::Error;

/// Which half of the codec exchange a slot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotSide {
    Input,
    Output,
}

impl fmt::Display for SlotSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotSide::Input => f.write_str("input"),
            SlotSide::Output => f.write_str("output"),
        }
    }
}

/// Errors that can occur while decoding a source to PCM or WAV.
#[derive(Error, Debug)]
pub enum DecodeError {
    // ========================================================================
    // Source Errors
    // ========================================================================
    /// The source could not be opened or probed.
    #[error("Media source unavailable: {0}")]
    SourceUnavailable(String),

    /// No track in the source has an `audio/` MIME type.
    #[error("No audio track found in source")]
    NoAudioTrack,

    /// The selected audio track lacks a sample rate or channel count.
    #[error("Invalid audio track format: {0}")]
    InvalidTrackFormat(String),

    /// Reading or advancing the source failed mid-stream.
    #[error("Media source error: {0}")]
    Source(#[source] BridgeError),

    // ========================================================================
    // Codec Errors
    // ========================================================================
    /// The provider has no decoder for the track's MIME type.
    #[error("No decoder available for {mime}")]
    NoDecoder { mime: String },

    /// The decoder rejected a configure, start, queue, or dequeue call.
    #[error("Decoder error: {0}")]
    Codec(#[source] BridgeError),

    /// A slot index handed out by the decoder had no buffer behind it.
    #[error("Decoder provider crashed: {side} slot {index} has no buffer")]
    ProviderCrashed { side: SlotSide, index: usize },

    /// The decoder broke the exchange protocol (e.g. signalled end of stream
    /// before it was given one, or described bytes outside its own buffer).
    #[error("Decoder protocol violation: {0}")]
    ProtocolViolation(String),

    /// The loop went too long without submitting input or receiving output.
    #[error("Decoder stalled after {polls} idle polls without end of stream")]
    StallTimeout { polls: u32 },

    // ========================================================================
    // Output Errors
    // ========================================================================
    /// Writing PCM or the WAV container failed.
    #[error("Output write failed: {0}")]
    OutputWriteFailure(#[from] io::Error),

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    #[error("Invalid decode configuration: {0}")]
    InvalidConfig(String),
}

impl DecodeError {
    /// Whether the failure is a property of the input rather than the
    /// decoder or the output. Retrying the same source will fail again.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            DecodeError::SourceUnavailable(_)
                | DecodeError::NoAudioTrack
                | DecodeError::InvalidTrackFormat(_)
                | DecodeError::NoDecoder { .. }
        )
    }

    /// Stable snake_case name used in events and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            DecodeError::SourceUnavailable(_) => "source_unavailable",
            DecodeError::NoAudioTrack => "no_audio_track",
            DecodeError::InvalidTrackFormat(_) => "invalid_track_format",
            DecodeError::Source(_) => "source_error",
            DecodeError::NoDecoder { .. } => "no_decoder",
            DecodeError::Codec(_) => "codec_error",
            DecodeError::ProviderCrashed { .. } => "provider_crashed",
            DecodeError::ProtocolViolation(_) => "protocol_violation",
            DecodeError::StallTimeout { .. } => "stall_timeout",
            DecodeError::OutputWriteFailure(_) => "output_write_failure",
            DecodeError::InvalidConfig(_) => "invalid_config",
        }
    }
}

/// Result type for decode operations.
pub type Result<T> = std::result::Result<T, DecodeError>;
