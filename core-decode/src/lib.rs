//! # Decode Module
//!
//! Converts compressed audio into raw PCM and canonical WAV files by driving
//! a host-provided extractor and decoder through their buffer-exchange
//! protocol.
//!
//! ## Overview
//!
//! This module handles:
//! - Choosing the first audio track of a container
//! - Decoder session lifecycle (configure, start, stop, release)
//! - Pumping compressed samples into decoder input slots
//! - Draining decoded PCM out of decoder output slots
//! - Writing the 44-byte RIFF/WAVE header around the PCM
//! - Cancellation, stall detection and progress events
//!
//! The extractor and codec come from [`bridge_traits`]; the desktop build
//! ships symphonia-backed implementations in `bridge-desktop`.

pub mod config;
pub mod drain;
pub mod error;
pub mod orchestrator;
pub mod progress;
pub mod pump;
pub mod session;
pub mod sink;
pub mod track;
pub mod wav;

pub use config::{DecodeConfig, PcmSpool};
pub use error::{DecodeError, Result, SlotSide};
pub use orchestrator::{DecodeOutcome, DecodeSummary, OrchestratorState, PcmDecoder, PcmOutput};
pub use session::{DecoderSession, SessionState};
pub use sink::{MemoryPcmSink, PcmSink, SpoolPcmSink};
pub use track::{select_audio_track, TrackDescriptor, OUTPUT_BIT_DEPTH};
pub use wav::{write_wav, WavHeader, WavSpec, WAV_HEADER_LEN};
