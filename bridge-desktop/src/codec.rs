//! # Symphonia Codec Bridge
//!
//! Exposes symphonia's packet decoders through the slot-based
//! [`MediaCodec`] protocol.
//!
//! Symphonia decodes synchronously, one packet at a time. `SymphoniaCodec`
//! decodes each submitted input slot immediately and parks the PCM in a
//! pending queue; output slots are filled from that queue as the caller
//! dequeues them. Input slots stop being handed out while the queue is
//! backed up, which gives the caller the same backpressure a hardware codec
//! would.

use async_trait::async_trait;
use bridge_traits::{
    codec::{BufferFlags, BufferInfo, CodecProvider, MediaCodec, OutputEvent},
    error::{BridgeError, Result},
    media::{keys, mime, TrackFormat},
};
use std::collections::VecDeque;
use std::time::Duration;
use symphonia::core::audio::SignalSpec;
use symphonia::core::codecs::{CodecDescriptor, CodecType, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::Packet;
use tracing::{debug, error, info, instrument, warn};

use crate::codec_map;
use crate::sample_converter::SampleConverter;

const NAME_PREFIX: &str = "symphonia.";
const DEFAULT_INPUT_SLOTS: usize = 4;
const DEFAULT_OUTPUT_SLOTS: usize = 4;
const MAX_CONSECUTIVE_ERRORS: usize = 10;

fn descriptor_for(codec: CodecType) -> Option<&'static CodecDescriptor> {
    symphonia::default::get_codecs().get_codec(codec)
}

fn codec_name(descriptor: &CodecDescriptor) -> String {
    format!("{}{}", NAME_PREFIX, descriptor.short_name)
}

/// Finds and creates symphonia-backed decoders.
#[derive(Debug, Clone)]
pub struct SymphoniaCodecProvider {
    input_slots: usize,
    output_slots: usize,
}

impl SymphoniaCodecProvider {
    pub fn new() -> Self {
        Self {
            input_slots: DEFAULT_INPUT_SLOTS,
            output_slots: DEFAULT_OUTPUT_SLOTS,
        }
    }

    /// Overrides the number of input and output slots per codec (minimum 1).
    pub fn with_slots(mut self, input_slots: usize, output_slots: usize) -> Self {
        self.input_slots = input_slots.max(1);
        self.output_slots = output_slots.max(1);
        self
    }

    /// Names of every decoder available in this build.
    pub fn decoder_names(&self) -> Vec<String> {
        let mut names: Vec<String> = codec_map::known_codecs()
            .filter_map(descriptor_for)
            .map(codec_name)
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

impl Default for SymphoniaCodecProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl CodecProvider for SymphoniaCodecProvider {
    fn find_decoder_for_format(&self, format: &TrackFormat) -> Option<String> {
        let codec = codec_map::codec_for_format(format)?;
        let name = descriptor_for(codec).map(codec_name);
        debug!(mime = %format.mime, decoder = ?name, "Decoder lookup");
        name
    }

    fn create_by_codec_name(&self, name: &str) -> Result<Box<dyn MediaCodec>> {
        let known = codec_map::known_codecs()
            .filter_map(descriptor_for)
            .any(|descriptor| codec_name(descriptor) == name);
        if !known {
            return Err(BridgeError::NotAvailable(format!("no decoder named {}", name)));
        }
        Ok(Box::new(SymphoniaCodec::new(
            name.to_string(),
            self.input_slots,
            self.output_slots,
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CodecState {
    Created,
    Configured,
    Running,
    Stopped,
    Released,
}

enum Pending {
    FormatChanged,
    Data {
        pcm: Vec<u8>,
        presentation_time_us: i64,
        flags: BufferFlags,
    },
}

struct SlotPool {
    buffers: Vec<Vec<u8>>,
    owned: Vec<bool>,
    free: VecDeque<usize>,
}

impl SlotPool {
    fn new(count: usize) -> Self {
        Self {
            buffers: vec![Vec::new(); count],
            owned: vec![false; count],
            free: (0..count).collect(),
        }
    }

    fn take(&mut self) -> Option<usize> {
        let index = self.free.pop_front()?;
        self.owned[index] = true;
        Some(index)
    }

    fn give_back(&mut self, index: usize) -> Result<()> {
        match self.owned.get_mut(index) {
            Some(owned) if *owned => {
                *owned = false;
                self.buffers[index].clear();
                self.free.push_back(index);
                Ok(())
            }
            _ => Err(BridgeError::InvalidArgument(format!(
                "slot {} is not held by the caller",
                index
            ))),
        }
    }

    fn is_owned(&self, index: usize) -> bool {
        self.owned.get(index).copied().unwrap_or(false)
    }

    fn reset(&mut self) {
        let count = self.buffers.len();
        *self = Self::new(count);
    }
}

/// A symphonia decoder driven through input and output slots.
pub struct SymphoniaCodec {
    name: String,
    state: CodecState,
    decoder: Option<Box<dyn Decoder>>,
    input: SlotPool,
    output: SlotPool,
    pending: VecDeque<Pending>,
    output_spec: Option<SignalSpec>,
    input_eos: bool,
    consecutive_errors: usize,
}

impl SymphoniaCodec {
    fn new(name: String, input_slots: usize, output_slots: usize) -> Self {
        Self {
            name,
            state: CodecState::Created,
            decoder: None,
            input: SlotPool::new(input_slots),
            output: SlotPool::new(output_slots),
            pending: VecDeque::new(),
            output_spec: None,
            input_eos: false,
            consecutive_errors: 0,
        }
    }

    fn require_running(&self, op: &str) -> Result<()> {
        if self.state == CodecState::Running {
            Ok(())
        } else {
            Err(BridgeError::OperationFailed(format!(
                "{} called in state {:?}",
                op, self.state
            )))
        }
    }

    fn backlog_full(&self) -> bool {
        let data = self
            .pending
            .iter()
            .filter(|p| matches!(p, Pending::Data { .. }))
            .count();
        data >= self.output.buffers.len()
    }

    /// Decodes one packet into the pending queue, skipping corrupt packets.
    fn decode_packet(&mut self, data: &[u8], presentation_time_us: i64) -> Result<()> {
        let decoder = self
            .decoder
            .as_mut()
            .ok_or_else(|| BridgeError::OperationFailed("decoder not configured".to_string()))?;

        let ts = presentation_time_us.max(0) as u64;
        let packet = Packet::new_from_slice(0, ts, 0, data);

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => {
                let mut pcm = Vec::new();
                SampleConverter::append_interleaved_s16le(&decoded, &mut pcm);
                Ok((*decoded.spec(), pcm))
            }
            Err(e) => Err(e),
        };

        match decoded {
            Ok((spec, pcm)) => {
                self.consecutive_errors = 0;
                if self.output_spec != Some(spec) {
                    debug!(
                        rate = spec.rate,
                        channels = spec.channels.count(),
                        "Output format changed"
                    );
                    self.output_spec = Some(spec);
                    self.pending.push_back(Pending::FormatChanged);
                }
                if !pcm.is_empty() {
                    self.pending.push_back(Pending::Data {
                        pcm,
                        presentation_time_us,
                        flags: BufferFlags::NONE,
                    });
                }
                Ok(())
            }
            Err(SymphoniaError::DecodeError(err)) => self.skip_packet(err),
            Err(SymphoniaError::IoError(err)) => self.skip_packet(&err.to_string()),
            Err(SymphoniaError::ResetRequired) => {
                warn!("Decoder reset required");
                if let Some(decoder) = self.decoder.as_mut() {
                    decoder.reset();
                }
                Ok(())
            }
            Err(e) => {
                error!("Fatal decode error: {}", e);
                Err(BridgeError::OperationFailed(format!(
                    "failed to decode packet: {}",
                    e
                )))
            }
        }
    }

    fn skip_packet(&mut self, reason: &str) -> Result<()> {
        self.consecutive_errors += 1;
        warn!(
            "Skipping packet with decode error (attempt {}/{}): {}",
            self.consecutive_errors, MAX_CONSECUTIVE_ERRORS, reason
        );
        if self.consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
            error!("Too many consecutive decode errors, stream may be corrupted");
            return Err(BridgeError::OperationFailed(format!(
                "decoder failure after {} failed packets: {}",
                MAX_CONSECUTIVE_ERRORS, reason
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl MediaCodec for SymphoniaCodec {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, format), fields(codec = %self.name, mime = %format.mime))]
    fn configure(&mut self, format: &TrackFormat) -> Result<()> {
        if self.state != CodecState::Created {
            return Err(BridgeError::OperationFailed(format!(
                "configure called in state {:?}",
                self.state
            )));
        }

        let params = codec_map::codec_parameters(format)?;
        let matches_name = descriptor_for(params.codec)
            .map(|descriptor| codec_name(descriptor) == self.name)
            .unwrap_or(false);
        if !matches_name {
            return Err(BridgeError::Unsupported(format!(
                "{} cannot decode {}",
                self.name, format.mime
            )));
        }

        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| {
                error!("Failed to create decoder: {}", e);
                BridgeError::Unsupported(format!("failed to create decoder: {}", e))
            })?;

        self.decoder = Some(decoder);
        self.state = CodecState::Configured;
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        match self.state {
            CodecState::Configured | CodecState::Stopped if self.decoder.is_some() => {
                self.state = CodecState::Running;
                info!(codec = %self.name, "Decoder started");
                Ok(())
            }
            state => Err(BridgeError::OperationFailed(format!(
                "start called in state {:?}",
                state
            ))),
        }
    }

    async fn dequeue_input_buffer(&mut self, _timeout: Duration) -> Result<Option<usize>> {
        self.require_running("dequeue_input_buffer")?;
        // Decoding happens inline, so waiting cannot free a slot.
        if self.input_eos || self.backlog_full() {
            return Ok(None);
        }
        Ok(self.input.take())
    }

    fn input_buffer(&mut self, index: usize) -> Option<&mut Vec<u8>> {
        if self.state != CodecState::Running || !self.input.is_owned(index) {
            return None;
        }
        self.input.buffers.get_mut(index)
    }

    fn queue_input_buffer(
        &mut self,
        index: usize,
        size: usize,
        presentation_time_us: i64,
        flags: BufferFlags,
    ) -> Result<()> {
        self.require_running("queue_input_buffer")?;
        if !self.input.is_owned(index) {
            return Err(BridgeError::InvalidArgument(format!(
                "input slot {} is not held by the caller",
                index
            )));
        }
        if size > self.input.buffers[index].len() {
            return Err(BridgeError::InvalidArgument(format!(
                "size {} exceeds input slot {} length {}",
                size,
                index,
                self.input.buffers[index].len()
            )));
        }

        let data = std::mem::take(&mut self.input.buffers[index]);
        self.input.give_back(index)?;

        if size > 0 {
            self.decode_packet(&data[..size], presentation_time_us)?;
        }

        if flags.is_end_of_stream() {
            debug!(codec = %self.name, "Input end of stream");
            self.input_eos = true;
            self.pending.push_back(Pending::Data {
                pcm: Vec::new(),
                presentation_time_us,
                flags: BufferFlags::END_OF_STREAM,
            });
        }
        Ok(())
    }

    async fn dequeue_output_buffer(&mut self, _timeout: Duration) -> Result<OutputEvent> {
        self.require_running("dequeue_output_buffer")?;

        match self.pending.front() {
            None => return Ok(OutputEvent::TryAgainLater),
            Some(Pending::FormatChanged) => {
                self.pending.pop_front();
                return Ok(OutputEvent::FormatChanged);
            }
            Some(Pending::Data { .. }) => {}
        }

        let Some(index) = self.output.take() else {
            return Ok(OutputEvent::TryAgainLater);
        };
        let (pcm, presentation_time_us, flags) = match self.pending.pop_front() {
            Some(Pending::Data {
                pcm,
                presentation_time_us,
                flags,
            }) => (pcm, presentation_time_us, flags),
            other => {
                if let Some(pending) = other {
                    self.pending.push_front(pending);
                }
                self.output.give_back(index)?;
                return Ok(OutputEvent::TryAgainLater);
            }
        };

        let info = BufferInfo {
            offset: 0,
            size: pcm.len(),
            presentation_time_us,
            flags,
        };
        self.output.buffers[index] = pcm;
        Ok(OutputEvent::Buffer { index, info })
    }

    fn output_buffer(&self, index: usize) -> Option<&[u8]> {
        if self.state != CodecState::Running || !self.output.is_owned(index) {
            return None;
        }
        self.output.buffers.get(index).map(Vec::as_slice)
    }

    fn release_output_buffer(&mut self, index: usize) -> Result<()> {
        self.require_running("release_output_buffer")?;
        self.output.give_back(index)
    }

    fn output_format(&self) -> Option<TrackFormat> {
        let spec = self.output_spec?;
        Some(
            TrackFormat::audio(mime::AUDIO_RAW, spec.rate, spec.channels.count() as u16)
                .with_bits_per_sample(16)
                .with_extra(keys::PCM_ENCODING, "s16le")
                .with_extra(keys::CHANNEL_MASK, spec.channels.bits().to_string()),
        )
    }

    fn stop(&mut self) -> Result<()> {
        match self.state {
            CodecState::Running | CodecState::Configured | CodecState::Stopped => {
                self.pending.clear();
                self.input.reset();
                self.output.reset();
                self.input_eos = false;
                self.consecutive_errors = 0;
                if let Some(decoder) = self.decoder.as_mut() {
                    decoder.reset();
                }
                self.state = CodecState::Stopped;
                debug!(codec = %self.name, "Decoder stopped");
                Ok(())
            }
            state => Err(BridgeError::OperationFailed(format!(
                "stop called in state {:?}",
                state
            ))),
        }
    }

    fn release(&mut self) {
        if self.state == CodecState::Released {
            return;
        }
        self.decoder = None;
        self.pending.clear();
        self.input = SlotPool::new(0);
        self.output = SlotPool::new(0);
        self.state = CodecState::Released;
        debug!(codec = %self.name, "Decoder released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm_format() -> TrackFormat {
        let mut format = TrackFormat::audio(mime::AUDIO_RAW, 8_000, 1)
            .with_bits_per_sample(16)
            .with_extra(keys::PCM_ENCODING, "s16le");
        format.max_frames_per_packet = Some(64);
        format
    }

    #[test]
    fn test_provider_finds_pcm_decoder() {
        let provider = SymphoniaCodecProvider::new();
        let name = provider.find_decoder_for_format(&pcm_format());
        assert!(name.as_deref().map(|n| n.starts_with(NAME_PREFIX)).unwrap_or(false));
        assert!(provider.decoder_names().contains(&name.unwrap()));
    }

    #[test]
    fn test_provider_rejects_unknown_names_and_formats() {
        let provider = SymphoniaCodecProvider::new();
        assert!(provider
            .find_decoder_for_format(&TrackFormat::new("video/avc"))
            .is_none());
        assert!(matches!(
            provider.create_by_codec_name("hardware.h264"),
            Err(BridgeError::NotAvailable(_))
        ));
    }

    #[tokio::test]
    async fn test_calls_before_start_fail() {
        let provider = SymphoniaCodecProvider::new();
        let name = provider.find_decoder_for_format(&pcm_format()).unwrap();
        let mut codec = provider.create_by_codec_name(&name).unwrap();

        assert!(codec
            .dequeue_input_buffer(Duration::from_millis(1))
            .await
            .is_err());
        codec.configure(&pcm_format()).unwrap();
        assert!(codec.configure(&pcm_format()).is_err());
        codec.start().unwrap();
        assert!(codec
            .dequeue_input_buffer(Duration::from_millis(1))
            .await
            .unwrap()
            .is_some());
        codec.stop().unwrap();
        codec.release();
        codec.release();
    }

    #[tokio::test]
    async fn test_slot_ownership_is_enforced() {
        let provider = SymphoniaCodecProvider::new().with_slots(1, 1);
        let name = provider.find_decoder_for_format(&pcm_format()).unwrap();
        let mut codec = provider.create_by_codec_name(&name).unwrap();
        codec.configure(&pcm_format()).unwrap();
        codec.start().unwrap();

        assert!(codec.input_buffer(0).is_none());
        let index = codec
            .dequeue_input_buffer(Duration::ZERO)
            .await
            .unwrap()
            .unwrap();
        assert!(codec.dequeue_input_buffer(Duration::ZERO).await.unwrap().is_none());
        assert!(codec.input_buffer(index).is_some());
        assert!(codec.output_buffer(0).is_none());
        assert!(codec.release_output_buffer(0).is_err());
    }
}
