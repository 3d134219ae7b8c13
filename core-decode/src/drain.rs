//! # PCM Drain
//!
//! Pulls decoded output out of the decoder and into a [`PcmSink`].

use bridge_traits::codec::OutputEvent;
use tracing::{debug, trace};

use crate::error::Result;
use crate::session::DecoderSession;
use crate::sink::PcmSink;

/// Outcome of one drain step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainStatus {
    /// More output may follow. `progressed` is false when the decoder had
    /// nothing ready within the poll timeout.
    Continuing { progressed: bool },
    /// The decoder echoed end of stream; no output follows.
    OutputExhausted,
}

/// Copies each decoded buffer's valid region to the sink, in order, and
/// returns every slot it is handed.
#[derive(Debug, Default)]
pub struct PcmDrain {
    bytes_drained: u64,
    buffers_released: u64,
    format_changes: u32,
    last_presentation_time_us: Option<i64>,
}

impl PcmDrain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Polls the decoder once.
    ///
    /// A format change is logged and counted; the bytes that follow it are
    /// appended unchanged.
    pub async fn step(
        &mut self,
        session: &mut DecoderSession,
        sink: &mut dyn PcmSink,
    ) -> Result<DrainStatus> {
        match session.dequeue_output().await? {
            OutputEvent::TryAgainLater => Ok(DrainStatus::Continuing { progressed: false }),
            OutputEvent::FormatChanged => {
                self.format_changes += 1;
                let format = session.output_format();
                debug!(
                    sample_rate = ?format.as_ref().and_then(|f| f.sample_rate),
                    channels = ?format.as_ref().and_then(|f| f.channel_count),
                    "Decoder output format changed"
                );
                Ok(DrainStatus::Continuing { progressed: true })
            }
            OutputEvent::Buffer { index, info } => {
                let data = session.output_data(index, &info)?;
                if !data.is_empty() {
                    sink.append(data)?;
                }
                self.bytes_drained += info.size as u64;
                if info.size > 0 {
                    self.last_presentation_time_us = Some(info.presentation_time_us);
                }

                let end_of_stream = info.is_end_of_stream();
                session.release_output(index, end_of_stream)?;
                self.buffers_released += 1;
                trace!(index, size = info.size, end_of_stream, "Drained output slot");

                if end_of_stream {
                    debug!(
                        bytes = self.bytes_drained,
                        buffers = self.buffers_released,
                        "Decoder output exhausted"
                    );
                    Ok(DrainStatus::OutputExhausted)
                } else {
                    Ok(DrainStatus::Continuing { progressed: true })
                }
            }
        }
    }

    pub fn bytes_drained(&self) -> u64 {
        self.bytes_drained
    }

    pub fn buffers_released(&self) -> u64 {
        self.buffers_released
    }

    pub fn format_changes(&self) -> u32 {
        self.format_changes
    }

    /// Presentation time of the most recent non-empty output buffer.
    pub fn last_presentation_time_us(&self) -> Option<i64> {
        self.last_presentation_time_us
    }
}
