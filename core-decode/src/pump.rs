//! # Extraction Pump
//!
//! Feeds compressed samples from the source into free decoder input slots.

use bridge_traits::media::MediaExtractor;
use tracing::{debug, trace};

use crate::error::{DecodeError, Result};
use crate::session::DecoderSession;

/// Outcome of one pump step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpStatus {
    /// More input may follow.
    Continuing,
    /// End of stream has been submitted; the pump has nothing left to do.
    InputExhausted,
}

/// Moves at most one sample per step from the source to the decoder.
///
/// Once the source runs dry the pump submits the end-of-stream marker and
/// never touches the source or the input side again.
#[derive(Debug, Default)]
pub struct ExtractionPump {
    exhausted: bool,
    samples_submitted: u64,
    bytes_submitted: u64,
    last_presentation_time_us: Option<i64>,
}

impl ExtractionPump {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests one input slot and fills it.
    ///
    /// - no slot free within the poll timeout: nothing happens
    /// - the source has a sample: it is copied, submitted with its
    ///   presentation time, and the source advances
    /// - the source is exhausted or reports an empty sample: the slot goes
    ///   back as end of stream
    pub async fn step(
        &mut self,
        source: &mut dyn MediaExtractor,
        session: &mut DecoderSession,
    ) -> Result<PumpStatus> {
        if self.exhausted {
            return Ok(PumpStatus::InputExhausted);
        }

        let Some(index) = session.dequeue_input_slot().await? else {
            trace!("No input slot free");
            return Ok(PumpStatus::Continuing);
        };

        let slot = session.input_buffer(index)?;
        let read = source.read_sample_data(slot).map_err(DecodeError::Source)?;

        match read {
            Some(size) if size > 0 => {
                let presentation_time_us = source
                    .sample_time()
                    .or(self.last_presentation_time_us)
                    .unwrap_or(0);

                session.submit_sample(index, size, presentation_time_us)?;
                self.samples_submitted += 1;
                self.bytes_submitted += size as u64;
                self.last_presentation_time_us = Some(presentation_time_us);
                trace!(index, size, presentation_time_us, "Submitted sample");

                source.advance().map_err(DecodeError::Source)?;
                Ok(PumpStatus::Continuing)
            }
            Some(_) | None => {
                session.submit_end_of_stream(index)?;
                self.exhausted = true;
                debug!(
                    samples = self.samples_submitted,
                    bytes = self.bytes_submitted,
                    "Source exhausted"
                );
                Ok(PumpStatus::InputExhausted)
            }
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Real samples submitted so far, not counting the end-of-stream marker.
    pub fn samples_submitted(&self) -> u64 {
        self.samples_submitted
    }

    pub fn bytes_submitted(&self) -> u64 {
        self.bytes_submitted
    }

    pub fn last_presentation_time_us(&self) -> Option<i64> {
        self.last_presentation_time_us
    }
}
