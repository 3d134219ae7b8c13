//! Decoder Buffer-Exchange Abstractions
//!
//! Decoders are driven through a slot-based, non-blocking protocol:
//!
//! 1. `dequeue_input_buffer` hands out a free input slot index (or none yet).
//! 2. The caller fills `input_buffer(index)` and submits it with
//!    `queue_input_buffer`, setting [`BufferFlags::END_OF_STREAM`] on the
//!    final, empty submission.
//! 3. `dequeue_output_buffer` reports decoded output as an [`OutputEvent`].
//! 4. The caller reads `output_buffer(index)` and hands the slot back with
//!    `release_output_buffer`.
//!
//! The decoder echoes the end-of-stream flag on its last output buffer.
//! Neither side ever blocks longer than the timeout given to a dequeue call.

use async_trait::async_trait;
use std::ops::BitOr;
use std::time::Duration;

use crate::error::Result;
use crate::media::TrackFormat;
use crate::platform::{PlatformSend, PlatformSendSync};

/// Flags attached to a submitted or decoded buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BufferFlags(u32);

impl BufferFlags {
    pub const NONE: BufferFlags = BufferFlags(0);
    pub const KEY_FRAME: BufferFlags = BufferFlags(1);
    pub const CODEC_CONFIG: BufferFlags = BufferFlags(2);
    pub const END_OF_STREAM: BufferFlags = BufferFlags(4);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits(bits: u32) -> Self {
        BufferFlags(bits)
    }

    pub const fn contains(self, other: BufferFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_end_of_stream(self) -> bool {
        self.contains(Self::END_OF_STREAM)
    }
}

impl BitOr for BufferFlags {
    type Output = BufferFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        BufferFlags(self.0 | rhs.0)
    }
}

/// Describes the valid region of an output slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferInfo {
    pub offset: usize,
    pub size: usize,
    pub presentation_time_us: i64,
    pub flags: BufferFlags,
}

impl BufferInfo {
    pub fn is_end_of_stream(&self) -> bool {
        self.flags.is_end_of_stream()
    }
}

/// Result of polling for decoded output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputEvent {
    /// Nothing is ready within the timeout.
    TryAgainLater,
    /// The output format changed; see [`MediaCodec::output_format`].
    FormatChanged,
    /// Output slot `index` holds decoded data described by `info`.
    Buffer { index: usize, info: BufferInfo },
}

/// A decoder instance speaking the buffer-exchange protocol.
///
/// Lifecycle: `configure` → `start` → exchange buffers → `stop` → `release`.
/// After `release` the instance must not be used again.
#[async_trait]
pub trait MediaCodec: PlatformSend {
    /// Decoder name as reported by its [`CodecProvider`].
    fn name(&self) -> &str;

    fn configure(&mut self, format: &TrackFormat) -> Result<()>;

    fn start(&mut self) -> Result<()>;

    /// Waits up to `timeout` for a free input slot.
    async fn dequeue_input_buffer(&mut self, timeout: Duration) -> Result<Option<usize>>;

    /// The writable input slot `index`, or `None` if the slot is not
    /// currently owned by the caller.
    fn input_buffer(&mut self, index: usize) -> Option<&mut Vec<u8>>;

    /// Submits the first `size` bytes of input slot `index`.
    fn queue_input_buffer(
        &mut self,
        index: usize,
        size: usize,
        presentation_time_us: i64,
        flags: BufferFlags,
    ) -> Result<()>;

    /// Waits up to `timeout` for decoded output.
    async fn dequeue_output_buffer(&mut self, timeout: Duration) -> Result<OutputEvent>;

    /// The readable output slot `index`, or `None` if the slot is not
    /// currently owned by the caller.
    fn output_buffer(&self, index: usize) -> Option<&[u8]>;

    /// Returns output slot `index` to the decoder.
    fn release_output_buffer(&mut self, index: usize) -> Result<()>;

    /// Current output format, once known.
    fn output_format(&self) -> Option<TrackFormat>;

    fn stop(&mut self) -> Result<()>;

    fn release(&mut self);
}

/// Looks up and instantiates decoders.
pub trait CodecProvider: PlatformSendSync {
    /// Name of a decoder able to handle `format`, if any.
    fn find_decoder_for_format(&self, format: &TrackFormat) -> Option<String>;

    fn create_by_codec_name(&self, name: &str) -> Result<Box<dyn MediaCodec>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_contains() {
        let flags = BufferFlags::KEY_FRAME | BufferFlags::END_OF_STREAM;
        assert!(flags.contains(BufferFlags::KEY_FRAME));
        assert!(flags.is_end_of_stream());
        assert!(!flags.contains(BufferFlags::CODEC_CONFIG));
        assert!(!BufferFlags::NONE.is_end_of_stream());
        assert_eq!(BufferFlags::from_bits(4), BufferFlags::END_OF_STREAM);
    }

    #[test]
    fn test_buffer_info_eos() {
        let info = BufferInfo {
            flags: BufferFlags::END_OF_STREAM,
            ..Default::default()
        };
        assert!(info.is_end_of_stream());
        assert_eq!(info.size, 0);
    }
}
