//! # Sample Format Converter
//!
//! Flattens symphonia's planar decode output into interleaved signed 16-bit
//! little-endian PCM, the layout every output slot carries.

use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::conv::IntoSample;
use symphonia::core::sample::Sample;

/// Bytes per output sample.
pub const BYTES_PER_SAMPLE: usize = 2;

pub struct SampleConverter;

impl SampleConverter {
    /// Appends `buffer` to `out` as interleaved s16le (LRLR... for stereo).
    ///
    /// Returns the number of bytes appended.
    pub fn append_interleaved_s16le(buffer: &AudioBufferRef<'_>, out: &mut Vec<u8>) -> usize {
        match buffer {
            AudioBufferRef::U8(buf) => Self::interleave(&**buf, out),
            AudioBufferRef::U16(buf) => Self::interleave(&**buf, out),
            AudioBufferRef::U24(buf) => Self::interleave(&**buf, out),
            AudioBufferRef::U32(buf) => Self::interleave(&**buf, out),
            AudioBufferRef::S8(buf) => Self::interleave(&**buf, out),
            AudioBufferRef::S16(buf) => Self::interleave(&**buf, out),
            AudioBufferRef::S24(buf) => Self::interleave(&**buf, out),
            AudioBufferRef::S32(buf) => Self::interleave(&**buf, out),
            AudioBufferRef::F32(buf) => Self::interleave(&**buf, out),
            AudioBufferRef::F64(buf) => Self::interleave(&**buf, out),
        }
    }

    fn interleave<T>(buf: &AudioBuffer<T>, out: &mut Vec<u8>) -> usize
    where
        T: Sample + IntoSample<i16>,
    {
        let num_channels = buf.spec().channels.count();
        let num_frames = buf.frames();
        let len = num_frames * num_channels * BYTES_PER_SAMPLE;
        out.reserve(len);

        for frame_idx in 0..num_frames {
            for chan_idx in 0..num_channels {
                let sample: i16 = buf.chan(chan_idx)[frame_idx].into_sample();
                out.extend_from_slice(&sample.to_le_bytes());
            }
        }

        len
    }
}
