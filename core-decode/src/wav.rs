//! # WAV Container Writer
//!
//! Wraps raw interleaved PCM in a canonical 44-byte RIFF/WAVE header.
//!
//! ```text
//! offset  size  field
//!      0     4  "RIFF"
//!      4     4  RIFF chunk size  = data size + 36
//!      8     4  "WAVE"
//!     12     4  "fmt "
//!     16     4  fmt chunk size   = 16
//!     20     2  format code      = 1 (PCM)
//!     22     2  channels
//!     24     4  sample rate
//!     28     4  byte rate        = rate * channels * bits / 8
//!     32     2  block align      = channels * bits / 8
//!     34     2  bits per sample
//!     36     4  "data"
//!     40     4  data size
//! ```
//!
//! The two size fields are written as zero, the PCM is streamed after the
//! header, and then both fields are patched in place. The output therefore
//! has to be seekable.

use std::io::{self, Read, Seek, SeekFrom, Write};
use tracing::debug;

use crate::track::TrackDescriptor;

pub const WAV_HEADER_LEN: usize = 44;

const RIFF_SIZE_OFFSET: u64 = 4;
const DATA_SIZE_OFFSET: u64 = 40;
const COPY_CHUNK_BYTES: usize = 4096;
const PCM_FORMAT: u16 = 1;
/// Header bytes counted by the RIFF chunk size (everything after offset 8).
const RIFF_OVERHEAD: u32 = 36;

/// Sample layout of the PCM payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavSpec {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
}

impl WavSpec {
    /// Bytes per second, or `None` when it does not fit the 32-bit field.
    pub fn checked_byte_rate(&self) -> Option<u32> {
        self.sample_rate
            .checked_mul(u32::from(self.checked_block_align()?))
    }

    /// Bytes per frame, or `None` when it does not fit the 16-bit field.
    pub fn checked_block_align(&self) -> Option<u16> {
        self.channels.checked_mul(self.bits_per_sample / 8)
    }

    pub fn byte_rate(&self) -> u32 {
        self.checked_byte_rate().unwrap_or(u32::MAX)
    }

    pub fn block_align(&self) -> u16 {
        self.checked_block_align().unwrap_or(u16::MAX)
    }
}

impl From<&TrackDescriptor> for WavSpec {
    fn from(track: &TrackDescriptor) -> Self {
        Self {
            channels: track.channel_count,
            sample_rate: track.sample_rate,
            bits_per_sample: track.bit_depth,
        }
    }
}

/// A parsed or to-be-written canonical WAV header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    pub spec: WavSpec,
    pub riff_chunk_size: u32,
    pub data_chunk_size: u32,
}

impl WavHeader {
    /// Header for a payload of `data_len` bytes.
    pub fn new(spec: WavSpec, data_len: u32) -> Self {
        Self {
            spec,
            riff_chunk_size: data_len.saturating_add(RIFF_OVERHEAD),
            data_chunk_size: data_len,
        }
    }

    /// Header with both size fields left at zero, as written before the
    /// payload length is known.
    pub fn placeholder(spec: WavSpec) -> Self {
        Self {
            spec,
            riff_chunk_size: 0,
            data_chunk_size: 0,
        }
    }

    pub fn to_bytes(&self) -> [u8; WAV_HEADER_LEN] {
        let mut out = [0u8; WAV_HEADER_LEN];
        out[0..4].copy_from_slice(b"RIFF");
        out[4..8].copy_from_slice(&self.riff_chunk_size.to_le_bytes());
        out[8..12].copy_from_slice(b"WAVE");
        out[12..16].copy_from_slice(b"fmt ");
        out[16..20].copy_from_slice(&16u32.to_le_bytes());
        out[20..22].copy_from_slice(&PCM_FORMAT.to_le_bytes());
        out[22..24].copy_from_slice(&self.spec.channels.to_le_bytes());
        out[24..28].copy_from_slice(&self.spec.sample_rate.to_le_bytes());
        out[28..32].copy_from_slice(&self.spec.byte_rate().to_le_bytes());
        out[32..34].copy_from_slice(&self.spec.block_align().to_le_bytes());
        out[34..36].copy_from_slice(&self.spec.bits_per_sample.to_le_bytes());
        out[36..40].copy_from_slice(b"data");
        out[40..44].copy_from_slice(&self.data_chunk_size.to_le_bytes());
        out
    }

    /// Parses a canonical 44-byte PCM header.
    pub fn parse(bytes: &[u8]) -> io::Result<Self> {
        if bytes.len() < WAV_HEADER_LEN {
            return Err(invalid("header shorter than 44 bytes"));
        }
        if &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
            return Err(invalid("missing RIFF/WAVE magic"));
        }
        if &bytes[12..16] != b"fmt " || &bytes[36..40] != b"data" {
            return Err(invalid("not a canonical PCM header"));
        }
        if u16_at(bytes, 20) != PCM_FORMAT {
            return Err(invalid("format code is not PCM"));
        }

        Ok(Self {
            spec: WavSpec {
                channels: u16_at(bytes, 22),
                sample_rate: u32_at(bytes, 24),
                bits_per_sample: u16_at(bytes, 34),
            },
            riff_chunk_size: u32_at(bytes, 4),
            data_chunk_size: u32_at(bytes, 40),
        })
    }
}

/// Writes a WAV container holding everything `pcm` yields.
///
/// The header starts at the writer's current position; on success the writer
/// is left positioned after the last PCM byte. Returns the payload length.
///
/// # Errors
///
/// Any I/O failure from either side, or `InvalidInput` when the byte rate or
/// block align of `spec` overflows its header field. `InvalidData` when the
/// payload does not fit the 32-bit size fields.
pub fn write_wav<W, R>(out: &mut W, spec: &WavSpec, pcm: &mut R) -> io::Result<u64>
where
    W: Write + Seek + ?Sized,
    R: Read + ?Sized,
{
    if spec.checked_byte_rate().is_none() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "{} channels at {} Hz overflow the WAV format chunk",
                spec.channels, spec.sample_rate
            ),
        ));
    }

    let start = out.stream_position()?;
    out.write_all(&WavHeader::placeholder(*spec).to_bytes())?;

    let limit = (u32::MAX - RIFF_OVERHEAD) as u64;
    let mut total: u64 = 0;
    let mut chunk = [0u8; COPY_CHUNK_BYTES];
    loop {
        let read = match pcm.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        total += read as u64;
        if total > limit {
            return Err(invalid("PCM payload exceeds the WAV size limit"));
        }
        out.write_all(&chunk[..read])?;
    }

    let data_len = total as u32;
    out.seek(SeekFrom::Start(start + RIFF_SIZE_OFFSET))?;
    out.write_all(&(data_len + RIFF_OVERHEAD).to_le_bytes())?;
    out.seek(SeekFrom::Start(start + DATA_SIZE_OFFSET))?;
    out.write_all(&data_len.to_le_bytes())?;
    out.seek(SeekFrom::Start(start + WAV_HEADER_LEN as u64 + total))?;
    out.flush()?;

    debug!(
        data_bytes = total,
        channels = spec.channels,
        sample_rate = spec.sample_rate,
        "Wrote WAV container"
    );
    Ok(total)
}

fn invalid(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.to_string())
}

fn u16_at(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn u32_at(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const CD: WavSpec = WavSpec {
        channels: 2,
        sample_rate: 44_100,
        bits_per_sample: 16,
    };

    #[test]
    fn test_fmt_fields() {
        let bytes = WavHeader::new(CD, 8).to_bytes();
        assert_eq!(u32_at(&bytes, 16), 16);
        assert_eq!(u16_at(&bytes, 20), 1);
        assert_eq!(u16_at(&bytes, 22), 2);
        assert_eq!(u32_at(&bytes, 24), 44_100);
        assert_eq!(u32_at(&bytes, 28), 176_400);
        assert_eq!(u16_at(&bytes, 32), 4);
        assert_eq!(u16_at(&bytes, 34), 16);
    }

    #[test]
    fn test_placeholder_sizes_are_zero() {
        let bytes = WavHeader::placeholder(CD).to_bytes();
        assert_eq!(u32_at(&bytes, 4), 0);
        assert_eq!(u32_at(&bytes, 40), 0);
    }

    #[test]
    fn test_parse_rejects_foreign_data() {
        assert!(WavHeader::parse(b"RIFF").is_err());
        let mut bytes = WavHeader::new(CD, 0).to_bytes();
        bytes[8..12].copy_from_slice(b"AVI ");
        assert!(WavHeader::parse(&bytes).is_err());
    }

    #[test]
    fn test_writer_left_at_end() {
        let mut out = Cursor::new(Vec::new());
        let written = write_wav(&mut out, &CD, &mut &[1u8, 2, 3, 4][..]).unwrap();
        assert_eq!(written, 4);
        assert_eq!(out.position(), 48);
    }

    #[test]
    fn test_oversized_layout_is_rejected() {
        let wide = WavSpec {
            channels: 40_000,
            ..CD
        };
        let fast = WavSpec {
            channels: 8,
            sample_rate: 600_000_000,
            ..CD
        };

        for spec in [wide, fast] {
            assert_eq!(spec.checked_byte_rate(), None);
            let mut out = Cursor::new(Vec::new());
            let err = write_wav(&mut out, &spec, &mut &[0u8; 4][..]).unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
            assert!(out.into_inner().is_empty());
        }
    }

    #[test]
    fn test_header_written_at_current_position() {
        let mut out = Cursor::new(Vec::new());
        out.write_all(b"prefix").unwrap();
        write_wav(&mut out, &CD, &mut &[0u8; 10][..]).unwrap();

        let bytes = out.into_inner();
        assert_eq!(&bytes[..6], b"prefix");
        let header = WavHeader::parse(&bytes[6..]).unwrap();
        assert_eq!(header.data_chunk_size, 10);
        assert_eq!(header.riff_chunk_size, 46);
    }
}
