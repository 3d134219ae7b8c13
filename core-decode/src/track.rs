//! # Track Selection
//!
//! Picks the audio track a conversion decodes.

use bridge_traits::media::{MediaExtractor, TrackFormat};
use tracing::debug;

use crate::error::{DecodeError, Result};
use crate::wav::WavSpec;

/// Bit depth of every PCM sample the engine produces.
pub const OUTPUT_BIT_DEPTH: u16 = 16;

/// The audio track chosen for decoding, with the properties the WAV header
/// needs already resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackDescriptor {
    /// Position of the track in the container.
    pub index: usize,
    pub mime_type: String,
    pub channel_count: u16,
    pub sample_rate: u32,
    /// Always [`OUTPUT_BIT_DEPTH`]; the decoder is asked for s16 output.
    pub bit_depth: u16,
    pub duration_us: Option<i64>,
    /// Full container format, handed to the decoder at configure time.
    pub format: TrackFormat,
}

impl TrackDescriptor {
    fn from_format(index: usize, format: TrackFormat) -> Result<Self> {
        let sample_rate = format
            .sample_rate
            .filter(|rate| *rate > 0)
            .ok_or_else(|| {
                DecodeError::InvalidTrackFormat(format!(
                    "track {} ({}) has no sample rate",
                    index, format.mime
                ))
            })?;
        let channel_count = format
            .channel_count
            .filter(|count| *count > 0)
            .ok_or_else(|| {
                DecodeError::InvalidTrackFormat(format!(
                    "track {} ({}) has no channel count",
                    index, format.mime
                ))
            })?;

        let layout = WavSpec {
            channels: channel_count,
            sample_rate,
            bits_per_sample: OUTPUT_BIT_DEPTH,
        };
        if layout.checked_byte_rate().is_none() {
            return Err(DecodeError::InvalidTrackFormat(format!(
                "track {} ({}) declares {} channels at {} Hz",
                index, format.mime, channel_count, sample_rate
            )));
        }

        Ok(Self {
            index,
            mime_type: format.mime.clone(),
            channel_count,
            sample_rate,
            bit_depth: OUTPUT_BIT_DEPTH,
            duration_us: format.duration_us.filter(|d| *d > 0),
            format,
        })
    }

    /// Bytes per second of the decoded PCM stream.
    pub fn byte_rate(&self) -> u64 {
        self.sample_rate as u64 * self.channel_count as u64 * (self.bit_depth as u64 / 8)
    }
}

/// Returns the first track whose MIME type starts with `audio/`.
///
/// Non-audio tracks before it (video, subtitles, cover art) are skipped.
/// Fails with [`DecodeError::NoAudioTrack`] when there is none, and with
/// [`DecodeError::InvalidTrackFormat`] when the chosen track does not declare
/// a sample rate and channel count.
pub fn select_audio_track(source: &dyn MediaExtractor) -> Result<TrackDescriptor> {
    for index in 0..source.track_count() {
        let format = source.track_format(index).map_err(DecodeError::Source)?;
        if !format.is_audio() {
            debug!(index, mime = %format.mime, "Skipping non-audio track");
            continue;
        }

        let descriptor = TrackDescriptor::from_format(index, format)?;
        debug!(
            index,
            mime = %descriptor.mime_type,
            sample_rate = descriptor.sample_rate,
            channels = descriptor.channel_count,
            "Selected audio track"
        );
        return Ok(descriptor);
    }

    Err(DecodeError::NoAudioTrack)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::media::mime;

    struct Tracks(Vec<TrackFormat>);

    impl MediaExtractor for Tracks {
        fn track_count(&self) -> usize {
            self.0.len()
        }

        fn track_format(&self, index: usize) -> BridgeResult<TrackFormat> {
            self.0
                .get(index)
                .cloned()
                .ok_or_else(|| BridgeError::InvalidArgument(index.to_string()))
        }

        fn select_track(&mut self, _index: usize) -> BridgeResult<()> {
            Ok(())
        }

        fn read_sample_data(&mut self, _buf: &mut Vec<u8>) -> BridgeResult<Option<usize>> {
            Ok(None)
        }

        fn sample_time(&self) -> Option<i64> {
            None
        }

        fn advance(&mut self) -> BridgeResult<bool> {
            Ok(false)
        }

        fn release(&mut self) {}
    }

    #[test]
    fn test_skips_leading_video_track() {
        let source = Tracks(vec![
            TrackFormat::new(mime::VIDEO_AVC),
            TrackFormat::new(mime::TEXT_VTT),
            TrackFormat::audio(mime::AUDIO_AAC, 48_000, 2).with_duration_us(5_000_000),
            TrackFormat::audio(mime::AUDIO_MPEG, 44_100, 1),
        ]);

        let track = select_audio_track(&source).unwrap();
        assert_eq!(track.index, 2);
        assert_eq!(track.mime_type, mime::AUDIO_AAC);
        assert_eq!(track.sample_rate, 48_000);
        assert_eq!(track.channel_count, 2);
        assert_eq!(track.bit_depth, 16);
        assert_eq!(track.duration_us, Some(5_000_000));
        assert_eq!(track.byte_rate(), 192_000);
    }

    #[test]
    fn test_no_audio_track() {
        let source = Tracks(vec![TrackFormat::new(mime::VIDEO_AVC)]);
        assert!(matches!(
            select_audio_track(&source),
            Err(DecodeError::NoAudioTrack)
        ));

        let empty = Tracks(Vec::new());
        assert!(matches!(
            select_audio_track(&empty),
            Err(DecodeError::NoAudioTrack)
        ));
    }

    #[test]
    fn test_audio_track_without_rate_is_invalid() {
        let mut format = TrackFormat::new(mime::AUDIO_FLAC);
        format.channel_count = Some(2);
        let source = Tracks(vec![format]);

        assert!(matches!(
            select_audio_track(&source),
            Err(DecodeError::InvalidTrackFormat(_))
        ));
    }

    #[test]
    fn test_layout_overflowing_wav_fields_is_invalid() {
        for (rate, channels) in [(44_100, 40_000), (600_000_000, 8)] {
            let source = Tracks(vec![TrackFormat::audio(mime::AUDIO_AAC, rate, channels)]);
            match select_audio_track(&source) {
                Err(DecodeError::InvalidTrackFormat(message)) => {
                    assert!(message.contains(&channels.to_string()), "{}", message)
                }
                other => panic!("unexpected result: {:?}", other),
            }
        }

        let widest = Tracks(vec![TrackFormat::audio(mime::AUDIO_AAC, 48_000, 255)]);
        assert_eq!(select_audio_track(&widest).unwrap().channel_count, 255);
    }

    #[test]
    fn test_zero_duration_is_unknown() {
        let source = Tracks(vec![
            TrackFormat::audio(mime::AUDIO_OPUS, 48_000, 2).with_duration_us(0),
        ]);
        assert_eq!(select_audio_track(&source).unwrap().duration_us, None);
    }
}
