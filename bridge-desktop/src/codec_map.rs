//! # Codec Mapping
//!
//! Translates between symphonia's codec parameters and the platform-neutral
//! [`TrackFormat`] carried across the bridge.

use bridge_traits::error::{BridgeError, Result};
use bridge_traits::media::{keys, mime, TrackFormat};
use bytes::Bytes;
use symphonia::core::audio::Channels;
use symphonia::core::codecs::*;
use symphonia::core::formats::Track;
use tracing::{debug, warn};

/// Raw PCM codecs and the `pcm-encoding` value that identifies each.
const PCM_ENCODINGS: &[(CodecType, &str)] = &[
    (CODEC_TYPE_PCM_U8, "u8"),
    (CODEC_TYPE_PCM_S8, "s8"),
    (CODEC_TYPE_PCM_S16LE, "s16le"),
    (CODEC_TYPE_PCM_S16BE, "s16be"),
    (CODEC_TYPE_PCM_S24LE, "s24le"),
    (CODEC_TYPE_PCM_S24BE, "s24be"),
    (CODEC_TYPE_PCM_S32LE, "s32le"),
    (CODEC_TYPE_PCM_S32BE, "s32be"),
    (CODEC_TYPE_PCM_F32LE, "f32le"),
    (CODEC_TYPE_PCM_F32BE, "f32be"),
    (CODEC_TYPE_PCM_F64LE, "f64le"),
    (CODEC_TYPE_PCM_F64BE, "f64be"),
];

/// Compressed codecs with a dedicated MIME type.
const COMPRESSED: &[(CodecType, &str)] = &[
    (CODEC_TYPE_MP3, mime::AUDIO_MPEG),
    (CODEC_TYPE_MP2, "audio/mpeg-l2"),
    (CODEC_TYPE_MP1, "audio/mpeg-l1"),
    (CODEC_TYPE_AAC, mime::AUDIO_AAC),
    (CODEC_TYPE_FLAC, mime::AUDIO_FLAC),
    (CODEC_TYPE_VORBIS, mime::AUDIO_VORBIS),
    (CODEC_TYPE_OPUS, mime::AUDIO_OPUS),
    (CODEC_TYPE_ALAC, mime::AUDIO_ALAC),
    (CODEC_TYPE_PCM_ALAW, "audio/g711-alaw"),
    (CODEC_TYPE_PCM_MULAW, "audio/g711-mlaw"),
];

/// Every codec type this bridge knows how to name.
pub fn known_codecs() -> impl Iterator<Item = CodecType> {
    COMPRESSED
        .iter()
        .chain(PCM_ENCODINGS.iter())
        .map(|(codec, _)| *codec)
}

/// MIME type for a symphonia codec.
///
/// Tracks without a codec (cover art, attachments) map to a non-audio type so
/// track selection skips them.
pub fn mime_for_codec(codec: CodecType) -> &'static str {
    if codec == CODEC_TYPE_NULL {
        return mime::APPLICATION_OCTET_STREAM;
    }
    if pcm_encoding_for_codec(codec).is_some() {
        return mime::AUDIO_RAW;
    }
    match COMPRESSED.iter().find(|(c, _)| *c == codec).map(|(_, m)| *m) {
        Some(m) => m,
        None => {
            warn!("Unknown codec type: {:?}", codec);
            mime::AUDIO_UNKNOWN
        }
    }
}

fn pcm_encoding_for_codec(codec: CodecType) -> Option<&'static str> {
    PCM_ENCODINGS
        .iter()
        .find(|(c, _)| *c == codec)
        .map(|(_, encoding)| *encoding)
}

/// Symphonia codec for a track format, if the MIME type is recognised.
///
/// `audio/raw` needs a `pcm-encoding` entry; it defaults to `s16le`.
pub fn codec_for_format(format: &TrackFormat) -> Option<CodecType> {
    if format.mime == mime::AUDIO_RAW {
        let encoding = format
            .extra
            .get(keys::PCM_ENCODING)
            .map(String::as_str)
            .unwrap_or("s16le");
        return PCM_ENCODINGS
            .iter()
            .find(|(_, e)| *e == encoding)
            .map(|(codec, _)| *codec);
    }
    COMPRESSED
        .iter()
        .find(|(_, m)| *m == format.mime)
        .map(|(codec, _)| *codec)
}

/// Builds the bridge-level format of a demuxed track.
pub fn track_format(track: &Track) -> TrackFormat {
    let params = &track.codec_params;
    let mut format = TrackFormat::new(mime_for_codec(params.codec));

    format.sample_rate = params.sample_rate;
    format.channel_count = params
        .channels
        .map(|c| c.count() as u16)
        .or_else(|| params.channel_layout.map(|l| l.into_channels().count() as u16));
    format.bits_per_sample = params.bits_per_sample;
    format.max_frames_per_packet = params.max_frames_per_packet;
    format.codec_specific_data = params.extra_data.as_ref().map(|d| Bytes::copy_from_slice(d));
    format.duration_us = match (params.n_frames, params.sample_rate) {
        (Some(frames), Some(rate)) if rate > 0 => {
            Some((frames as u128 * 1_000_000 / rate as u128) as i64)
        }
        _ => None,
    };

    if let Some(encoding) = pcm_encoding_for_codec(params.codec) {
        format = format.with_extra(keys::PCM_ENCODING, encoding);
    }
    if let Some(channels) = params.channels {
        format = format.with_extra(keys::CHANNEL_MASK, channels.bits().to_string());
    }
    if let Some(bits) = params.bits_per_coded_sample {
        format = format.with_extra(keys::BITS_PER_CODED_SAMPLE, bits.to_string());
    }
    if let Some(delay) = params.delay {
        format = format.with_extra(keys::ENCODER_DELAY, delay.to_string());
    }
    if let Some(padding) = params.padding {
        format = format.with_extra(keys::ENCODER_PADDING, padding.to_string());
    }
    if let Some(language) = &track.language {
        format = format.with_extra(keys::LANGUAGE, language.clone());
    }

    debug!(track_id = track.id, mime = %format.mime, "Mapped track format");
    format
}

/// Channel set for a format: the explicit mask when present, otherwise the
/// first `channel_count` standard positions.
pub fn channels_for_format(format: &TrackFormat) -> Option<Channels> {
    if let Some(mask) = format.extra_u64(keys::CHANNEL_MASK) {
        let channels = Channels::from_bits_truncate(mask as u32);
        if !channels.is_empty() {
            return Some(channels);
        }
    }
    match format.channel_count {
        Some(count) if (1..=32).contains(&count) => {
            let bits = if count == 32 {
                u32::MAX
            } else {
                (1u32 << count) - 1
            };
            Some(Channels::from_bits_truncate(bits))
        }
        _ => None,
    }
}

/// Rebuilds decoder parameters from a bridge-level format.
pub fn codec_parameters(format: &TrackFormat) -> Result<CodecParameters> {
    let codec = codec_for_format(format)
        .ok_or_else(|| BridgeError::Unsupported(format!("no codec for {}", format.mime)))?;

    let mut params = CodecParameters::new();
    params.for_codec(codec);

    if let Some(rate) = format.sample_rate {
        params.with_sample_rate(rate);
    }
    if let Some(channels) = channels_for_format(format) {
        params.with_channels(channels);
    }
    if let Some(bits) = format.bits_per_sample {
        params.with_bits_per_sample(bits);
    }
    if let Some(bits) = format.extra_u64(keys::BITS_PER_CODED_SAMPLE) {
        params.with_bits_per_coded_sample(bits as u32);
    }
    if let Some(frames) = format.max_frames_per_packet {
        params.with_max_frames_per_packet(frames);
    }
    if let Some(delay) = format.extra_u64(keys::ENCODER_DELAY) {
        params.with_delay(delay as u32);
    }
    if let Some(padding) = format.extra_u64(keys::ENCODER_PADDING) {
        params.with_padding(padding as u32);
    }
    if let Some(data) = &format.codec_specific_data {
        params.with_extra_data(data.to_vec().into_boxed_slice());
    }

    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_for_codec() {
        assert_eq!(mime_for_codec(CODEC_TYPE_MP3), "audio/mpeg");
        assert_eq!(mime_for_codec(CODEC_TYPE_FLAC), "audio/flac");
        assert_eq!(mime_for_codec(CODEC_TYPE_PCM_S16LE), "audio/raw");
        assert_eq!(mime_for_codec(CODEC_TYPE_NULL), "application/octet-stream");
    }

    #[test]
    fn test_pcm_roundtrips_through_encoding_key() {
        let format = TrackFormat::new(mime::AUDIO_RAW).with_extra(keys::PCM_ENCODING, "s24be");
        assert_eq!(codec_for_format(&format), Some(CODEC_TYPE_PCM_S24BE));

        let bare = TrackFormat::new(mime::AUDIO_RAW);
        assert_eq!(codec_for_format(&bare), Some(CODEC_TYPE_PCM_S16LE));
    }

    #[test]
    fn test_unknown_mime_has_no_codec() {
        assert_eq!(codec_for_format(&TrackFormat::new("video/avc")), None);
        assert_eq!(codec_for_format(&TrackFormat::new(mime::AUDIO_UNKNOWN)), None);
        assert!(codec_parameters(&TrackFormat::new("video/avc")).is_err());
    }

    #[test]
    fn test_channels_from_count_and_mask() {
        let stereo = TrackFormat::audio(mime::AUDIO_MPEG, 44_100, 2);
        assert_eq!(channels_for_format(&stereo).map(|c| c.count()), Some(2));

        let masked = TrackFormat::audio(mime::AUDIO_MPEG, 44_100, 2)
            .with_extra(keys::CHANNEL_MASK, Channels::FRONT_CENTRE.bits().to_string());
        assert_eq!(channels_for_format(&masked), Some(Channels::FRONT_CENTRE));

        assert_eq!(channels_for_format(&TrackFormat::new(mime::AUDIO_MPEG)), None);
    }

    #[test]
    fn test_codec_parameters_carry_pcm_layout() {
        let mut format = TrackFormat::audio(mime::AUDIO_RAW, 48_000, 2)
            .with_bits_per_sample(16)
            .with_extra(keys::PCM_ENCODING, "s16le");
        format.max_frames_per_packet = Some(1152);

        let params = codec_parameters(&format).unwrap();
        assert_eq!(params.codec, CODEC_TYPE_PCM_S16LE);
        assert_eq!(params.sample_rate, Some(48_000));
        assert_eq!(params.channels.map(|c| c.count()), Some(2));
        assert_eq!(params.bits_per_sample, Some(16));
        assert_eq!(params.max_frames_per_packet, Some(1152));
    }
}
