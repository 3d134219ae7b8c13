//! Drives the symphonia bridges through the full buffer-exchange protocol
//! on an in-memory WAV file.

use bridge_desktop::{SymphoniaCodecProvider, SymphoniaExtractorFactory};
use bridge_traits::codec::{BufferFlags, CodecProvider, OutputEvent};
use bridge_traits::media::{keys, mime, ExtractorFactory, MediaLocator};
use std::time::Duration;

const RATE: u32 = 8_000;

fn wav_bytes(channels: u16, samples: &[i16]) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let block_align = channels * 2;
    let mut out = Vec::with_capacity(44 + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(data_len + 36).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&RATE.to_le_bytes());
    out.extend_from_slice(&(RATE * block_align as u32).to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}

fn ramp(len: usize) -> Vec<i16> {
    (0..len).map(|i| ((i * 37) % 65_536) as i16).collect()
}

#[tokio::test]
async fn test_wav_track_is_reported_as_raw_audio() {
    let locator = MediaLocator::memory(wav_bytes(2, &ramp(2_000)), Some("wav"));
    let extractor = SymphoniaExtractorFactory::new().open(&locator).await.unwrap();

    assert_eq!(extractor.track_count(), 1);
    let format = extractor.track_format(0).unwrap();
    assert_eq!(format.mime, mime::AUDIO_RAW);
    assert_eq!(format.sample_rate, Some(RATE));
    assert_eq!(format.channel_count, Some(2));
    assert_eq!(format.extra.get(keys::PCM_ENCODING).map(String::as_str), Some("s16le"));
    assert_eq!(format.duration_us, Some(125_000));
    assert!(extractor.track_format(1).is_err());
}

#[tokio::test]
async fn test_full_exchange_reproduces_pcm() {
    let samples = ramp(9_000);
    let locator = MediaLocator::memory(wav_bytes(1, &samples), Some("wav"));
    let mut extractor = SymphoniaExtractorFactory::new().open(&locator).await.unwrap();
    let format = extractor.track_format(0).unwrap();
    extractor.select_track(0).unwrap();

    let provider = SymphoniaCodecProvider::new().with_slots(2, 2);
    let name = provider.find_decoder_for_format(&format).unwrap();
    let mut codec = provider.create_by_codec_name(&name).unwrap();
    codec.configure(&format).unwrap();
    codec.start().unwrap();

    let timeout = Duration::from_millis(10);
    let mut input_done = false;
    let mut eos_submissions = 0;
    let mut format_changes = 0;
    let mut pcm = Vec::new();
    let mut scratch = Vec::new();
    let mut last_pts = -1;

    'outer: for _ in 0..100_000 {
        if !input_done {
            if let Some(index) = codec.dequeue_input_buffer(timeout).await.unwrap() {
                match extractor.read_sample_data(&mut scratch).unwrap() {
                    Some(size) => {
                        let pts = extractor.sample_time().unwrap();
                        assert!(pts > last_pts);
                        last_pts = pts;
                        let slot = codec.input_buffer(index).unwrap();
                        slot.clear();
                        slot.extend_from_slice(&scratch);
                        codec
                            .queue_input_buffer(index, size, pts, BufferFlags::NONE)
                            .unwrap();
                        extractor.advance().unwrap();
                    }
                    None => {
                        codec
                            .queue_input_buffer(index, 0, 0, BufferFlags::END_OF_STREAM)
                            .unwrap();
                        eos_submissions += 1;
                        input_done = true;
                    }
                }
            }
        }

        loop {
            match codec.dequeue_output_buffer(timeout).await.unwrap() {
                OutputEvent::TryAgainLater => break,
                OutputEvent::FormatChanged => format_changes += 1,
                OutputEvent::Buffer { index, info } => {
                    let data = codec.output_buffer(index).unwrap();
                    pcm.extend_from_slice(&data[info.offset..info.offset + info.size]);
                    codec.release_output_buffer(index).unwrap();
                    if info.is_end_of_stream() {
                        break 'outer;
                    }
                }
            }
        }
    }

    codec.stop().unwrap();
    codec.release();
    extractor.release();

    assert_eq!(eos_submissions, 1);
    assert_eq!(format_changes, 1);
    let decoded: Vec<i16> = pcm
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect();
    assert_eq!(decoded, samples);
    assert!(codec.output_buffer(0).is_none());
}
