//! Media extraction using symphonia's format readers.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    media::{ExtractorFactory, MediaExtractor, MediaLocator, TrackFormat},
};
use std::io::Cursor;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::TimeBase;
use tracing::{debug, error, info, instrument, warn};

use crate::codec_map;

/// Opens files and in-memory buffers with symphonia's probe.
///
/// Probing reads from the source synchronously, so it runs on the blocking
/// pool.
#[derive(Debug, Clone, Default)]
pub struct SymphoniaExtractorFactory;

impl SymphoniaExtractorFactory {
    pub fn new() -> Self {
        Self
    }

    fn open_blocking(locator: &MediaLocator) -> Result<SymphoniaExtractor> {
        let (media_source, label): (Box<dyn MediaSource>, String) = match locator {
            MediaLocator::Path(path) => {
                let file = std::fs::File::open(path).map_err(|e| {
                    error!("Failed to open file {:?}: {}", path, e);
                    BridgeError::Io(e)
                })?;
                (Box::new(file), path.display().to_string())
            }
            MediaLocator::Memory { data, .. } => {
                (Box::new(Cursor::new(data.clone())), "memory buffer".to_string())
            }
        };

        let mut hint = Hint::new();
        if let Some(extension) = locator.extension_hint() {
            debug!("Setting probe hint extension: {}", extension);
            hint.with_extension(&extension);
        }

        let mss = MediaSourceStream::new(media_source, Default::default());
        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| {
                error!("Format probe failed for {}: {}", label, e);
                map_symphonia_error(e)
            })?;

        Ok(SymphoniaExtractor::new(probed.format, label))
    }
}

#[async_trait]
impl ExtractorFactory for SymphoniaExtractorFactory {
    #[instrument(skip(self))]
    async fn open(&self, locator: &MediaLocator) -> Result<Box<dyn MediaExtractor>> {
        let locator = locator.clone();
        let extractor = core_async::task::spawn_blocking(move || Self::open_blocking(&locator))
            .await
            .map_err(|e| BridgeError::OperationFailed(format!("probe task failed: {}", e)))??;

        info!(
            source = %extractor.source,
            tracks = extractor.tracks.len(),
            "Opened media source"
        );
        Ok(Box::new(extractor))
    }
}

struct TrackEntry {
    id: u32,
    format: TrackFormat,
    time_base: Option<TimeBase>,
}

/// A probed container positioned on one selected track.
///
/// The extractor always holds the packet it will hand out next, so
/// `sample_time` can be answered without reading ahead again.
pub struct SymphoniaExtractor {
    reader: Option<Box<dyn FormatReader>>,
    tracks: Vec<TrackEntry>,
    selected: Option<usize>,
    current: Option<Packet>,
    source: String,
}

impl SymphoniaExtractor {
    fn new(reader: Box<dyn FormatReader>, source: String) -> Self {
        let tracks = reader
            .tracks()
            .iter()
            .map(|track| TrackEntry {
                id: track.id,
                format: codec_map::track_format(track),
                time_base: track.codec_params.time_base.or_else(|| {
                    track
                        .codec_params
                        .sample_rate
                        .map(|rate| TimeBase::new(1, rate))
                }),
            })
            .collect();

        Self {
            reader: Some(reader),
            tracks,
            selected: None,
            current: None,
            source,
        }
    }

    fn reader_mut(&mut self) -> Result<&mut Box<dyn FormatReader>> {
        self.reader
            .as_mut()
            .ok_or_else(|| BridgeError::OperationFailed("extractor already released".to_string()))
    }

    /// Reads packets until one belongs to the selected track.
    fn load_next(&mut self) -> Result<()> {
        let track_id = match self.selected {
            Some(index) => self.tracks[index].id,
            None => return Err(BridgeError::InvalidArgument("no track selected".to_string())),
        };

        let reader = self.reader_mut()?;
        let packet = loop {
            match reader.next_packet() {
                Ok(packet) if packet.track_id() == track_id => break Some(packet),
                Ok(_) => continue,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break None;
                }
                Err(SymphoniaError::ResetRequired) => {
                    warn!("Track list changed mid-stream, treating as end of stream");
                    break None;
                }
                Err(e) => {
                    error!("Failed to read packet: {}", e);
                    return Err(map_symphonia_error(e));
                }
            }
        };

        while !reader.metadata().is_latest() {
            reader.metadata().pop();
        }

        self.current = packet;
        Ok(())
    }
}

impl MediaExtractor for SymphoniaExtractor {
    fn track_count(&self) -> usize {
        self.tracks.len()
    }

    fn track_format(&self, index: usize) -> Result<TrackFormat> {
        self.tracks
            .get(index)
            .map(|entry| entry.format.clone())
            .ok_or_else(|| BridgeError::InvalidArgument(format!("no track at index {}", index)))
    }

    fn select_track(&mut self, index: usize) -> Result<()> {
        if index >= self.tracks.len() {
            return Err(BridgeError::InvalidArgument(format!(
                "no track at index {}",
                index
            )));
        }
        debug!(index, track_id = self.tracks[index].id, "Selected track");
        self.selected = Some(index);
        self.load_next()
    }

    fn read_sample_data(&mut self, buf: &mut Vec<u8>) -> Result<Option<usize>> {
        if self.selected.is_none() {
            return Err(BridgeError::InvalidArgument("no track selected".to_string()));
        }
        buf.clear();
        Ok(self.current.as_ref().map(|packet| {
            buf.extend_from_slice(packet.buf());
            packet.buf().len()
        }))
    }

    fn sample_time(&self) -> Option<i64> {
        let packet = self.current.as_ref()?;
        let index = self.selected?;
        let time_base = self.tracks[index].time_base?;
        let time = time_base.calc_time(packet.ts());
        Some(time.seconds as i64 * 1_000_000 + (time.frac * 1_000_000.0) as i64)
    }

    fn advance(&mut self) -> Result<bool> {
        if self.current.is_none() {
            return Ok(false);
        }
        self.load_next()?;
        Ok(self.current.is_some())
    }

    fn release(&mut self) {
        if self.reader.take().is_some() {
            debug!(source = %self.source, "Released media source");
        }
        self.current = None;
    }
}

fn map_symphonia_error(err: SymphoniaError) -> BridgeError {
    match err {
        SymphoniaError::IoError(e) => BridgeError::Io(e),
        SymphoniaError::Unsupported(what) => BridgeError::Unsupported(what.to_string()),
        other => BridgeError::OperationFailed(other.to_string()),
    }
}
