//! # Decode Orchestrator
//!
//! Drives one conversion from a media locator to PCM or a WAV container.
//!
//! ## Lifecycle
//!
//! ```text
//! Idle -> SourceOpened -> TrackSelected -> SessionConfigured -> Draining
//!      -> Finalizing -> Complete
//! ```
//!
//! Any step may end in `Failed`; cancellation observed before `Finalizing`
//! ends in `Cancelled`. Whatever the exit, the extractor is released exactly
//! once and the decoder session is stopped and released.
//!
//! ## Loop
//!
//! Each iteration submits at most one input sample, then drains output until
//! the decoder has nothing ready or `max_drain_polls` is reached. Iterations
//! that move nothing back off with a capped exponential sleep; too many in a
//! row fail the operation with [`DecodeError::StallTimeout`].
//!
//! ## Usage
//!
//! ```ignore
//! use core_async::sync::CancellationToken;
//! use core_decode::{DecodeConfig, DecodeOutcome, PcmDecoder};
//!
//! let decoder = PcmDecoder::new(extractors, codecs, DecodeConfig::default())?;
//! let cancel = CancellationToken::new();
//!
//! match decoder
//!     .decode_to_wav_file(&MediaLocator::path("song.mp3"), "song.wav".as_ref(), &cancel)
//!     .await?
//! {
//!     DecodeOutcome::Completed(summary) => println!("{} bytes", summary.pcm_bytes),
//!     DecodeOutcome::Cancelled => println!("cancelled"),
//! }
//! ```

use std::fs::OpenOptions;
use std::io::{self, BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bridge_traits::codec::CodecProvider;
use bridge_traits::media::{ExtractorFactory, MediaExtractor, MediaLocator};
use core_async::sync::CancellationToken;
use core_async::task;
use core_async::time::{next_backoff, sleep};
use core_runtime::events::{ConversionEvent, CoreEvent, EventBus, SourceEvent};
use core_runtime::logging::strip_path;
use core_runtime::CoreConfig;
use parking_lot::Mutex;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::{DecodeConfig, PcmSpool};
use crate::drain::{DrainStatus, PcmDrain};
use crate::error::{DecodeError, Result};
use crate::progress::ProgressTracker;
use crate::pump::ExtractionPump;
use crate::session::DecoderSession;
use crate::sink::{MemoryPcmSink, PcmSink, SpoolPcmSink};
use crate::track::{select_audio_track, TrackDescriptor};
use crate::wav::{write_wav, WavSpec};

/// Largest up-front allocation made for an in-memory PCM buffer.
const MAX_PREALLOCATED_PCM: u64 = 64 * 1024 * 1024;
const WAV_WRITE_BUFFER_BYTES: usize = 64 * 1024;
const SPOOL_SUBDIR: &str = "pcm";

// ============================================================================
// Public Types
// ============================================================================

/// Where the most recent operation on a [`PcmDecoder`] got to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Idle,
    SourceOpened,
    TrackSelected,
    SessionConfigured,
    Draining,
    Finalizing,
    Complete,
    Failed,
    Cancelled,
}

impl OrchestratorState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrchestratorState::Complete | OrchestratorState::Failed | OrchestratorState::Cancelled
        )
    }
}

/// Result of an operation that ran to an end without failing.
#[derive(Debug)]
pub enum DecodeOutcome<T> {
    Completed(T),
    /// Cancellation was observed before any output was written.
    Cancelled,
}

impl<T> DecodeOutcome<T> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DecodeOutcome::Cancelled)
    }

    pub fn completed(self) -> Option<T> {
        match self {
            DecodeOutcome::Completed(value) => Some(value),
            DecodeOutcome::Cancelled => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> DecodeOutcome<U> {
        match self {
            DecodeOutcome::Completed(value) => DecodeOutcome::Completed(f(value)),
            DecodeOutcome::Cancelled => DecodeOutcome::Cancelled,
        }
    }
}

/// Statistics of a completed operation.
#[derive(Debug, Clone)]
pub struct DecodeSummary {
    pub operation_id: Uuid,
    pub track: TrackDescriptor,
    /// Name of the decoder the provider handed out.
    pub decoder: String,
    pub pcm_bytes: u64,
    pub samples_submitted: u64,
    pub output_buffers: u64,
    pub format_changes: u32,
    pub elapsed: Duration,
}

/// Decoded PCM plus the statistics of the run that produced it.
pub struct PcmOutput {
    pub summary: DecodeSummary,
    sink: Box<dyn PcmSink>,
}

impl PcmOutput {
    pub fn len(&self) -> u64 {
        self.sink.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sink.is_empty()
    }

    /// Reader over the PCM bytes in drain order.
    pub fn into_reader(self) -> Result<Box<dyn Read + Send>> {
        Ok(self.sink.into_reader()?)
    }

    pub fn into_bytes(self) -> Result<Vec<u8>> {
        let capacity = usize::try_from(self.sink.len()).unwrap_or(0);
        let mut reader = self.sink.into_reader()?;
        let mut bytes = Vec::with_capacity(capacity);
        reader.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

impl std::fmt::Debug for PcmOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PcmOutput")
            .field("summary", &self.summary)
            .field("len", &self.sink.len())
            .finish()
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Converts media into PCM or WAV through the host's extractor and codec
/// bridges.
///
/// One instance runs one operation at a time; [`PcmDecoder::state`] tracks
/// the most recent one. Concurrent conversions use separate instances, which
/// may share the same bridges.
pub struct PcmDecoder {
    extractors: Arc<dyn ExtractorFactory>,
    codecs: Arc<dyn CodecProvider>,
    config: DecodeConfig,
    cache_dir: Option<PathBuf>,
    event_bus: Option<EventBus>,
    state: Mutex<OrchestratorState>,
}

impl PcmDecoder {
    /// # Errors
    ///
    /// [`DecodeError::InvalidConfig`] when `config` fails validation.
    pub fn new(
        extractors: Arc<dyn ExtractorFactory>,
        codecs: Arc<dyn CodecProvider>,
        config: DecodeConfig,
    ) -> Result<Self> {
        config.validate().map_err(DecodeError::InvalidConfig)?;

        Ok(Self {
            extractors,
            codecs,
            config,
            cache_dir: None,
            event_bus: None,
            state: Mutex::new(OrchestratorState::Idle),
        })
    }

    /// Uses the bridges and cache directory of a runtime configuration.
    pub fn from_core_config(core: &CoreConfig, config: DecodeConfig) -> Result<Self> {
        Ok(Self::new(
            Arc::clone(&core.extractor_factory),
            Arc::clone(&core.codec_provider),
            config,
        )?
        .with_cache_dir(core.cache_dir.clone()))
    }

    /// Publishes lifecycle and progress events on `bus`.
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Directory used by [`PcmSpool::CacheDir`].
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn state(&self) -> OrchestratorState {
        *self.state.lock()
    }

    pub fn config(&self) -> &DecodeConfig {
        &self.config
    }

    /// Decodes the first audio track of `locator` into raw interleaved PCM.
    ///
    /// # Errors
    ///
    /// Every [`DecodeError`] except `OutputWriteFailure` raised by a WAV
    /// writer; spooling to disk may still fail with `OutputWriteFailure`.
    pub async fn decode_to_pcm(
        &self,
        locator: &MediaLocator,
        cancel: &CancellationToken,
    ) -> Result<DecodeOutcome<PcmOutput>> {
        let operation = self.begin(locator);
        let result = self.run_pipeline(&operation, locator, cancel).await;
        self.finish(&operation, result, |pcm| pcm.summary.pcm_bytes)
    }

    /// Decodes `locator` and writes a WAV container to `out`.
    ///
    /// The container starts at `out`'s current position. Nothing is written
    /// to `out` unless decoding finished and cancellation was not observed.
    pub async fn decode_to_wav<W>(
        &self,
        locator: &MediaLocator,
        out: &mut W,
        cancel: &CancellationToken,
    ) -> Result<DecodeOutcome<DecodeSummary>>
    where
        W: Write + Seek + Send + ?Sized,
    {
        let operation = self.begin(locator);
        let result = async {
            let pcm = match self.run_pipeline(&operation, locator, cancel).await? {
                DecodeOutcome::Completed(pcm) => pcm,
                DecodeOutcome::Cancelled => return Ok(DecodeOutcome::Cancelled),
            };
            if cancel.is_cancelled() {
                return Ok(DecodeOutcome::Cancelled);
            }

            let spec = WavSpec::from(&pcm.summary.track);
            let summary = pcm.summary;
            let mut reader = pcm.sink.into_reader()?;
            write_wav(out, &spec, &mut reader)?;
            Ok::<_, DecodeError>(DecodeOutcome::Completed(summary))
        }
        .await;

        self.finish(&operation, result, |summary| summary.pcm_bytes)
    }

    /// Decodes `locator` into a WAV file at `path`.
    ///
    /// The file is created (or truncated) only once decoding has finished, so
    /// failed and cancelled operations never touch it. The write runs on the
    /// blocking pool.
    pub async fn decode_to_wav_file(
        &self,
        locator: &MediaLocator,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<DecodeOutcome<DecodeSummary>> {
        let operation = self.begin(locator);
        let result = async {
            let pcm = match self.run_pipeline(&operation, locator, cancel).await? {
                DecodeOutcome::Completed(pcm) => pcm,
                DecodeOutcome::Cancelled => return Ok(DecodeOutcome::Cancelled),
            };
            if cancel.is_cancelled() {
                return Ok(DecodeOutcome::Cancelled);
            }

            let spec = WavSpec::from(&pcm.summary.track);
            let summary = pcm.summary;
            let reader = pcm.sink.into_reader()?;
            let target = path.to_path_buf();

            let written = task::spawn_blocking(move || write_wav_file(&target, &spec, reader))
                .await
                .map_err(|e| DecodeError::OutputWriteFailure(io::Error::other(e.to_string())))??;
            debug!(
                path = strip_path(&path.to_string_lossy()),
                data_bytes = written,
                "WAV file written"
            );
            Ok::<_, DecodeError>(DecodeOutcome::Completed(summary))
        }
        .await;

        self.finish(&operation, result, |summary| summary.pcm_bytes)
    }

    // ------------------------------------------------------------------------
    // Pipeline
    // ------------------------------------------------------------------------

    #[instrument(skip_all, fields(operation_id = %operation.id))]
    async fn run_pipeline(
        &self,
        operation: &Operation,
        locator: &MediaLocator,
        cancel: &CancellationToken,
    ) -> Result<DecodeOutcome<PcmOutput>> {
        self.set_state(OrchestratorState::Idle);
        if cancel.is_cancelled() {
            return Ok(DecodeOutcome::Cancelled);
        }

        let extractor = self
            .extractors
            .open(locator)
            .await
            .map_err(|e| DecodeError::SourceUnavailable(e.to_string()))?;
        let mut source = SourceGuard::new(extractor);
        self.set_state(OrchestratorState::SourceOpened);
        self.emit(CoreEvent::Source(SourceEvent::Opened {
            operation_id: operation.id.to_string(),
            source: operation.source.clone(),
            track_count: source.get().track_count(),
        }));

        let track = select_audio_track(source.get())?;
        source
            .get_mut()
            .select_track(track.index)
            .map_err(DecodeError::Source)?;
        self.set_state(OrchestratorState::TrackSelected);
        info!(
            track = track.index,
            mime = %track.mime_type,
            sample_rate = track.sample_rate,
            channels = track.channel_count,
            "Selected audio track"
        );
        self.emit(CoreEvent::Source(SourceEvent::TrackSelected {
            operation_id: operation.id.to_string(),
            track_index: track.index,
            mime_type: track.mime_type.clone(),
            sample_rate: track.sample_rate,
            channel_count: track.channel_count,
            duration_us: track.duration_us,
        }));

        let mut session = DecoderSession::open(self.codecs.as_ref(), &track, self.config.poll_timeout)?;
        session.start()?;
        self.set_state(OrchestratorState::SessionConfigured);

        let mut sink = self.create_sink(operation.id, &track)?;
        self.set_state(OrchestratorState::Draining);

        let stats = match self
            .drain_loop(operation, source.get_mut(), &mut session, sink.as_mut(), &track, cancel)
            .await
        {
            Ok(Some(stats)) => stats,
            Ok(None) => {
                session.abort();
                return Ok(DecodeOutcome::Cancelled);
            }
            Err(e) => {
                session.abort();
                return Err(e);
            }
        };

        self.set_state(OrchestratorState::Finalizing);
        session.shutdown();
        source.release();

        let summary = DecodeSummary {
            operation_id: operation.id,
            decoder: session.name().to_string(),
            pcm_bytes: sink.len(),
            samples_submitted: stats.samples_submitted,
            output_buffers: stats.output_buffers,
            format_changes: stats.format_changes,
            elapsed: operation.started.elapsed(),
            track,
        };
        Ok(DecodeOutcome::Completed(PcmOutput { summary, sink }))
    }

    /// Runs pump and drain until the decoder echoes end of stream.
    ///
    /// Returns `None` once cancellation is observed; no further slot is
    /// requested after that.
    async fn drain_loop(
        &self,
        operation: &Operation,
        source: &mut dyn MediaExtractor,
        session: &mut DecoderSession,
        sink: &mut dyn PcmSink,
        track: &TrackDescriptor,
        cancel: &CancellationToken,
    ) -> Result<Option<LoopStats>> {
        let mut pump = ExtractionPump::new();
        let mut drain = PcmDrain::new();
        let mut progress = ProgressTracker::new(track.duration_us);
        let mut idle_iterations: u32 = 0;
        let mut backoff = Duration::ZERO;

        loop {
            if cancel.is_cancelled() {
                info!("Cancellation observed while decoding");
                return Ok(None);
            }

            let samples_before = pump.samples_submitted();
            let exhausted_before = pump.is_exhausted();
            pump.step(source, session).await?;
            let mut progressed = pump.samples_submitted() != samples_before
                || pump.is_exhausted() != exhausted_before;

            let mut output_exhausted = false;
            for _ in 0..self.config.max_drain_polls {
                if cancel.is_cancelled() {
                    info!("Cancellation observed while draining");
                    return Ok(None);
                }
                match drain.step(session, sink).await? {
                    DrainStatus::Continuing { progressed: true } => progressed = true,
                    DrainStatus::Continuing { progressed: false } => break,
                    DrainStatus::OutputExhausted => {
                        output_exhausted = true;
                        break;
                    }
                }
            }

            if let Some(pts) = drain.last_presentation_time_us() {
                if let Some(percent) = progress.update(pts) {
                    self.emit_progress(operation, percent);
                }
            }

            if output_exhausted {
                if let Some(percent) = progress.finish() {
                    self.emit_progress(operation, percent);
                }
                debug!(
                    samples = pump.samples_submitted(),
                    input_bytes = pump.bytes_submitted(),
                    pcm_bytes = drain.bytes_drained(),
                    "Decode loop finished"
                );
                return Ok(Some(LoopStats {
                    samples_submitted: pump.samples_submitted(),
                    output_buffers: drain.buffers_released(),
                    format_changes: drain.format_changes(),
                }));
            }

            if progressed {
                idle_iterations = 0;
                backoff = Duration::ZERO;
                task::yield_now().await;
                continue;
            }

            idle_iterations += 1;
            if idle_iterations >= self.config.stall_poll_limit {
                warn!(
                    polls = idle_iterations,
                    input_exhausted = pump.is_exhausted(),
                    "Decoder stopped making progress"
                );
                return Err(DecodeError::StallTimeout {
                    polls: idle_iterations,
                });
            }

            backoff = next_backoff(backoff, self.config.max_backoff);
            sleep(backoff).await;
        }
    }

    fn create_sink(&self, operation_id: Uuid, track: &TrackDescriptor) -> Result<Box<dyn PcmSink>> {
        let sink: Box<dyn PcmSink> = match &self.config.spool {
            PcmSpool::Memory => {
                let capacity = estimated_pcm_len(track).min(MAX_PREALLOCATED_PCM) as usize;
                Box::new(MemoryPcmSink::with_capacity(capacity))
            }
            PcmSpool::CacheDir => {
                let dir = self.cache_dir.as_ref().ok_or_else(|| {
                    DecodeError::InvalidConfig(
                        "spooling to the cache directory requires a cache directory".to_string(),
                    )
                })?;
                Box::new(SpoolPcmSink::create(&dir.join(SPOOL_SUBDIR), operation_id)?)
            }
            PcmSpool::Directory(dir) => Box::new(SpoolPcmSink::create(dir, operation_id)?),
        };
        Ok(sink)
    }

    // ------------------------------------------------------------------------
    // Bookkeeping
    // ------------------------------------------------------------------------

    fn begin(&self, locator: &MediaLocator) -> Operation {
        let operation = Operation {
            id: Uuid::new_v4(),
            source: describe_locator(locator),
            started: Instant::now(),
        };
        info!(operation_id = %operation.id, source = %operation.source, "Starting conversion");
        self.emit(CoreEvent::Conversion(ConversionEvent::Started {
            operation_id: operation.id.to_string(),
            source: operation.source.clone(),
        }));
        operation
    }

    fn finish<T>(
        &self,
        operation: &Operation,
        result: Result<DecodeOutcome<T>>,
        pcm_bytes: impl FnOnce(&T) -> u64,
    ) -> Result<DecodeOutcome<T>> {
        let operation_id = operation.id.to_string();
        match &result {
            Ok(DecodeOutcome::Completed(value)) => {
                let pcm_bytes = pcm_bytes(value);
                let elapsed_ms = operation.started.elapsed().as_millis() as u64;
                self.set_state(OrchestratorState::Complete);
                info!(operation_id = %operation.id, pcm_bytes, elapsed_ms, "Conversion completed");
                self.emit(CoreEvent::Conversion(ConversionEvent::Completed {
                    operation_id,
                    pcm_bytes,
                    elapsed_ms,
                }));
            }
            Ok(DecodeOutcome::Cancelled) => {
                self.set_state(OrchestratorState::Cancelled);
                info!(operation_id = %operation.id, "Conversion cancelled");
                self.emit(CoreEvent::Conversion(ConversionEvent::Cancelled { operation_id }));
            }
            Err(e) => {
                self.set_state(OrchestratorState::Failed);
                error!(operation_id = %operation.id, kind = e.kind(), error = %e, "Conversion failed");
                self.emit(CoreEvent::Conversion(ConversionEvent::Failed {
                    operation_id,
                    kind: e.kind().to_string(),
                    message: e.to_string(),
                }));
            }
        }
        result
    }

    fn set_state(&self, state: OrchestratorState) {
        *self.state.lock() = state;
    }

    fn emit(&self, event: CoreEvent) {
        if let Some(bus) = &self.event_bus {
            // No subscribers is not an error.
            bus.emit(event).ok();
        }
    }

    fn emit_progress(&self, operation: &Operation, percent: u8) {
        if self.config.emit_progress {
            self.emit(CoreEvent::Conversion(ConversionEvent::Progress {
                operation_id: operation.id.to_string(),
                percent,
            }));
        }
    }
}

impl std::fmt::Debug for PcmDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PcmDecoder")
            .field("config", &self.config)
            .field("cache_dir", &self.cache_dir)
            .field("events", &self.event_bus.is_some())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Helpers
// ============================================================================

struct Operation {
    id: Uuid,
    source: String,
    started: Instant,
}

struct LoopStats {
    samples_submitted: u64,
    output_buffers: u64,
    format_changes: u32,
}

/// Owns the extractor and releases it exactly once, on success or unwind.
struct SourceGuard {
    extractor: Box<dyn MediaExtractor>,
    released: bool,
}

impl SourceGuard {
    fn new(extractor: Box<dyn MediaExtractor>) -> Self {
        Self {
            extractor,
            released: false,
        }
    }

    fn get(&self) -> &dyn MediaExtractor {
        self.extractor.as_ref()
    }

    fn get_mut(&mut self) -> &mut dyn MediaExtractor {
        self.extractor.as_mut()
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.extractor.release();
            debug!("Released media source");
        }
    }
}

impl Drop for SourceGuard {
    fn drop(&mut self) {
        self.release();
    }
}

fn write_wav_file(path: &Path, spec: &WavSpec, mut pcm: Box<dyn Read + Send>) -> io::Result<u64> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    let mut out = BufWriter::with_capacity(WAV_WRITE_BUFFER_BYTES, file);
    let written = write_wav(&mut out, spec, &mut pcm)?;
    let file = out.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(written)
}

fn describe_locator(locator: &MediaLocator) -> String {
    match locator {
        MediaLocator::Path(path) => strip_path(&path.to_string_lossy()).to_string(),
        MediaLocator::Memory {
            extension_hint: Some(ext),
            ..
        } => format!("memory buffer ({})", ext),
        MediaLocator::Memory { .. } => "memory buffer".to_string(),
    }
}

fn estimated_pcm_len(track: &TrackDescriptor) -> u64 {
    match track.duration_us {
        Some(duration_us) if duration_us > 0 => {
            ((duration_us as u128 * track.byte_rate() as u128) / 1_000_000) as u64
        }
        _ => 0,
    }
}
