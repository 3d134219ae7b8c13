//! # Decoder Session
//!
//! Owns one configured decoder for the lifetime of a conversion and tracks
//! where it is in the exchange protocol.
//!
//! ```text
//! Configured ──start──> Running ──input EOS──> InputDrained ──output EOS──> OutputDrained
//!      │                   │                        │                            │
//!      └──────────── any failure ──────> Failed ────┴──────> Stopped <───────────┘
//! ```
//!
//! `Stopped` is only entered from `OutputDrained` or `Failed`, and the decoder
//! is stopped and released exactly once on the way there, whether the
//! session is shut down explicitly or dropped while unwinding.

use bridge_traits::codec::{BufferFlags, BufferInfo, CodecProvider, MediaCodec, OutputEvent};
use bridge_traits::media::TrackFormat;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{DecodeError, Result, SlotSide};
use crate::track::TrackDescriptor;

/// Where a session is in the exchange protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Configured,
    Running,
    /// End of stream submitted; output still draining.
    InputDrained,
    /// Decoder echoed end of stream on its output.
    OutputDrained,
    Failed,
    Stopped,
}

impl SessionState {
    /// Whether input slots may still be requested.
    pub fn accepts_input(self) -> bool {
        self == SessionState::Running
    }

    /// Whether output slots may still be polled.
    pub fn produces_output(self) -> bool {
        matches!(self, SessionState::Running | SessionState::InputDrained)
    }
}

/// A started decoder bound to one track.
pub struct DecoderSession {
    codec: Box<dyn MediaCodec>,
    name: String,
    state: SessionState,
    poll_timeout: Duration,
    released: bool,
}

impl DecoderSession {
    /// Finds a decoder for `track`, instantiates and configures it.
    ///
    /// # Errors
    ///
    /// - [`DecodeError::NoDecoder`] when the provider has nothing for the MIME type
    /// - [`DecodeError::Codec`] when instantiation or configuration fails; a
    ///   decoder that was created is released before returning
    pub fn open(
        provider: &dyn CodecProvider,
        track: &TrackDescriptor,
        poll_timeout: Duration,
    ) -> Result<Self> {
        let name = provider
            .find_decoder_for_format(&track.format)
            .ok_or_else(|| DecodeError::NoDecoder {
                mime: track.mime_type.clone(),
            })?;

        let codec = provider
            .create_by_codec_name(&name)
            .map_err(DecodeError::Codec)?;

        // From here on the decoder is owned by the session, so a configure
        // failure still goes through the release path in Drop.
        let mut session = Self {
            codec,
            name,
            state: SessionState::Configured,
            poll_timeout,
            released: false,
        };

        if let Err(e) = session.codec.configure(&track.format) {
            session.state = SessionState::Failed;
            return Err(DecodeError::Codec(e));
        }

        debug!(decoder = %session.name, mime = %track.mime_type, "Configured decoder");
        Ok(session)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Configured → Running.
    pub fn start(&mut self) -> Result<()> {
        self.expect_state(SessionState::Configured, "start")?;
        self.guard(|codec| codec.start())?;
        self.state = SessionState::Running;
        info!(decoder = %self.name, "Decoder started");
        Ok(())
    }

    /// Polls for a free input slot, waiting at most the poll timeout.
    pub async fn dequeue_input_slot(&mut self) -> Result<Option<usize>> {
        if !self.state.accepts_input() {
            return Err(self.protocol_error("input slot requested"));
        }
        match self.codec.dequeue_input_buffer(self.poll_timeout).await {
            Ok(slot) => Ok(slot),
            Err(e) => {
                self.state = SessionState::Failed;
                Err(DecodeError::Codec(e))
            }
        }
    }

    /// Writable buffer behind input slot `index`.
    pub fn input_buffer(&mut self, index: usize) -> Result<&mut Vec<u8>> {
        match self.codec.input_buffer(index) {
            Some(buffer) => Ok(buffer),
            None => {
                self.state = SessionState::Failed;
                Err(DecodeError::ProviderCrashed {
                    side: SlotSide::Input,
                    index,
                })
            }
        }
    }

    /// Submits `size` bytes of compressed data held in slot `index`.
    pub fn submit_sample(&mut self, index: usize, size: usize, presentation_time_us: i64) -> Result<()> {
        self.expect_state(SessionState::Running, "sample submitted")?;
        self.guard(|codec| {
            codec.queue_input_buffer(index, size, presentation_time_us, BufferFlags::NONE)
        })
    }

    /// Submits the end-of-stream marker: an empty buffer at time zero.
    ///
    /// Running → InputDrained. A second call is a protocol error.
    pub fn submit_end_of_stream(&mut self, index: usize) -> Result<()> {
        self.expect_state(SessionState::Running, "end of stream submitted")?;
        self.guard(|codec| codec.queue_input_buffer(index, 0, 0, BufferFlags::END_OF_STREAM))?;
        self.state = SessionState::InputDrained;
        debug!(decoder = %self.name, "Submitted end of stream");
        Ok(())
    }

    /// Polls for decoded output, waiting at most the poll timeout.
    pub async fn dequeue_output(&mut self) -> Result<OutputEvent> {
        if !self.state.produces_output() {
            return Err(self.protocol_error("output polled"));
        }
        match self.codec.dequeue_output_buffer(self.poll_timeout).await {
            Ok(event) => Ok(event),
            Err(e) => {
                self.state = SessionState::Failed;
                Err(DecodeError::Codec(e))
            }
        }
    }

    /// The valid bytes of output slot `index`, as described by `info`.
    pub fn output_data(&mut self, index: usize, info: &BufferInfo) -> Result<&[u8]> {
        let Some(buffer) = self.codec.output_buffer(index) else {
            self.state = SessionState::Failed;
            return Err(DecodeError::ProviderCrashed {
                side: SlotSide::Output,
                index,
            });
        };

        match info.offset.checked_add(info.size) {
            Some(end) if end <= buffer.len() => Ok(&buffer[info.offset..end]),
            _ => {
                let len = buffer.len();
                self.state = SessionState::Failed;
                Err(DecodeError::ProtocolViolation(format!(
                    "output slot {} describes bytes {}..+{} of a {} byte buffer",
                    index, info.offset, info.size, len
                )))
            }
        }
    }

    /// Hands output slot `index` back to the decoder.
    ///
    /// When the slot carried the end-of-stream flag the session moves to
    /// OutputDrained. An end-of-stream echo that arrives before input end of
    /// stream was submitted is a protocol violation.
    pub fn release_output(&mut self, index: usize, end_of_stream: bool) -> Result<()> {
        if end_of_stream && self.state != SessionState::InputDrained {
            let err = self.protocol_error("end of stream echoed before input ended");
            self.state = SessionState::Failed;
            return Err(err);
        }
        self.guard(|codec| codec.release_output_buffer(index))?;
        if end_of_stream {
            self.state = SessionState::OutputDrained;
            debug!(decoder = %self.name, "Decoder output drained");
        }
        Ok(())
    }

    pub fn output_format(&self) -> Option<TrackFormat> {
        self.codec.output_format()
    }

    /// Marks the session failed so shutdown treats it as an abort.
    pub fn abort(&mut self) {
        if self.state != SessionState::Stopped {
            self.state = SessionState::Failed;
        }
    }

    /// Stops and releases the decoder. Safe to call more than once; only the
    /// first call reaches the decoder.
    pub fn shutdown(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if self.state != SessionState::OutputDrained {
            self.state = SessionState::Failed;
        }

        if let Err(e) = self.codec.stop() {
            warn!(decoder = %self.name, error = %e, "Decoder stop failed, releasing anyway");
        }
        self.codec.release();
        self.state = SessionState::Stopped;
        debug!(decoder = %self.name, "Decoder released");
    }

    fn guard<T>(
        &mut self,
        call: impl FnOnce(&mut dyn MediaCodec) -> bridge_traits::error::Result<T>,
    ) -> Result<T> {
        call(self.codec.as_mut()).map_err(|e| {
            self.state = SessionState::Failed;
            DecodeError::Codec(e)
        })
    }

    fn expect_state(&mut self, expected: SessionState, action: &str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(self.protocol_error(action))
        }
    }

    fn protocol_error(&self, action: &str) -> DecodeError {
        DecodeError::ProtocolViolation(format!("{} while session is {:?}", action, self.state))
    }
}

impl Drop for DecoderSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for DecoderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderSession")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::media::mime;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Calls {
        created: AtomicUsize,
        stops: AtomicUsize,
        releases: AtomicUsize,
        output_releases: AtomicUsize,
    }

    impl Calls {
        fn get(counter: &AtomicUsize) -> usize {
            counter.load(Ordering::SeqCst)
        }
    }

    /// `None` in `outputs` makes that dequeue fail.
    #[derive(Default, Clone)]
    struct Script {
        outputs: VecDeque<Option<OutputEvent>>,
        output_bytes: Vec<u8>,
        fail_configure: bool,
        fail_input_dequeue: bool,
        fail_queue: bool,
    }

    struct FakeCodec {
        script: Script,
        calls: Arc<Calls>,
        input: Vec<u8>,
    }

    #[async_trait]
    impl MediaCodec for FakeCodec {
        fn name(&self) -> &str {
            "fake.decoder"
        }

        fn configure(&mut self, _format: &TrackFormat) -> BridgeResult<()> {
            if self.script.fail_configure {
                return Err(BridgeError::Unsupported("sample rate".to_string()));
            }
            Ok(())
        }

        fn start(&mut self) -> BridgeResult<()> {
            Ok(())
        }

        async fn dequeue_input_buffer(&mut self, _timeout: Duration) -> BridgeResult<Option<usize>> {
            if self.script.fail_input_dequeue {
                return Err(BridgeError::OperationFailed("input queue gone".to_string()));
            }
            Ok(Some(0))
        }

        fn input_buffer(&mut self, index: usize) -> Option<&mut Vec<u8>> {
            (index == 0).then_some(&mut self.input)
        }

        fn queue_input_buffer(
            &mut self,
            _index: usize,
            _size: usize,
            _presentation_time_us: i64,
            _flags: BufferFlags,
        ) -> BridgeResult<()> {
            if self.script.fail_queue {
                return Err(BridgeError::OperationFailed("queue rejected".to_string()));
            }
            Ok(())
        }

        async fn dequeue_output_buffer(&mut self, _timeout: Duration) -> BridgeResult<OutputEvent> {
            match self.script.outputs.pop_front() {
                Some(Some(event)) => Ok(event),
                Some(None) => Err(BridgeError::OperationFailed("decoder reset".to_string())),
                None => Ok(OutputEvent::TryAgainLater),
            }
        }

        fn output_buffer(&self, index: usize) -> Option<&[u8]> {
            (index == 0).then_some(self.script.output_bytes.as_slice())
        }

        fn release_output_buffer(&mut self, _index: usize) -> BridgeResult<()> {
            self.calls.output_releases.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn output_format(&self) -> Option<TrackFormat> {
            None
        }

        fn stop(&mut self) -> BridgeResult<()> {
            self.calls.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn release(&mut self) {
            self.calls.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FakeProvider {
        script: Script,
        calls: Arc<Calls>,
        available: bool,
    }

    impl CodecProvider for FakeProvider {
        fn find_decoder_for_format(&self, _format: &TrackFormat) -> Option<String> {
            self.available.then(|| "fake.decoder".to_string())
        }

        fn create_by_codec_name(&self, _name: &str) -> BridgeResult<Box<dyn MediaCodec>> {
            self.calls.created.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeCodec {
                script: self.script.clone(),
                calls: Arc::clone(&self.calls),
                input: Vec::new(),
            }))
        }
    }

    fn track() -> TrackDescriptor {
        TrackDescriptor {
            index: 0,
            mime_type: mime::AUDIO_MPEG.to_string(),
            channel_count: 2,
            sample_rate: 44_100,
            bit_depth: 16,
            duration_us: None,
            format: TrackFormat::audio(mime::AUDIO_MPEG, 44_100, 2),
        }
    }

    fn buffer(size: usize, flags: BufferFlags) -> Option<OutputEvent> {
        Some(OutputEvent::Buffer {
            index: 0,
            info: BufferInfo {
                offset: 0,
                size,
                presentation_time_us: 0,
                flags,
            },
        })
    }

    fn open(script: Script) -> (DecoderSession, Arc<Calls>) {
        let calls = Arc::new(Calls::default());
        let provider = FakeProvider {
            script,
            calls: Arc::clone(&calls),
            available: true,
        };
        let session = DecoderSession::open(&provider, &track(), Duration::from_millis(1)).unwrap();
        (session, calls)
    }

    fn assert_released_once(calls: &Calls) {
        assert_eq!(Calls::get(&calls.stops), 1, "stops");
        assert_eq!(Calls::get(&calls.releases), 1, "releases");
    }

    #[tokio::test]
    async fn test_full_lifecycle() {
        let script = Script {
            outputs: VecDeque::from([
                buffer(4, BufferFlags::NONE),
                buffer(0, BufferFlags::END_OF_STREAM),
            ]),
            output_bytes: vec![1, 2, 3, 4],
            ..Default::default()
        };
        let (mut session, calls) = open(script);
        assert_eq!(session.state(), SessionState::Configured);
        assert_eq!(session.name(), "fake.decoder");

        session.start().unwrap();
        assert_eq!(session.state(), SessionState::Running);

        let slot = session.dequeue_input_slot().await.unwrap().unwrap();
        session.input_buffer(slot).unwrap().extend_from_slice(&[9; 8]);
        session.submit_sample(slot, 8, 0).unwrap();
        let slot = session.dequeue_input_slot().await.unwrap().unwrap();
        session.submit_end_of_stream(slot).unwrap();
        assert_eq!(session.state(), SessionState::InputDrained);

        let OutputEvent::Buffer { index, info } = session.dequeue_output().await.unwrap() else {
            panic!("expected a buffer");
        };
        assert_eq!(session.output_data(index, &info).unwrap(), &[1, 2, 3, 4]);
        session.release_output(index, false).unwrap();
        assert_eq!(session.state(), SessionState::InputDrained);

        let OutputEvent::Buffer { index, info } = session.dequeue_output().await.unwrap() else {
            panic!("expected the end-of-stream buffer");
        };
        session.release_output(index, info.is_end_of_stream()).unwrap();
        assert_eq!(session.state(), SessionState::OutputDrained);
        assert_eq!(Calls::get(&calls.output_releases), 2);

        session.shutdown();
        assert_eq!(session.state(), SessionState::Stopped);
        session.shutdown();
        drop(session);
        assert_released_once(&calls);
    }

    #[tokio::test]
    async fn test_end_of_stream_echo_before_input_end_is_violation() {
        let script = Script {
            outputs: VecDeque::from([buffer(0, BufferFlags::END_OF_STREAM)]),
            ..Default::default()
        };
        let (mut session, calls) = open(script);
        session.start().unwrap();

        let OutputEvent::Buffer { index, info } = session.dequeue_output().await.unwrap() else {
            panic!("expected a buffer");
        };
        let err = session.release_output(index, info.is_end_of_stream()).unwrap_err();

        assert!(matches!(err, DecodeError::ProtocolViolation(_)));
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(Calls::get(&calls.output_releases), 0);

        session.shutdown();
        assert_eq!(session.state(), SessionState::Stopped);
        assert_released_once(&calls);
    }

    #[tokio::test]
    async fn test_output_region_outside_slot_is_violation() {
        let script = Script {
            outputs: VecDeque::from([Some(OutputEvent::Buffer {
                index: 0,
                info: BufferInfo {
                    offset: 2,
                    size: 8,
                    presentation_time_us: 0,
                    flags: BufferFlags::NONE,
                },
            })]),
            output_bytes: vec![0; 6],
            ..Default::default()
        };
        let (mut session, calls) = open(script);
        session.start().unwrap();

        let OutputEvent::Buffer { index, info } = session.dequeue_output().await.unwrap() else {
            panic!("expected a buffer");
        };
        let err = session.output_data(index, &info).unwrap_err();

        assert!(matches!(err, DecodeError::ProtocolViolation(_)));
        assert_eq!(session.state(), SessionState::Failed);
        drop(session);
        assert_released_once(&calls);
    }

    #[tokio::test]
    async fn test_out_of_order_calls_are_violations() {
        let (mut session, _calls) = open(Script::default());

        assert!(matches!(
            session.dequeue_input_slot().await,
            Err(DecodeError::ProtocolViolation(_))
        ));
        assert!(matches!(
            session.submit_sample(0, 4, 0),
            Err(DecodeError::ProtocolViolation(_))
        ));
        assert!(matches!(
            session.dequeue_output().await,
            Err(DecodeError::ProtocolViolation(_))
        ));
        assert_eq!(session.state(), SessionState::Configured);

        session.start().unwrap();
        assert!(matches!(
            session.start(),
            Err(DecodeError::ProtocolViolation(_))
        ));

        session.submit_end_of_stream(0).unwrap();
        assert!(matches!(
            session.submit_end_of_stream(0),
            Err(DecodeError::ProtocolViolation(_))
        ));
        assert!(matches!(
            session.submit_sample(0, 4, 0),
            Err(DecodeError::ProtocolViolation(_))
        ));
        assert!(matches!(
            session.dequeue_input_slot().await,
            Err(DecodeError::ProtocolViolation(_))
        ));
        assert_eq!(session.state(), SessionState::InputDrained);
    }

    #[tokio::test]
    async fn test_codec_errors_fail_the_session() {
        let (mut session, calls) = open(Script {
            fail_input_dequeue: true,
            ..Default::default()
        });
        session.start().unwrap();
        assert!(matches!(
            session.dequeue_input_slot().await,
            Err(DecodeError::Codec(BridgeError::OperationFailed(_)))
        ));
        assert_eq!(session.state(), SessionState::Failed);
        drop(session);
        assert_released_once(&calls);

        let (mut session, calls) = open(Script {
            fail_queue: true,
            ..Default::default()
        });
        session.start().unwrap();
        assert!(matches!(
            session.submit_sample(0, 4, 0),
            Err(DecodeError::Codec(_))
        ));
        assert_eq!(session.state(), SessionState::Failed);

        let (mut session_b, calls_b) = open(Script {
            outputs: VecDeque::from([None]),
            ..Default::default()
        });
        session_b.start().unwrap();
        assert!(matches!(
            session_b.dequeue_output().await,
            Err(DecodeError::Codec(_))
        ));
        assert_eq!(session_b.state(), SessionState::Failed);

        session.shutdown();
        session_b.shutdown();
        assert_released_once(&calls);
        assert_released_once(&calls_b);
    }

    #[test]
    fn test_shutdown_before_drain_goes_through_failed() {
        let (mut session, calls) = open(Script::default());
        session.start().unwrap();

        session.abort();
        assert_eq!(session.state(), SessionState::Failed);
        session.shutdown();
        assert_eq!(session.state(), SessionState::Stopped);
        session.abort();
        assert_eq!(session.state(), SessionState::Stopped);
        assert_released_once(&calls);
    }

    #[test]
    fn test_missing_decoder() {
        let calls = Arc::new(Calls::default());
        let provider = FakeProvider {
            script: Script::default(),
            calls: Arc::clone(&calls),
            available: false,
        };

        let err = DecoderSession::open(&provider, &track(), Duration::from_millis(1)).unwrap_err();
        assert!(matches!(err, DecodeError::NoDecoder { mime: ref wanted } if wanted == mime::AUDIO_MPEG));
        assert_eq!(Calls::get(&calls.created), 0);
    }

    #[test]
    fn test_configure_failure_releases_decoder() {
        let calls = Arc::new(Calls::default());
        let provider = FakeProvider {
            script: Script {
                fail_configure: true,
                ..Default::default()
            },
            calls: Arc::clone(&calls),
            available: true,
        };

        let err = DecoderSession::open(&provider, &track(), Duration::from_millis(1)).unwrap_err();
        assert!(matches!(err, DecodeError::Codec(BridgeError::Unsupported(_))));
        assert_eq!(Calls::get(&calls.created), 1);
        assert_released_once(&calls);
    }
}
