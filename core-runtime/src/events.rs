//! # Event Bus System
//!
//! Broadcasts typed progress and lifecycle events from decode operations to
//! any number of host subscribers using `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! - **Event Types**: `CoreEvent` wraps per-domain enums ([`SourceEvent`], [`ConversionEvent`])
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Wrapper for consuming events with filtering
//!
//! ```text
//! ┌──────────────┐    emit     ┌───────────┐   subscribe   ┌────────────┐
//! │ PcmDecoder A ├────────────>│           ├──────────────>│ UI layer   │
//! └──────────────┘             │ EventBus  │               └────────────┘
//! ┌──────────────┐    emit     │           │   subscribe   ┌────────────┐
//! │ PcmDecoder B ├────────────>│           ├──────────────>│ Telemetry  │
//! └──────────────┘             └───────────┘               └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{ConversionEvent, CoreEvent, EventBus};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Conversion(ConversionEvent::Progress {
//!         operation_id: "op-1".to_string(),
//!         percent: 42,
//!     }))
//!     .ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert!(matches!(event, CoreEvent::Conversion(_)));
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n` events.
//!   Progress events are the usual cause; the subscriber can keep receiving.
//! - **`RecvError::Closed`**: All senders have been dropped. This indicates shutdown.
//!
//! Emitting with no subscribers returns an error that publishers ignore.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Subscribers that can't keep up will receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum published through the event bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Media source and track selection events
    Source(SourceEvent),
    /// Decode-and-remux lifecycle events
    Conversion(ConversionEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Source(e) => e.description(),
            CoreEvent::Conversion(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Conversion(ConversionEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Conversion(ConversionEvent::Cancelled { .. }) => EventSeverity::Warning,
            CoreEvent::Conversion(ConversionEvent::Completed { .. }) => EventSeverity::Info,
            CoreEvent::Source(SourceEvent::TrackSelected { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }

    /// Operation the event belongs to.
    pub fn operation_id(&self) -> &str {
        match self {
            CoreEvent::Source(SourceEvent::Opened { operation_id, .. })
            | CoreEvent::Source(SourceEvent::TrackSelected { operation_id, .. })
            | CoreEvent::Conversion(ConversionEvent::Started { operation_id, .. })
            | CoreEvent::Conversion(ConversionEvent::Progress { operation_id, .. })
            | CoreEvent::Conversion(ConversionEvent::Completed { operation_id, .. })
            | CoreEvent::Conversion(ConversionEvent::Cancelled { operation_id })
            | CoreEvent::Conversion(ConversionEvent::Failed { operation_id, .. }) => operation_id,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Source Events
// ============================================================================

/// Events raised while opening a source and choosing its audio track.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SourceEvent {
    /// The container was probed successfully.
    Opened {
        operation_id: String,
        /// Redacted description of the source (file name or "memory buffer").
        source: String,
        track_count: usize,
    },
    /// An audio track was chosen for decoding.
    TrackSelected {
        operation_id: String,
        track_index: usize,
        mime_type: String,
        sample_rate: u32,
        channel_count: u16,
        /// Track duration in microseconds, when the container declares one.
        duration_us: Option<i64>,
    },
}

impl SourceEvent {
    fn description(&self) -> &str {
        match self {
            SourceEvent::Opened { .. } => "Media source opened",
            SourceEvent::TrackSelected { .. } => "Audio track selected",
        }
    }
}

// ============================================================================
// Conversion Events
// ============================================================================

/// Lifecycle of one decode-and-remux operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ConversionEvent {
    /// Operation accepted and about to open its source.
    Started {
        operation_id: String,
        source: String,
    },
    /// Decoded position advanced past another whole percent of the track.
    Progress {
        operation_id: String,
        /// Progress percentage (0-100).
        percent: u8,
    },
    /// PCM fully drained and, for WAV operations, the container written.
    Completed {
        operation_id: String,
        /// Bytes of PCM produced.
        pcm_bytes: u64,
        /// Wall-clock time spent, in milliseconds.
        elapsed_ms: u64,
    },
    /// Cancellation was observed; no output was written.
    Cancelled { operation_id: String },
    /// Operation stopped with an error.
    Failed {
        operation_id: String,
        /// Stable error kind, e.g. `"stall_timeout"`.
        kind: String,
        message: String,
    },
}

impl ConversionEvent {
    fn description(&self) -> &str {
        match self {
            ConversionEvent::Started { .. } => "Conversion started",
            ConversionEvent::Progress { .. } => "Conversion in progress",
            ConversionEvent::Completed { .. } => "Conversion completed successfully",
            ConversionEvent::Cancelled { .. } => "Conversion cancelled",
            ConversionEvent::Failed { .. } => "Conversion failed",
        }
    }

    /// Whether no further events follow for this operation.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConversionEvent::Completed { .. }
                | ConversionEvent::Cancelled { .. }
                | ConversionEvent::Failed { .. }
        )
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for broadcasting events to multiple subscribers.
///
/// Cloning the bus is cheap; every clone publishes into the same channel.
///
/// # Example
///
/// ```rust
/// use core_runtime::events::{ConversionEvent, CoreEvent, EventBus};
///
/// let event_bus = EventBus::new(100);
/// let mut subscriber = event_bus.subscribe();
///
/// let event = CoreEvent::Conversion(ConversionEvent::Cancelled {
///     operation_id: "op-1".to_string(),
/// });
/// assert_eq!(event_bus.emit(event).ok(), Some(1));
/// ```
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// When a subscriber falls behind by more than `capacity` events it
    /// receives `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new event bus with the default buffer size.
    #[allow(clippy::should_implement_trait)]
    pub fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    ///
    /// ```rust
    /// use core_runtime::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.subscriber_count(), 0);
    ///
    /// let _subscriber = event_bus.subscribe();
    /// assert_eq!(event_bus.subscriber_count(), 1);
    /// ```
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
///
/// # Example
///
/// ```rust
/// use core_runtime::events::{EventBus, EventSeverity, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let failures = EventStream::new(event_bus.subscribe())
///     .filter(|event| event.severity() >= EventSeverity::Warning);
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    /// Creates a new event stream from a receiver.
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Adds a filter function to this stream.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Restricts the stream to events of one operation.
    pub fn for_operation(self, operation_id: impl Into<String>) -> Self {
        let operation_id = operation_id.into();
        self.filter(move |event| event.operation_id() == operation_id)
    }

    /// Receives the next event that passes the filter (if any).
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;

            let Some(filter) = &self.filter else {
                return Ok(event);
            };

            if filter(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    let Some(filter) = &self.filter else {
                        return Some(Ok(event));
                    };

                    if filter(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(operation_id: &str, percent: u8) -> CoreEvent {
        CoreEvent::Conversion(ConversionEvent::Progress {
            operation_id: operation_id.to_string(),
            percent,
        })
    }

    #[tokio::test]
    async fn test_event_bus_subscription() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
        let _sub1 = bus.subscribe();
        let _sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(progress("op", 1)).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = CoreEvent::Conversion(ConversionEvent::Started {
            operation_id: "op-1".to_string(),
            source: "song.flac".to_string(),
        });
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Source(_)));

        bus.emit(progress("op-1", 10)).ok();
        let selected = CoreEvent::Source(SourceEvent::TrackSelected {
            operation_id: "op-1".to_string(),
            track_index: 1,
            mime_type: "audio/flac".to_string(),
            sample_rate: 44_100,
            channel_count: 2,
            duration_us: Some(1_000_000),
        });
        bus.emit(selected.clone()).ok();

        assert_eq!(stream.recv().await.unwrap(), selected);
    }

    #[tokio::test]
    async fn test_stream_for_operation() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe()).for_operation("op-2");

        bus.emit(progress("op-1", 10)).ok();
        bus.emit(progress("op-2", 20)).ok();

        assert_eq!(stream.recv().await.unwrap(), progress("op-2", 20));
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.emit(progress("op", i)).ok();
        }

        let result = sub.recv().await;
        assert!(matches!(result, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_event_severity() {
        let failed = CoreEvent::Conversion(ConversionEvent::Failed {
            operation_id: "op".to_string(),
            kind: "stall_timeout".to_string(),
            message: "stalled".to_string(),
        });
        assert_eq!(failed.severity(), EventSeverity::Error);

        let cancelled = CoreEvent::Conversion(ConversionEvent::Cancelled {
            operation_id: "op".to_string(),
        });
        assert_eq!(cancelled.severity(), EventSeverity::Warning);
        assert_eq!(progress("op", 3).severity(), EventSeverity::Debug);
    }

    #[test]
    fn test_terminal_events() {
        assert!(!ConversionEvent::Started {
            operation_id: "op".to_string(),
            source: "memory buffer".to_string(),
        }
        .is_terminal());
        assert!(ConversionEvent::Completed {
            operation_id: "op".to_string(),
            pcm_bytes: 4,
            elapsed_ms: 1,
        }
        .is_terminal());
    }

    #[test]
    fn test_event_description() {
        let event = CoreEvent::Conversion(ConversionEvent::Cancelled {
            operation_id: "op".to_string(),
        });
        assert_eq!(event.description(), "Conversion cancelled");
        assert_eq!(event.operation_id(), "op");
    }

    #[tokio::test]
    async fn test_concurrent_publishers() {
        let bus = EventBus::new(100);
        let mut sub = bus.subscribe();

        let bus1 = bus.clone();
        let bus2 = bus.clone();

        let handle1 = tokio::spawn(async move {
            for i in 0..10 {
                bus1.emit(progress("op-1", i)).ok();
            }
        });
        let handle2 = tokio::spawn(async move {
            for i in 0..10 {
                bus2.emit(progress("op-2", i)).ok();
            }
        });

        handle1.await.ok();
        handle2.await.ok();

        let mut count = 0;
        while sub.try_recv().is_ok() {
            count += 1;
        }
        assert_eq!(count, 20);
    }

    #[test]
    fn test_event_serialization() {
        let event = CoreEvent::Conversion(ConversionEvent::Failed {
            operation_id: "op-123".to_string(),
            kind: "no_decoder".to_string(),
            message: "No decoder available for audio/x-unknown".to_string(),
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"Conversion\""));
        assert!(json.contains("\"event\":\"Failed\""));

        let deserialized: CoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, event);
    }
}
