//! # Sync Event Stream
//!
//! Structured events describing each cycle's outcome, consumed by the
//! excluded UI layer. The agent writes to a sink without knowing who
//! subscribes.
//!
//! ## Event Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Event Flow                                       │
//! │                                                                         │
//! │  SyncAgent cycle                                                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SyncEvent { level, message, online, records_synced, queue_depth }     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  dyn SyncEventSink                                                     │
//! │       │                                                                 │
//! │       ├── NoOpSink       (tests, headless default)                     │
//! │       └── ChannelSink    (tokio mpsc → UI collaborator)                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

// =============================================================================
// Event Level
// =============================================================================

/// Severity classification for sync events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    /// Routine progress (cycle started, records queued).
    Info,
    /// A cycle or replay completed successfully.
    Success,
    /// A failure an operator should see.
    Error,
}

impl std::fmt::Display for EventLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventLevel::Info => write!(f, "info"),
            EventLevel::Success => write!(f, "success"),
            EventLevel::Error => write!(f, "error"),
        }
    }
}

// =============================================================================
// Sync Event
// =============================================================================

/// One structured entry in the outbound event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncEvent {
    /// Severity classification.
    pub level: EventLevel,

    /// Human-readable description.
    pub message: String,

    /// When the event was produced.
    pub at: DateTime<Utc>,

    /// Connectivity at the time of the event (cycle events only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub online: Option<bool>,

    /// Records published this cycle or replay pass.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records_synced: Option<i64>,

    /// Records still awaiting publication.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_depth: Option<i64>,
}

impl SyncEvent {
    fn new(level: EventLevel, message: impl Into<String>) -> Self {
        SyncEvent {
            level,
            message: message.into(),
            at: Utc::now(),
            online: None,
            records_synced: None,
            queue_depth: None,
        }
    }

    /// Creates an info-level event.
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(EventLevel::Info, message)
    }

    /// Creates a success-level event.
    pub fn success(message: impl Into<String>) -> Self {
        Self::new(EventLevel::Success, message)
    }

    /// Creates an error-level event.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(EventLevel::Error, message)
    }

    /// Attaches cycle statistics.
    pub fn with_stats(mut self, online: bool, records_synced: i64, queue_depth: i64) -> Self {
        self.online = Some(online);
        self.records_synced = Some(records_synced);
        self.queue_depth = Some(queue_depth);
        self
    }
}

// =============================================================================
// Event Sink Trait
// =============================================================================

/// Observer seam for the outbound event stream.
///
/// Implemented by whatever hosts the agent (a channel to a UI process, a
/// log forwarder). The core emits and forgets.
pub trait SyncEventSink: Send + Sync {
    /// Delivers one event. Must not block.
    fn emit(&self, event: SyncEvent);
}

/// No-op event sink for testing and headless runs.
pub struct NoOpSink;

impl SyncEventSink for NoOpSink {
    fn emit(&self, _event: SyncEvent) {}
}

/// Event sink that forwards onto a tokio mpsc channel.
///
/// Unbounded so `emit` never blocks the sync cycle; a vanished consumer
/// just drops events on the floor.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SyncEvent>,
}

impl ChannelSink {
    /// Creates a sink and the receiving half for the subscriber.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SyncEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelSink { tx }, rx)
    }
}

impl SyncEventSink for ChannelSink {
    fn emit(&self, event: SyncEvent) {
        // Receiver gone means nobody is watching; nothing to do
        let _ = self.tx.send(event);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_constructors() {
        let event = SyncEvent::success("replayed 5 records").with_stats(true, 5, 0);
        assert_eq!(event.level, EventLevel::Success);
        assert_eq!(event.online, Some(true));
        assert_eq!(event.records_synced, Some(5));
        assert_eq!(event.queue_depth, Some(0));
    }

    #[test]
    fn test_level_serialization() {
        let json = serde_json::to_string(&EventLevel::Success).unwrap();
        assert_eq!(json, "\"success\"");

        let event = SyncEvent::info("tick");
        let json = serde_json::to_string(&event).unwrap();
        // Optional stats are omitted when unset
        assert!(!json.contains("records_synced"));
    }

    #[tokio::test]
    async fn test_channel_sink_delivers() {
        let (sink, mut rx) = ChannelSink::new();
        sink.emit(SyncEvent::info("hello"));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.message, "hello");
    }

    #[test]
    fn test_channel_sink_survives_dropped_receiver() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        // Must not panic
        sink.emit(SyncEvent::error("nobody listening"));
    }
}
