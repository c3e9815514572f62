//! # Event Bus System
//!
//! Typed notifications from the offline core to whoever is listening (the UI
//! shell, diagnostics, tests), carried over `tokio::sync::broadcast`.
//!
//! ```text
//! SyncEngine ──────┐
//! AudioCacheGateway├── emit ──> EventBus ── subscribe ──> UI / diagnostics
//! NetworkStatus ───┘
//! ```
//!
//! Emitting never blocks and never fails the operation that emits: a send
//! with no subscribers is simply dropped.
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, NetworkEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(16);
//! let mut rx = bus.subscribe();
//! bus.emit(CoreEvent::Network(NetworkEvent::StatusChanged { online: false, slow: false }))
//!     .ok();
//! assert!(matches!(rx.recv().await, Ok(CoreEvent::Network(_))));
//! # }
//! ```
//!
//! Slow subscribers receive `RecvError::Lagged(n)` and keep going; events are
//! advisory, durable state lives in the local store and the sync state.

use core_async::sync::broadcast::{
    self,
    error::{RecvError, SendError},
    Receiver,
};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    Sync(SyncEvent),
    Network(NetworkEvent),
    Cache(CacheEvent),
    Library(LibraryEvent),
}

impl CoreEvent {
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Network(e) => e.description(),
            CoreEvent::Cache(e) => e.description(),
            CoreEvent::Library(e) => e.description(),
        }
    }

    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Sync(SyncEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Sync(SyncEvent::Partial { .. }) => EventSeverity::Warning,
            CoreEvent::Cache(CacheEvent::AudioFetchFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Network(NetworkEvent::StatusChanged { online: false, .. }) => {
                EventSeverity::Warning
            }
            CoreEvent::Sync(SyncEvent::Completed { .. })
            | CoreEvent::Library(LibraryEvent::CacheCleared)
            | CoreEvent::Network(_) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

/// Lifecycle of one sync run. `run_id` ties the events of a run together.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    Started {
        run_id: String,
        /// `cold_start`, `background` or `manual`.
        trigger: String,
    },
    Completed {
        run_id: String,
        songs: u64,
        setlist_items: u64,
        duration_ms: u64,
    },
    /// Songs were committed but a later stage failed.
    Partial {
        run_id: String,
        songs: u64,
        reason: String,
    },
    Failed {
        run_id: String,
        /// Classified failure kind, e.g. `offline` or `timeout`.
        kind: String,
        message: String,
    },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::Started { .. } => "Sync started",
            SyncEvent::Completed { .. } => "Sync completed",
            SyncEvent::Partial { .. } => "Sync partially completed",
            SyncEvent::Failed { .. } => "Sync failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum NetworkEvent {
    /// Emitted only when `online` or `slow` actually changed.
    StatusChanged { online: bool, slow: bool },
}

impl NetworkEvent {
    fn description(&self) -> &str {
        match self {
            NetworkEvent::StatusChanged { online: false, .. } => "Network went offline",
            NetworkEvent::StatusChanged { slow: true, .. } => "Network online but slow",
            NetworkEvent::StatusChanged { .. } => "Network online",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum CacheEvent {
    AudioCached { song_id: String, bytes: u64 },
    AudioEvicted { song_id: String, bytes: u64 },
    AudioFetchFailed { song_id: String, reason: String },
}

impl CacheEvent {
    fn description(&self) -> &str {
        match self {
            CacheEvent::AudioCached { .. } => "Audio cached",
            CacheEvent::AudioEvicted { .. } => "Audio evicted",
            CacheEvent::AudioFetchFailed { .. } => "Audio unavailable",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum LibraryEvent {
    /// A setlist record was rewritten by a user edit.
    SetlistUpdated { setlist_id: String, items: u64 },
    /// Every local table was wiped.
    CacheCleared,
}

impl LibraryEvent {
    fn description(&self) -> &str {
        match self {
            LibraryEvent::SetlistUpdated { .. } => "Setlist updated",
            LibraryEvent::CacheCleared => "Offline cache cleared",
        }
    }
}

/// Broadcast hub shared by every component. Cloning is cheap.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// `capacity` bounds how far a subscriber may fall behind before it
    /// starts seeing `Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Returns the number of receivers, or an error when nobody listens.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// Receiver with an optional predicate.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let bus = EventBus::default();
/// let syncs_only = EventStream::new(bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Sync(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Next event passing the filter. Lag is reported, not skipped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Non-blocking variant; `None` when nothing matching is queued.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.accepts(&event) => return Some(Ok(event)),
                Ok(_) => continue,
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

#[cfg(test)]
mod tests {
    use super::*;

    fn started(run_id: &str) -> CoreEvent {
        CoreEvent::Sync(SyncEvent::Started {
            run_id: run_id.to_string(),
            trigger: "manual".to_string(),
        })
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_an_error_not_a_panic() {
        let bus = EventBus::new(8);
        assert!(bus.emit(started("r1")).is_err());
    }

    #[tokio::test]
    async fn test_every_subscriber_receives_event() {
        let bus = EventBus::new(8);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        assert_eq!(bus.emit(started("r1")).unwrap(), 2);
        assert_eq!(a.recv().await.unwrap(), started("r1"));
        assert_eq!(b.recv().await.unwrap(), started("r1"));
    }

    #[tokio::test]
    async fn test_stream_filter_skips_other_domains() {
        let bus = EventBus::new(8);
        let mut stream =
            EventStream::new(bus.subscribe()).filter(|e| matches!(e, CoreEvent::Cache(_)));

        bus.emit(started("r1")).unwrap();
        bus.emit(CoreEvent::Cache(CacheEvent::AudioCached {
            song_id: "s1".to_string(),
            bytes: 10,
        }))
        .unwrap();

        let event = stream.recv().await.unwrap();
        assert!(matches!(event, CoreEvent::Cache(CacheEvent::AudioCached { .. })));
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_lagged_subscriber_is_told() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for i in 0..5 {
            bus.emit(started(&format!("r{}", i))).unwrap();
        }
        assert!(matches!(rx.recv().await, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_severity_and_description() {
        let failed = CoreEvent::Sync(SyncEvent::Failed {
            run_id: "r".to_string(),
            kind: "timeout".to_string(),
            message: "songs request timed out".to_string(),
        });
        assert_eq!(failed.severity(), EventSeverity::Error);
        assert_eq!(failed.description(), "Sync failed");

        let offline = CoreEvent::Network(NetworkEvent::StatusChanged {
            online: false,
            slow: false,
        });
        assert_eq!(offline.severity(), EventSeverity::Warning);
        assert_eq!(offline.description(), "Network went offline");

        let cleared = CoreEvent::Library(LibraryEvent::CacheCleared);
        assert_eq!(cleared.severity(), EventSeverity::Info);
    }

    #[test]
    fn test_serialized_shape() {
        let event = CoreEvent::Cache(CacheEvent::AudioEvicted {
            song_id: "s9".to_string(),
            bytes: 2048,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "Cache");
        assert_eq!(json["payload"]["event"], "AudioEvicted");
        assert_eq!(json["payload"]["song_id"], "s9");

        let back: CoreEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
