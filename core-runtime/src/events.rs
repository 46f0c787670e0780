//! # Event Bus System
//!
//! Typed event broadcasting over `tokio::sync::broadcast`. The auth flow, the
//! catalog listing and the transfer engine publish here; front ends subscribe
//! to drive status lines and logs without being wired into each component.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     emit      ┌───────────┐
//! │ Auth Flow   ├──────────────>│           │
//! └─────────────┘               │           │
//!                               │ EventBus  │
//! ┌─────────────┐     emit      │ (broadcast│     subscribe    ┌────────────┐
//! │ Catalog     ├──────────────>│  channel) ├─────────────────>│ Subscriber │
//! └─────────────┘               │           │                  └────────────┘
//!                               │           │
//! ┌─────────────┐     emit      │           │     subscribe    ┌────────────┐
//! │ Transfers   ├──────────────>│           ├─────────────────>│ Subscriber │
//! └─────────────┘               └───────────┘                  └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
//!
//! let event_bus = EventBus::new(100);
//! let _sub = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Auth(AuthEvent::SigningIn))
//!     .ok();
//! ```
//!
//! Emitting with no subscribers returns `Err`; publishers ignore it with
//! `.ok()` since events are advisory.
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber fell `n` events behind. It can
//!   keep receiving newer events.
//! - **`RecvError::Closed`**: every sender was dropped. Treat as shutdown.
//!
//! Per-entry transfer progress also travels on a dedicated channel owned by
//! the batch (see `core_transfer::ProgressSink`). Events here carry integer
//! byte counts so `CoreEvent` stays `Eq`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
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

/// Top-level event published through the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    Auth(AuthEvent),
    Catalog(CatalogEvent),
    Transfer(TransferEvent),
}

impl CoreEvent {
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Auth(e) => e.description(),
            CoreEvent::Catalog(e) => e.description(),
            CoreEvent::Transfer(e) => e.description(),
        }
    }

    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Auth(AuthEvent::AuthError { .. }) => EventSeverity::Error,
            CoreEvent::Transfer(TransferEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Transfer(TransferEvent::BatchCompleted { failed, .. }) if *failed > 0 => {
                EventSeverity::Warning
            }
            CoreEvent::Transfer(TransferEvent::Cancelled { .. }) => EventSeverity::Warning,
            CoreEvent::Auth(AuthEvent::SignedIn { .. }) => EventSeverity::Info,
            CoreEvent::Catalog(CatalogEvent::ListingCompleted { .. }) => EventSeverity::Info,
            CoreEvent::Transfer(TransferEvent::Completed { .. }) => EventSeverity::Info,
            CoreEvent::Transfer(TransferEvent::BatchCompleted { .. }) => EventSeverity::Info,
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

// ============================================================================
// Authentication Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AuthEvent {
    /// Interactive consent flow started
    SigningIn,
    /// A credential was obtained interactively and persisted
    SignedIn {
        /// Unix timestamp (seconds)
        expires_at: i64,
    },
    SignedOut,
    TokenRefreshing,
    TokenRefreshed {
        /// Unix timestamp (seconds)
        expires_at: i64,
    },
    AuthError {
        message: String,
        recoverable: bool,
    },
}

impl AuthEvent {
    fn description(&self) -> &str {
        match self {
            AuthEvent::SigningIn => "Authorization in progress",
            AuthEvent::SignedIn { .. } => "Signed in successfully",
            AuthEvent::SignedOut => "Signed out",
            AuthEvent::TokenRefreshing => "Refreshing access token",
            AuthEvent::TokenRefreshed { .. } => "Token refreshed successfully",
            AuthEvent::AuthError { .. } => "Authorization error",
        }
    }
}

// ============================================================================
// Catalog Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum CatalogEvent {
    PageFetched { entries: usize, has_more: bool },
    ListingCompleted { total: usize },
}

impl CatalogEvent {
    fn description(&self) -> &str {
        match self {
            CatalogEvent::PageFetched { .. } => "Catalog page fetched",
            CatalogEvent::ListingCompleted { .. } => "Catalog listing completed",
        }
    }
}

// ============================================================================
// Transfer Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum TransferEvent {
    BatchStarted {
        batch_id: String,
        entries: usize,
    },
    Started {
        remote_id: String,
        /// Final file name (no directory)
        file_name: String,
    },
    Progress {
        remote_id: String,
        bytes_received: u64,
        total_bytes: Option<u64>,
    },
    Completed {
        remote_id: String,
        path: PathBuf,
    },
    Failed {
        remote_id: String,
        reason: String,
    },
    Cancelled {
        remote_id: String,
    },
    BatchCompleted {
        batch_id: String,
        succeeded: usize,
        failed: usize,
        cancelled: usize,
    },
}

impl TransferEvent {
    fn description(&self) -> &str {
        match self {
            TransferEvent::BatchStarted { .. } => "Transfer batch started",
            TransferEvent::Started { .. } => "Transfer started",
            TransferEvent::Progress { .. } => "Transfer in progress",
            TransferEvent::Completed { .. } => "Transfer completed",
            TransferEvent::Failed { .. } => "Transfer failed",
            TransferEvent::Cancelled { .. } => "Transfer cancelled",
            TransferEvent::BatchCompleted { .. } => "Transfer batch completed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Broadcast channel shared by every publisher in the process.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Returns the number of subscribers that received the event.
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

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// Receiver with an optional predicate applied before events are returned.
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

    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
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

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(remote_id: &str, bytes_received: u64) -> CoreEvent {
        CoreEvent::Transfer(TransferEvent::Progress {
            remote_id: remote_id.to_string(),
            bytes_received,
            total_bytes: Some(1024),
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
        assert!(bus.emit(CoreEvent::Auth(AuthEvent::SignedOut)).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = CoreEvent::Transfer(TransferEvent::BatchStarted {
            batch_id: "batch-1".to_string(),
            entries: 2,
        });
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Auth(_)));

        bus.emit(CoreEvent::Catalog(CatalogEvent::ListingCompleted { total: 3 }))
            .ok();
        let auth_event = CoreEvent::Auth(AuthEvent::TokenRefreshed {
            expires_at: 1_700_000_000,
        });
        bus.emit(auth_event.clone()).ok();

        assert_eq!(stream.recv().await.unwrap(), auth_event);
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.emit(progress("file-1", i * 100)).ok();
        }

        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
        // Newer events remain readable after the lag notice
        assert!(sub.recv().await.is_ok());
    }

    #[test]
    fn test_event_severity() {
        let error_event = CoreEvent::Auth(AuthEvent::AuthError {
            message: "denied".to_string(),
            recoverable: true,
        });
        assert_eq!(error_event.severity(), EventSeverity::Error);

        let partial = CoreEvent::Transfer(TransferEvent::BatchCompleted {
            batch_id: "b".to_string(),
            succeeded: 1,
            failed: 1,
            cancelled: 0,
        });
        assert_eq!(partial.severity(), EventSeverity::Warning);

        let clean = CoreEvent::Transfer(TransferEvent::BatchCompleted {
            batch_id: "b".to_string(),
            succeeded: 2,
            failed: 0,
            cancelled: 0,
        });
        assert_eq!(clean.severity(), EventSeverity::Info);

        assert_eq!(progress("x", 1).severity(), EventSeverity::Debug);
    }

    #[test]
    fn test_event_description() {
        assert_eq!(
            CoreEvent::Auth(AuthEvent::SignedIn { expires_at: 0 }).description(),
            "Signed in successfully"
        );
        assert_eq!(progress("x", 1).description(), "Transfer in progress");
    }

    #[tokio::test]
    async fn test_concurrent_publishers() {
        let bus = EventBus::new(100);
        let mut sub = bus.subscribe();

        let bus1 = bus.clone();
        let bus2 = bus.clone();

        let handle1 = tokio::spawn(async move {
            for i in 0..10 {
                bus1.emit(progress("a", i)).ok();
            }
        });
        let handle2 = tokio::spawn(async move {
            for i in 0..10 {
                bus2.emit(CoreEvent::Catalog(CatalogEvent::PageFetched {
                    entries: i,
                    has_more: true,
                }))
                .ok();
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
        let event = CoreEvent::Transfer(TransferEvent::Completed {
            remote_id: "1AbC".to_string(),
            path: PathBuf::from("/tmp/Report.pdf"),
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"Transfer\""));
        assert!(json.contains("\"event\":\"Completed\""));

        let deserialized: CoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, event);
    }
}
