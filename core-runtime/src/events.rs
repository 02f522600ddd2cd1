//! # Event Bus System
//!
//! Broadcast channel of typed [`CoreEvent`]s for hosts that prefer
//! subscribing to engine activity over implementing a `StatusSink`.
//!
//! ## Overview
//!
//! ```text
//! ┌──────────────┐   emit   ┌───────────┐  subscribe  ┌────────────┐
//! │ SyncEngine   ├─────────>│ EventBus  ├────────────>│ Subscriber │
//! │ (queue ops)  │          │ (broadcast│             └────────────┘
//! └──────────────┘          │  channel) │  subscribe  ┌────────────┐
//!                           │           ├────────────>│ Subscriber │
//!                           └───────────┘             └────────────┘
//! ```
//!
//! Every status transition reported to the `StatusSink` (`syncing`,
//! `success`, `warning`, `error`, `idle`) has a matching event here.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(16);
//! let mut subscriber = bus.subscribe();
//!
//! bus.emit(CoreEvent::Sync(SyncEvent::Idle)).ok();
//! assert_eq!(subscriber.recv().await.unwrap(), CoreEvent::Sync(SyncEvent::Idle));
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events; keep reading.
//! - **`RecvError::Closed`**: the engine was dropped; stop reading.
//!
//! `emit` fails only when nobody is subscribed, which the engine ignores.

use core_async::sync::broadcast;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use core_async::sync::broadcast::error::{RecvError, SendError};
pub use core_async::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Sync operations and queue state
    Sync(SyncEvent),
    /// Backup snapshots
    Backup(BackupEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Backup(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Sync(SyncEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Backup(BackupEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Sync(SyncEvent::Completed { failures, .. }) if *failures > 0 => {
                EventSeverity::Warning
            }
            CoreEvent::Sync(SyncEvent::Completed { .. }) => EventSeverity::Info,
            CoreEvent::Backup(BackupEvent::Created { .. })
            | CoreEvent::Backup(BackupEvent::Restored { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
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
// Sync Events
// ============================================================================

/// Events emitted around queued operations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// A queued operation began executing.
    Started {
        /// Operation name (`sync`, `backup`, ...).
        operation: String,
    },
    /// A reconciliation finished; `failures > 0` means some items were skipped.
    Completed {
        operation: String,
        /// `push`, `pull` or `full`.
        direction: String,
        pushed: u64,
        pulled: u64,
        deleted_local: u64,
        deleted_remote: u64,
        failures: u64,
        /// Remote manifest was absent or unreadable and was rebuilt.
        bootstrapped: bool,
    },
    /// The operation failed as a whole.
    Failed {
        operation: String,
        message: String,
    },
    /// The queue drained; nothing is pending.
    Idle,
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::Started { .. } => "Sync operation started",
            SyncEvent::Completed { failures, .. } if *failures > 0 => {
                "Sync completed with skipped items"
            }
            SyncEvent::Completed { .. } => "Sync completed successfully",
            SyncEvent::Failed { .. } => "Sync failed",
            SyncEvent::Idle => "Sync queue idle",
        }
    }
}

// ============================================================================
// Backup Events
// ============================================================================

/// Events emitted by backup and restore operations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum BackupEvent {
    /// Snapshot uploaded.
    Created {
        key: String,
        item_count: u64,
        /// Older snapshots deleted by retention.
        pruned: u64,
    },
    /// Snapshot written back into local storage.
    Restored { key: String, item_count: u64 },
    /// Backup or restore failed.
    Failed { message: String },
}

impl BackupEvent {
    fn description(&self) -> &str {
        match self {
            BackupEvent::Created { .. } => "Backup created",
            BackupEvent::Restored { .. } => "Backup restored",
            BackupEvent::Failed { .. } => "Backup failed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus.
///
/// Cloning is cheap; clones publish into the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus buffering `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received it, or an error when
    /// nobody is subscribed.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates an independent receiver for all future events.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
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

/// A `broadcast::Receiver` with an optional predicate.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let bus = EventBus::default();
/// let backups_only = EventStream::new(bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Backup(_)));
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

    /// Only events matching `predicate` are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv); `None` when nothing is buffered.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.matches(&event) => return Some(Ok(event)),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }

    fn matches(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}
