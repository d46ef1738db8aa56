//! # Event Bus System
//!
//! Broadcasts typed events from the route tracker core using
//! `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! The route state manager notifies its synchronous observers inline with
//! every mutation. The event bus is the asynchronous side channel: the
//! service layer forwards route changes, sync cycle progress and
//! connectivity transitions onto it for consumers that live on other tasks
//! (UI bridges, log shippers, tests).
//!
//! ```text
//! ┌───────────────┐   emit   ┌───────────┐  subscribe  ┌────────────┐
//! │ Route manager ├─────────>│           ├────────────>│ Subscriber │
//! └───────────────┘          │ EventBus  │             └────────────┘
//! ┌───────────────┐   emit   │           │  subscribe  ┌────────────┐
//! │ Orchestrator  ├─────────>│           ├────────────>│ Subscriber │
//! └───────────────┘          └───────────┘             └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, RouteEvent};
//!
//! let bus = EventBus::new(32);
//! let mut rx = bus.subscribe();
//! bus.emit(CoreEvent::Routes(RouteEvent::Added { route_id: 18 })).ok();
//! assert!(rx.try_recv().is_ok());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast::{
    self,
    error::{RecvError, SendError},
    Receiver,
};

/// Default number of buffered events per subscriber
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    Routes(RouteEvent),
    Sync(SyncEvent),
    Connectivity(ConnectivityEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Routes(e) => e.description(),
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Connectivity(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Sync(SyncEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Sync(SyncEvent::Completed { failed, .. }) if *failed > 0 => {
                EventSeverity::Warning
            }
            CoreEvent::Connectivity(ConnectivityEvent::ApiStatusChanged { status })
                if status == "error" =>
            {
                EventSeverity::Warning
            }
            CoreEvent::Sync(SyncEvent::Completed { .. })
            | CoreEvent::Connectivity(_)
            | CoreEvent::Routes(RouteEvent::Replaced { .. }) => EventSeverity::Info,
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
// Route Events
// ============================================================================

/// Changes to the local route collection and pending-change queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum RouteEvent {
    Added { route_id: i64 },
    Updated { route_id: i64 },
    Deleted { route_id: i64 },
    /// The whole collection was overwritten (remote refresh, restore, reset).
    Replaced { count: usize },
    /// Pending changes were cleared after a confirmed sync.
    PendingCleared { count: usize },
    /// Expired pending changes were dropped by the maintenance sweep.
    PendingExpired { count: usize },
}

impl RouteEvent {
    fn description(&self) -> &str {
        match self {
            RouteEvent::Added { .. } => "Route added",
            RouteEvent::Updated { .. } => "Route updated",
            RouteEvent::Deleted { .. } => "Route deleted",
            RouteEvent::Replaced { .. } => "Routes replaced",
            RouteEvent::PendingCleared { .. } => "Pending changes cleared",
            RouteEvent::PendingExpired { .. } => "Expired pending changes purged",
        }
    }
}

// ============================================================================
// Sync Events
// ============================================================================

/// Events emitted while pushing pending changes to the spreadsheet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    Started {
        cycle_id: String,
        pending: usize,
    },
    Progress {
        cycle_id: String,
        processed: usize,
        total: usize,
        /// Progress percentage (0-100).
        percent: u8,
    },
    Completed {
        cycle_id: String,
        succeeded: usize,
        failed: usize,
        duration_ms: u64,
    },
    Failed {
        cycle_id: String,
        message: String,
    },
    /// The full collection was fetched from the spreadsheet.
    Reloaded {
        count: usize,
    },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::Started { .. } => "Sync started",
            SyncEvent::Progress { .. } => "Sync in progress",
            SyncEvent::Completed { .. } => "Sync completed",
            SyncEvent::Failed { .. } => "Sync failed",
            SyncEvent::Reloaded { .. } => "Routes reloaded from sheet",
        }
    }
}

// ============================================================================
// Connectivity Events
// ============================================================================

/// Transitions of the connectivity state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ConnectivityEvent {
    /// Outcome of the last remote call changed (`online`, `offline`, `error`).
    ApiStatusChanged { status: String },
    OfflineModeChanged { offline: bool },
    NetworkChanged { online: bool },
}

impl ConnectivityEvent {
    fn description(&self) -> &str {
        match self {
            ConnectivityEvent::ApiStatusChanged { .. } => "API status changed",
            ConnectivityEvent::OfflineModeChanged { .. } => "Offline mode changed",
            ConnectivityEvent::NetworkChanged { .. } => "Network availability changed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central broadcast channel for [`CoreEvent`]s.
///
/// Cloning the bus yields another handle to the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// A subscriber that falls behind by more than `capacity` events receives
    /// `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
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

/// A `broadcast::Receiver` with optional filtering.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let bus = EventBus::new(16);
/// let sync_only = EventStream::new(bus.subscribe())
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

    /// Only events matching `predicate` will be returned by `recv()`.
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

    /// Receives the next event that passes the filter (if any).
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no matching events are currently available.
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
