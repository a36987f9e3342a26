//! Event bus for team coordination
//!
//! Pub/sub over a Tokio broadcast channel. Nothing is persisted; a
//! subscriber that falls more than the channel capacity behind sees
//! `RecvError::Lagged` and skips ahead.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::types::CoordinationEvent;

/// Default channel capacity for broadcast
pub const CHANNEL_CAPACITY: usize = 256;

/// Shared reference to EventBus
pub type SharedEventBus = Arc<EventBus>;

/// Event bus with broadcast channels
pub struct EventBus {
    sender: broadcast::Sender<CoordinationEvent>,
}

impl EventBus {
    /// Create a new event bus with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Create a shared reference to this event bus
    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Publish an event to all subscribers. Returns how many received it;
    /// having no subscribers is not an error.
    pub fn publish(&self, event: CoordinationEvent) -> usize {
        let event_type = event.event_type();
        match self.sender.send(event) {
            Ok(count) => {
                debug!(event_type, receivers = count, "Event published");
                count
            }
            Err(_) => {
                debug!(event_type, "Event published (no receivers)");
                0
            }
        }
    }

    /// Subscribe to receive events
    pub fn subscribe(&self) -> broadcast::Receiver<CoordinationEvent> {
        self.sender.subscribe()
    }

    /// Get the number of current subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Subscribe to the events passing `filter`
    pub fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver::new(self.subscribe(), filter)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Narrows a subscription to one session, one request, or some event kinds
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub session_id: Option<String>,
    pub request_id: Option<String>,
    /// `event_type()` names to keep; empty keeps every kind
    pub kinds: BTreeSet<&'static str>,
}

impl EventFilter {
    pub fn for_session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            ..Self::default()
        }
    }

    pub fn for_request(request_id: impl Into<String>) -> Self {
        Self {
            request_id: Some(request_id.into()),
            ..Self::default()
        }
    }

    pub fn with_kinds(mut self, kinds: &[&'static str]) -> Self {
        self.kinds.extend(kinds.iter().copied());
        self
    }

    /// An event that carries no session (or request) id is not excluded
    /// by that half of the filter; dispatch events only know the request.
    pub fn matches(&self, event: &CoordinationEvent) -> bool {
        let session_ok = match (&self.session_id, event.session_id()) {
            (Some(wanted), Some(actual)) => wanted == actual,
            _ => true,
        };
        let request_ok = match (&self.request_id, event.request_id()) {
            (Some(wanted), Some(actual)) => wanted == actual,
            _ => true,
        };
        session_ok
            && request_ok
            && (self.kinds.is_empty() || self.kinds.contains(event.event_type()))
    }
}

/// Receiver that yields only events passing its [`EventFilter`]
pub struct FilteredReceiver {
    receiver: broadcast::Receiver<CoordinationEvent>,
    filter: EventFilter,
}

impl FilteredReceiver {
    pub fn new(receiver: broadcast::Receiver<CoordinationEvent>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    /// Next matching event; `None` once the bus is gone.
    ///
    /// Lagging is logged and skipped rather than surfaced.
    pub async fn recv(&mut self) -> Option<CoordinationEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Filtered subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Matching events already buffered, without waiting.
    pub fn drain(&mut self) -> Vec<CoordinationEvent> {
        let mut events = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.filter.matches(&event) => events.push(event),
                Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => {}
                Err(_) => return events,
            }
        }
    }
}
