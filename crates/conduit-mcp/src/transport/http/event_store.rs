//! SSE Event Store
//!
//! Bounded in-memory store backing SSE resumability. Every event
//! written to a session's SSE stream is recorded here first, under a
//! per-session monotonically increasing id. A client reconnecting with
//! `Last-Event-ID: n` replays the events with id greater than `n` that
//! are still within retention, in order.
//!
//! Eviction is by capacity and by age; both bounds are configurable.

// Layer 1: Standard library imports
use std::collections::VecDeque;
use std::time::Duration;

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::trace;

// Layer 3: Internal module imports
use crate::protocol::constants::defaults;
use crate::protocol::JsonRpcMessage;

/// One stored SSE event
#[derive(Debug, Clone)]
pub struct StoredEvent {
    /// Monotonic per-session event id
    pub id: u64,
    /// The message carried by the event
    pub message: JsonRpcMessage,
    /// When the event was appended
    pub stored_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct SessionEvents {
    next_id: u64,
    events: VecDeque<StoredEvent>,
}

/// Bounded, session-keyed event store
///
/// # Examples
///
/// ```rust
/// use conduit_mcp::transport::http::EventStore;
/// use conduit_mcp::protocol::JsonRpcMessage;
///
/// let store = EventStore::with_defaults();
/// let first = store.append("session-1", JsonRpcMessage::notification("notifications/progress", None));
/// let second = store.append("session-1", JsonRpcMessage::notification("notifications/progress", None));
/// assert_eq!(store.replay_after("session-1", first).len(), 1);
/// assert_eq!(store.replay_after("session-1", second).len(), 0);
/// ```
#[derive(Debug)]
pub struct EventStore {
    sessions: DashMap<String, SessionEvents>,
    capacity: usize,
    max_age: Duration,
}

impl EventStore {
    /// Create a store with explicit bounds
    pub fn new(capacity: usize, max_age: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            capacity,
            max_age,
        }
    }

    /// Create a store with the default capacity and age bounds
    pub fn with_defaults() -> Self {
        Self::new(defaults::EVENT_STORE_CAPACITY, defaults::EVENT_STORE_MAX_AGE)
    }

    /// Append a message to a session's stream, returning its event id
    ///
    /// Ids start at 1 and increase monotonically per session.
    pub fn append(&self, session_id: &str, message: JsonRpcMessage) -> u64 {
        let mut entry = self.sessions.entry(session_id.to_string()).or_default();
        entry.next_id += 1;
        let id = entry.next_id;
        entry.events.push_back(StoredEvent {
            id,
            message,
            stored_at: Utc::now(),
        });
        Self::evict(&mut entry, self.capacity, self.max_age);
        trace!(session_id, event_id = id, "stored sse event");
        id
    }

    /// Events with id greater than `last_event_id`, oldest first
    ///
    /// Events already evicted by capacity or age are gone; the replay
    /// covers exactly what retention still holds.
    pub fn replay_after(&self, session_id: &str, last_event_id: u64) -> Vec<StoredEvent> {
        let Some(mut entry) = self.sessions.get_mut(session_id) else {
            return Vec::new();
        };
        Self::evict(&mut entry, self.capacity, self.max_age);
        entry
            .events
            .iter()
            .filter(|event| event.id > last_event_id)
            .cloned()
            .collect()
    }

    /// The most recently assigned event id for a session
    pub fn last_event_id(&self, session_id: &str) -> u64 {
        self.sessions
            .get(session_id)
            .map(|entry| entry.next_id)
            .unwrap_or(0)
    }

    /// Discard everything retained for a session
    pub fn remove_session(&self, session_id: &str) {
        self.sessions.remove(session_id);
    }

    fn evict(entry: &mut SessionEvents, capacity: usize, max_age: Duration) {
        while entry.events.len() > capacity {
            entry.events.pop_front();
        }
        let Ok(max_age) = chrono::Duration::from_std(max_age) else {
            return;
        };
        let cutoff = Utc::now() - max_age;
        while entry
            .events
            .front()
            .is_some_and(|event| event.stored_at < cutoff)
        {
            entry.events.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(n: u64) -> JsonRpcMessage {
        JsonRpcMessage::notification(
            "notifications/progress",
            Some(serde_json::json!({"progress": n})),
        )
    }

    #[test]
    fn ids_are_monotonic_per_session() {
        let store = EventStore::with_defaults();
        assert_eq!(store.append("a", note(1)), 1);
        assert_eq!(store.append("a", note(2)), 2);
        assert_eq!(store.append("b", note(1)), 1);
    }

    #[test]
    fn replay_returns_only_newer_events_in_order() {
        let store = EventStore::with_defaults();
        store.append("s", note(1));
        store.append("s", note(2));
        store.append("s", note(3));

        let replay = store.replay_after("s", 1);
        let ids: Vec<u64> = replay.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert!(store.replay_after("s", 3).is_empty());
        assert!(store.replay_after("unknown", 0).is_empty());
    }

    #[test]
    fn capacity_eviction_drops_oldest_but_keeps_ids() {
        let store = EventStore::new(2, Duration::from_secs(3600));
        store.append("s", note(1));
        store.append("s", note(2));
        store.append("s", note(3));

        let replay = store.replay_after("s", 0);
        let ids: Vec<u64> = replay.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![2, 3]);
        // The counter never rewinds even after eviction.
        assert_eq!(store.append("s", note(4)), 4);
    }

    #[test]
    fn age_eviction_drops_expired_events() {
        let store = EventStore::new(100, Duration::from_millis(0));
        store.append("s", note(1));
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(store.replay_after("s", 0).is_empty());
    }

    #[test]
    fn remove_session_clears_retention() {
        let store = EventStore::with_defaults();
        store.append("s", note(1));
        store.remove_session("s");
        assert!(store.replay_after("s", 0).is_empty());
        assert_eq!(store.last_event_id("s"), 0);
    }
}
