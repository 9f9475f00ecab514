//! Pending Outbound Requests
//!
//! Correlation table for requests this session has issued: each entry
//! pairs a generated id with a oneshot channel the caller awaits. Ids
//! are numeric and generated monotonically, so no two in-flight
//! requests ever share one. An entry leaves the table exactly once
//! (response, error, timeout, cancellation, or session teardown), which
//! is what makes the caller's future complete exactly once.

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicI64, Ordering};

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, trace};

// Layer 3: Internal module imports
use super::SessionError;
use crate::protocol::RequestId;

/// Monotonic request-id generator
///
/// Thread-safe; ids start at 1 and never repeat within a session.
#[derive(Debug)]
pub struct RequestIdGenerator {
    counter: AtomicI64,
}

impl RequestIdGenerator {
    /// Create a generator starting at 1
    pub fn new() -> Self {
        Self {
            counter: AtomicI64::new(1),
        }
    }

    /// Produce the next unique id
    pub fn next_id(&self) -> RequestId {
        RequestId::Number(self.counter.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for RequestIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// One request awaiting its correlated reply
#[derive(Debug)]
struct PendingRequest {
    sender: oneshot::Sender<Result<Value, SessionError>>,
    method: String,
    registered_at: DateTime<Utc>,
}

/// The session-local pending-request table
#[derive(Debug)]
pub(crate) struct PendingRequests {
    requests: DashMap<RequestId, PendingRequest>,
    id_generator: RequestIdGenerator,
    max_pending: usize,
}

impl PendingRequests {
    /// Create a table bounded at `max_pending` concurrent entries
    pub fn new(max_pending: usize) -> Self {
        Self {
            requests: DashMap::new(),
            id_generator: RequestIdGenerator::new(),
            max_pending,
        }
    }

    /// Register a new outbound request
    ///
    /// Returns the generated id and the receiver the caller awaits.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::TooManyPendingRequests` at capacity.
    pub fn register(
        &self,
        method: &str,
    ) -> Result<(RequestId, oneshot::Receiver<Result<Value, SessionError>>), SessionError> {
        if self.max_pending > 0 && self.requests.len() >= self.max_pending {
            return Err(SessionError::TooManyPendingRequests {
                limit: self.max_pending,
            });
        }

        let (sender, receiver) = oneshot::channel();
        let id = self.id_generator.next_id();
        trace!(%id, method, "registered outbound request");
        self.requests.insert(
            id.clone(),
            PendingRequest {
                sender,
                method: method.to_string(),
                registered_at: Utc::now(),
            },
        );
        Ok((id, receiver))
    }

    /// Complete a pending request, removing its entry
    ///
    /// Returns `false` when the id is unknown: already completed,
    /// timed out, or never ours. Unknown ids are the caller's cue to
    /// log and discard.
    pub fn complete(&self, id: &RequestId, result: Result<Value, SessionError>) -> bool {
        let Some((_, pending)) = self.requests.remove(id) else {
            return false;
        };
        let elapsed = Utc::now().signed_duration_since(pending.registered_at);
        debug!(%id, method = %pending.method, elapsed_ms = elapsed.num_milliseconds(), "request completed");
        // A dropped receiver means the caller stopped waiting; nothing to do.
        let _ = pending.sender.send(result);
        true
    }

    /// Remove an entry without signalling the caller
    ///
    /// Used on the timeout path, where the caller resolves itself and
    /// only the table entry must go. Returns `true` when removed.
    pub fn forget(&self, id: &RequestId) -> bool {
        self.requests.remove(id).is_some()
    }

    /// Whether an id is still pending
    pub fn contains(&self, id: &RequestId) -> bool {
        self.requests.contains_key(id)
    }

    /// Number of in-flight outbound requests
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Fail every pending request, draining the table
    ///
    /// Called on session teardown so no caller waits forever.
    pub fn fail_all(&self, make_error: impl Fn() -> SessionError) {
        let ids: Vec<RequestId> = self.requests.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Some((_, pending)) = self.requests.remove(&id) {
                let _ = pending.sender.send(Err(make_error()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn generated_ids_are_unique_and_monotonic() {
        let table = PendingRequests::new(100);
        let (a, _ra) = table.register("ping").unwrap();
        let (b, _rb) = table.register("ping").unwrap();
        assert_ne!(a, b);
        match (&a, &b) {
            (RequestId::Number(x), RequestId::Number(y)) => assert!(y > x),
            other => panic!("expected numeric ids, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn complete_resolves_the_caller_exactly_once() {
        let table = PendingRequests::new(100);
        let (id, receiver) = table.register("tools/list").unwrap();

        assert!(table.complete(&id, Ok(json!({"tools": []}))));
        let result = receiver.await.unwrap().unwrap();
        assert_eq!(result, json!({"tools": []}));

        // Second completion finds nothing.
        assert!(!table.complete(&id, Ok(json!(null))));
    }

    #[tokio::test]
    async fn unknown_ids_are_reported() {
        let table = PendingRequests::new(100);
        assert!(!table.complete(&RequestId::new_number(999), Ok(json!(null))));
        assert!(!table.contains(&RequestId::new_number(999)));
    }

    #[tokio::test]
    async fn capacity_limit_is_enforced() {
        let table = PendingRequests::new(2);
        let (_a, _ra) = table.register("a").unwrap();
        let (_b, _rb) = table.register("b").unwrap();
        assert!(matches!(
            table.register("c"),
            Err(SessionError::TooManyPendingRequests { limit: 2 })
        ));
    }

    #[tokio::test]
    async fn fail_all_drains_the_table() {
        let table = PendingRequests::new(100);
        let (_a, receiver_a) = table.register("a").unwrap();
        let (_b, receiver_b) = table.register("b").unwrap();

        table.fail_all(|| SessionError::TransportClosed);
        assert_eq!(table.len(), 0);
        assert!(matches!(
            receiver_a.await.unwrap(),
            Err(SessionError::TransportClosed)
        ));
        assert!(matches!(
            receiver_b.await.unwrap(),
            Err(SessionError::TransportClosed)
        ));
    }

    #[tokio::test]
    async fn forget_leaves_the_caller_unresolved() {
        let table = PendingRequests::new(100);
        let (id, mut receiver) = table.register("slow").unwrap();
        assert!(table.forget(&id));
        // The sender is gone, so the receiver errors rather than yielding.
        assert!(receiver.try_recv().is_err());
    }
}
