//! Task Store Collaborator
//!
//! Optional out-of-band storage for deferred tool results. When a
//! filter enables polling on a call, the result is written here under
//! the request id with a retention window, and the `tasks` capability
//! is advertised at initialize time. The store contract is external:
//! hosts may plug a distributed cache; [`InMemoryTaskStore`] is the
//! bounded in-process default.

// Layer 1: Standard library imports
use std::time::Duration;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::trace;

// Layer 3: Internal module imports
use crate::protocol::CallToolResult;

/// Deferred-result storage contract
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Store a result under a task id with a retention window
    async fn put(&self, id: &str, result: CallToolResult, retention: Duration);

    /// Fetch a stored result, if present and unexpired
    async fn get(&self, id: &str) -> Option<CallToolResult>;

    /// Drop a stored result; returns whether one existed
    async fn cancel(&self, id: &str) -> bool;

    /// Ids of the currently retained results
    async fn list(&self) -> Vec<String>;
}

#[derive(Debug, Clone)]
struct StoredTask {
    result: CallToolResult,
    expires_at: DateTime<Utc>,
}

impl StoredTask {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// In-process task store with per-entry retention
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    entries: DashMap<String, StoredTask>,
}

impl InMemoryTaskStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn sweep(&self) {
        let now = Utc::now();
        self.entries.retain(|_, task| !task.is_expired(now));
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn put(&self, id: &str, result: CallToolResult, retention: Duration) {
        let retention = chrono::Duration::from_std(retention)
            .unwrap_or_else(|_| chrono::Duration::days(1));
        trace!(id, "task result stored");
        self.entries.insert(
            id.to_string(),
            StoredTask {
                result,
                expires_at: Utc::now() + retention,
            },
        );
        self.sweep();
    }

    async fn get(&self, id: &str) -> Option<CallToolResult> {
        let entry = self.entries.get(id)?;
        if entry.is_expired(Utc::now()) {
            drop(entry);
            self.entries.remove(id);
            return None;
        }
        Some(entry.result.clone())
    }

    async fn cancel(&self, id: &str) -> bool {
        self.entries.remove(id).is_some()
    }

    async fn list(&self) -> Vec<String> {
        self.sweep();
        self.entries.iter().map(|e| e.key().clone()).collect()
    }
}
