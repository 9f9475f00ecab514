//! HTTP Transport Bindings
//!
//! Shared configuration for the HTTP-based wire bindings plus the three
//! concrete pieces: the legacy HTTP+SSE client, the Streamable HTTP
//! client, and the Streamable HTTP server (an axum router).

// Layer 1: Standard library imports
use std::collections::HashSet;
use std::time::Duration;

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
use crate::protocol::constants::defaults;

pub mod auth;
pub mod event_store;
pub mod sse_client;
pub mod streamable;
pub mod streamable_server;

pub use auth::{CredentialProvider, UnauthorizedResponse};
pub use event_store::{EventStore, StoredEvent};
pub use sse_client::SseClientTransport;
pub use streamable::StreamableClientTransport;
pub use streamable_server::{StreamableHttpServer, StreamableServerConfig};

/// Reconnection policy for dropped SSE streams
///
/// The initial connection attempt is not a reconnection and does not
/// consume the retry budget; only unexpected stream terminations do.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay between reconnection attempts
    pub interval: Duration,
    /// Attempts before the transport surfaces `TransportError::Closed`
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            interval: defaults::RECONNECTION_INTERVAL,
            max_attempts: defaults::MAX_RECONNECTION_ATTEMPTS,
        }
    }
}

/// Origin allow-set for DNS-rebinding protection
///
/// Streamable HTTP servers validate the `Origin` header of every
/// request against this set; a mismatch is rejected with `403`.
/// Requests without an `Origin` header (non-browser clients) pass.
#[derive(Debug, Clone, Default)]
pub enum AllowedOrigins {
    /// Accept any origin (development setups)
    #[default]
    Any,
    /// Accept only the listed origins, compared case-insensitively
    List(HashSet<String>),
}

impl AllowedOrigins {
    /// Build an allow-set from a list of origins
    pub fn from_origins<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::List(
            origins
                .into_iter()
                .map(|origin| origin.into().to_ascii_lowercase())
                .collect(),
        )
    }

    /// Whether a request with this `Origin` header may proceed
    pub fn allows(&self, origin: Option<&str>) -> bool {
        match (self, origin) {
            (AllowedOrigins::Any, _) => true,
            // No Origin header means a non-browser client; rebinding
            // attacks come through browsers, which always send one.
            (AllowedOrigins::List(_), None) => true,
            (AllowedOrigins::List(allowed), Some(origin)) => {
                allowed.contains(&origin.to_ascii_lowercase())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_allows_everything() {
        assert!(AllowedOrigins::Any.allows(Some("http://evil.example")));
        assert!(AllowedOrigins::Any.allows(None));
    }

    #[test]
    fn list_matches_case_insensitively() {
        let origins = AllowedOrigins::from_origins(["http://localhost:8080"]);
        assert!(origins.allows(Some("http://LOCALHOST:8080")));
        assert!(!origins.allows(Some("http://rebind.example")));
        assert!(origins.allows(None));
    }
}
