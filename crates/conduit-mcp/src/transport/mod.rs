//! Transport Layer
//!
//! A [`Transport`] is a bidirectional pipe of parsed [`JsonRpcMessage`]s:
//! an inbound receive operation yielding messages in arrival order, an
//! outbound send serialized so frames never interleave, and a close that
//! drains and releases resources. Transports parse and frame; they never
//! interpret JSON-RPC semantics; correlation, dispatch, and cancellation
//! belong to the session engine.
//!
//! Three wire bindings are provided:
//! - [`stdio::StdioTransport`]: newline-delimited JSON over a byte pipe
//! - [`http::sse_client::SseClientTransport`]: HTTP POST out, SSE in
//! - [`http::streamable::StreamableClientTransport`] and
//!   [`http::streamable_server`]: Streamable HTTP on a single endpoint
//!   with session binding and resumable SSE

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use thiserror::Error;

// Layer 3: Internal module imports
use crate::protocol::{JsonRpcMessage, RequestId};

pub mod http;
pub mod sse;
pub mod stdio;

pub use sse::{SseEvent, SseParser};
pub use stdio::StdioTransport;

/// Transport-level error taxonomy
#[derive(Debug, Error)]
pub enum TransportError {
    /// The peer closed the stream or the transport was shut down
    #[error("Transport closed")]
    Closed,

    /// Underlying I/O failure
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Message could not be serialized for the wire
    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },

    /// Connection could not be established or was refused
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// HTTP-level failure (unexpected status, missing header, ...)
    #[error("HTTP error: {message}")]
    Http { message: String },

    /// A frame exceeded the configured size bound
    #[error("Message of {size} bytes exceeds limit of {max} bytes")]
    MessageTooLarge { size: usize, max: usize },

    /// Transport-level protocol violation (bad framing, bad handshake)
    #[error("Protocol error: {message}")]
    Protocol { message: String },
}

impl TransportError {
    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create an HTTP error
    pub fn http(message: impl Into<String>) -> Self {
        Self::Http {
            message: message.into(),
        }
    }

    /// Create a transport-protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }
}

/// Bidirectional message pipe between a session and its peer
///
/// All methods take `&self`; implementations use interior mutability.
/// The contract mirrors the session's concurrency model: exactly one
/// task calls `receive` (the session reader), while `send` may be called
/// from any handler task and must serialize frames internally.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Receive the next inbound message
    ///
    /// Returns `Ok(None)` on clean end-of-stream. Frames that are not
    /// valid JSON-RPC messages are skipped by bindings where noise is
    /// expected (stdio) and surfaced as errors elsewhere.
    ///
    /// # Errors
    ///
    /// Returns a `TransportError` when the connection fails mid-stream.
    async fn receive(&self) -> Result<Option<JsonRpcMessage>, TransportError>;

    /// Send one message to the peer
    ///
    /// Frames are written atomically: concurrent sends never interleave.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Closed` after `close`, or an I/O error.
    async fn send(&self, message: JsonRpcMessage) -> Result<(), TransportError>;

    /// Close the transport, draining buffered output
    ///
    /// Idempotent; subsequent `send`/`receive` calls fail with `Closed`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the final flush fails; resources are
    /// released regardless.
    async fn close(&self) -> Result<(), TransportError>;

    /// Session identifier, for session-bound transports
    fn session_id(&self) -> Option<String> {
        None
    }

    /// Defer the reply to an inbound request into out-of-band delivery
    ///
    /// Bindings with an event store (Streamable HTTP server) route the
    /// reply through the store and force the live stream to reconnect;
    /// other bindings return `false` and the reply is sent normally.
    fn defer_reply(&self, _id: &RequestId) -> bool {
        false
    }

    /// Static identifier of the binding, for logging
    fn transport_type(&self) -> &'static str;
}
