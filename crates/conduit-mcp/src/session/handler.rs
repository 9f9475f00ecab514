//! Handler Seams
//!
//! The session engine is symmetric: servers and clients both run the
//! same demultiplexing loop and differ only in the handlers they plug
//! in. A [`RequestHandler`] resolves inbound requests to results (the
//! server's method router, or the client's sampling/roots/elicitation
//! surface); notifications the session core does not consume itself
//! are forwarded to the same handler.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use serde_json::Value;

// Layer 3: Internal module imports
use super::context::RequestContext;
use super::Peer;
use crate::protocol::RpcError;

/// Dispatch target for inbound requests and notifications
///
/// `handle_request` returns the JSON result on success or an
/// [`RpcError`] that the session turns into an error response. A
/// cancelled invocation produces no response at all; handlers observe
/// cancellation through the context's token.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Handle one inbound request
    async fn handle_request(
        &self,
        method: &str,
        params: Option<Value>,
        context: RequestContext,
    ) -> Result<Value, RpcError>;

    /// Handle a notification the session core did not consume
    ///
    /// Cancellation, progress, `initialized`, and log records are
    /// routed inside the session; everything else lands here. The
    /// default implementation ignores the notification.
    async fn handle_notification(&self, method: &str, params: Option<Value>, peer: Peer) {
        let _ = (method, params, peer);
    }
}
