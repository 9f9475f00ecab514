//! Streamable HTTP Server Binding
//!
//! An axum router serving the single-endpoint MCP binding:
//!
//! - `POST /mcp`: one JSON-RPC message in; requests answer
//!   `200 application/json` with the correlated response, notifications
//!   and responses answer `202 Accepted`
//! - `GET /mcp`: the unsolicited server→client SSE stream, resumable
//!   with `Last-Event-ID` from the session's event store
//! - `DELETE /mcp`: terminates the session
//!
//! The first response to a session-less `initialize` carries a fresh
//! `Mcp-Session-Id`; every subsequent call must echo it. All handlers
//! validate the `Origin` header against the configured allow-set and
//! reject mismatches with `403` (DNS-rebinding protection).
//!
//! Hosting is the embedder's job: this module hands back a `Router`,
//! and binding listeners or TLS is done around it.

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use dashmap::{DashMap, DashSet};
use futures::StreamExt;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use uuid::Uuid;

// Layer 3: Internal module imports
use super::event_store::EventStore;
use super::AllowedOrigins;
use crate::protocol::constants::{headers, methods};
use crate::protocol::{
    CancelledNotification, ErrorObject, JsonRpcMessage, JsonRpcMessageTrait, RequestId, RpcError,
};
use crate::transport::{Transport, TransportError};

/// Configuration for the Streamable HTTP server binding
#[derive(Debug, Clone)]
pub struct StreamableServerConfig {
    /// Origin allow-set; mismatches are rejected with 403
    pub allowed_origins: AllowedOrigins,
    /// Events retained per session for resumability
    pub event_store_capacity: usize,
    /// Age bound on retained events
    pub event_store_max_age: Duration,
}

impl Default for StreamableServerConfig {
    fn default() -> Self {
        use crate::protocol::constants::defaults;
        Self {
            allowed_origins: AllowedOrigins::Any,
            event_store_capacity: defaults::EVENT_STORE_CAPACITY,
            event_store_max_age: defaults::EVENT_STORE_MAX_AGE,
        }
    }
}

/// How a pending POST resolves
enum PostReply {
    /// The session answered; relay the message as `application/json`
    Replied(Box<JsonRpcMessage>),
    /// The reply was routed through the event store (polling)
    Deferred,
    /// The request was cancelled; no response will ever exist
    Cancelled,
}

/// Per-session plumbing between the HTTP handlers and the transport
struct SessionEndpoint {
    session_id: String,
    inbound: mpsc::Sender<JsonRpcMessage>,
    pending_posts: DashMap<RequestId, oneshot::Sender<PostReply>>,
    deferred: DashSet<RequestId>,
    /// Writer half of the currently open GET stream, if any
    live_stream: std::sync::Mutex<Option<mpsc::Sender<(u64, JsonRpcMessage)>>>,
    /// Cancelled when the session is terminated (DELETE or shutdown)
    terminated: CancellationToken,
}

impl SessionEndpoint {
    /// Drop the live GET stream, forcing the client to reconnect
    fn close_live_stream(&self) {
        if let Ok(mut guard) = self.live_stream.lock() {
            guard.take();
        }
    }

    fn set_live_stream(&self, sender: mpsc::Sender<(u64, JsonRpcMessage)>) {
        if let Ok(mut guard) = self.live_stream.lock() {
            *guard = Some(sender);
        }
    }

    fn live_sender(&self) -> Option<mpsc::Sender<(u64, JsonRpcMessage)>> {
        self.live_stream.lock().ok().and_then(|guard| guard.clone())
    }
}

/// Server-side transport for one Streamable HTTP session
///
/// Inbound messages arrive from the POST handler; outbound replies are
/// routed back to the awaiting POST, while notifications and
/// server-initiated requests flow through the event store onto the GET
/// stream.
pub struct HttpServerTransport {
    endpoint: Arc<SessionEndpoint>,
    inbound: Mutex<mpsc::Receiver<JsonRpcMessage>>,
    event_store: Arc<EventStore>,
    closed: AtomicBool,
}

#[async_trait]
impl Transport for HttpServerTransport {
    async fn receive(&self) -> Result<Option<JsonRpcMessage>, TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let mut inbound = self.inbound.lock().await;
        tokio::select! {
            _ = self.endpoint.terminated.cancelled() => Ok(None),
            message = inbound.recv() => Ok(message),
        }
    }

    async fn send(&self, message: JsonRpcMessage) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let endpoint = &self.endpoint;

        // Replies to POSTed requests go back on the POST connection,
        // unless the reply was deferred into the event store.
        if message.is_reply() {
            if let Some(id) = message.id().cloned() {
                if let Some((_, waiter)) = endpoint.pending_posts.remove(&id) {
                    if endpoint.deferred.remove(&id).is_some() {
                        let event_id = self
                            .event_store
                            .append(&endpoint.session_id, message.clone());
                        trace!(event_id, "deferred reply stored");
                        endpoint.close_live_stream();
                        let _ = waiter.send(PostReply::Deferred);
                    } else {
                        let _ = waiter.send(PostReply::Replied(Box::new(message)));
                    }
                    return Ok(());
                }
            }
        }

        // Everything else is an unsolicited server→client message.
        let event_id = self.event_store.append(&endpoint.session_id, message.clone());
        if let Some(live) = endpoint.live_sender() {
            if live.send((event_id, message)).await.is_err() {
                trace!("live sse stream gone; event retained for replay");
            }
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        self.endpoint.close_live_stream();
        Ok(())
    }

    fn session_id(&self) -> Option<String> {
        Some(self.endpoint.session_id.clone())
    }

    fn defer_reply(&self, id: &RequestId) -> bool {
        self.endpoint.deferred.insert(id.clone());
        true
    }

    fn transport_type(&self) -> &'static str {
        "streamable-http-server"
    }
}

/// Callback invoked with the transport of every newly created session
pub type SessionCallback = Box<dyn Fn(Arc<HttpServerTransport>) + Send + Sync>;

/// The Streamable HTTP server: session registry + axum handlers
pub struct StreamableHttpServer {
    sessions: DashMap<String, Arc<SessionEndpoint>>,
    event_store: Arc<EventStore>,
    config: StreamableServerConfig,
    on_session: SessionCallback,
}

impl StreamableHttpServer {
    /// Create a server; `on_session` receives the transport of every
    /// session created by an `initialize` POST
    pub fn new(config: StreamableServerConfig, on_session: SessionCallback) -> Arc<Self> {
        let event_store = Arc::new(EventStore::new(
            config.event_store_capacity,
            config.event_store_max_age,
        ));
        Arc::new(Self {
            sessions: DashMap::new(),
            event_store,
            config,
            on_session,
        })
    }

    /// The axum router serving the binding at `/mcp`
    pub fn router(self: Arc<Self>) -> Router {
        self.router_at("/mcp")
    }

    /// The axum router serving the binding at a custom path
    pub fn router_at(self: Arc<Self>, path: &str) -> Router {
        Router::new()
            .route(
                path,
                post(handle_post).get(handle_get).delete(handle_delete),
            )
            .with_state(self)
    }

    /// Ids of the currently live sessions
    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    /// The event store backing SSE resumability
    pub fn event_store(&self) -> &Arc<EventStore> {
        &self.event_store
    }

    fn origin_allowed(&self, headers: &HeaderMap) -> bool {
        let origin = headers
            .get(axum::http::header::ORIGIN)
            .and_then(|v| v.to_str().ok());
        self.config.allowed_origins.allows(origin)
    }

    fn session_header(headers: &HeaderMap) -> Option<String> {
        headers
            .get(headers::MCP_SESSION_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    /// Create a session and hand its transport to the host
    fn create_session(&self) -> Arc<SessionEndpoint> {
        let session_id = Uuid::new_v4().to_string();
        let (inbound_tx, inbound_rx) = mpsc::channel(64);
        let endpoint = Arc::new(SessionEndpoint {
            session_id: session_id.clone(),
            inbound: inbound_tx,
            pending_posts: DashMap::new(),
            deferred: DashSet::new(),
            live_stream: std::sync::Mutex::new(None),
            terminated: CancellationToken::new(),
        });
        self.sessions.insert(session_id.clone(), Arc::clone(&endpoint));

        let transport = Arc::new(HttpServerTransport {
            endpoint: Arc::clone(&endpoint),
            inbound: Mutex::new(inbound_rx),
            event_store: Arc::clone(&self.event_store),
            closed: AtomicBool::new(false),
        });
        debug!(%session_id, "streamable session created");
        (self.on_session)(transport);
        endpoint
    }

    fn remove_session(&self, session_id: &str) {
        if let Some((_, endpoint)) = self.sessions.remove(session_id) {
            endpoint.terminated.cancel();
            endpoint.close_live_stream();
            self.event_store.remove_session(session_id);
            debug!(session_id, "streamable session terminated");
        }
    }
}

fn rpc_error_response(status: StatusCode, error: RpcError) -> Response {
    let body = JsonRpcMessage::error(ErrorObject::from(error), None)
        .to_json()
        .unwrap_or_else(|_| "{}".to_string());
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response()
}

fn is_initialize(message: &JsonRpcMessage) -> bool {
    message.method() == Some(methods::INITIALIZE) && matches!(message, JsonRpcMessage::Request(_))
}

async fn handle_post(
    State(server): State<Arc<StreamableHttpServer>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    if !server.origin_allowed(&headers) {
        return StatusCode::FORBIDDEN.into_response();
    }

    let message = match JsonRpcMessage::from_json(&body) {
        Ok(message) => message,
        Err(error) => {
            return rpc_error_response(
                StatusCode::BAD_REQUEST,
                RpcError::parse_error(error.to_string()),
            )
        }
    };

    let endpoint = match StreamableHttpServer::session_header(&headers) {
        Some(id) => match server.sessions.get(&id) {
            Some(endpoint) => Arc::clone(endpoint.value()),
            None => return StatusCode::NOT_FOUND.into_response(),
        },
        None if is_initialize(&message) => server.create_session(),
        None => {
            return rpc_error_response(
                StatusCode::BAD_REQUEST,
                RpcError::invalid_request("missing Mcp-Session-Id header"),
            )
        }
    };

    let session_header = [(
        axum::http::HeaderName::from_static("mcp-session-id"),
        endpoint.session_id.clone(),
    )];

    match message {
        JsonRpcMessage::Request(request) => {
            let (reply_tx, reply_rx) = oneshot::channel();
            endpoint
                .pending_posts
                .insert(request.id.clone(), reply_tx);

            if endpoint
                .inbound
                .send(JsonRpcMessage::Request(request.clone()))
                .await
                .is_err()
            {
                endpoint.pending_posts.remove(&request.id);
                return StatusCode::NOT_FOUND.into_response();
            }

            match reply_rx.await {
                Ok(PostReply::Replied(reply)) => {
                    let body = reply.to_json().unwrap_or_else(|_| "{}".to_string());
                    (
                        StatusCode::OK,
                        session_header,
                        [(axum::http::header::CONTENT_TYPE, "application/json")],
                        body,
                    )
                        .into_response()
                }
                Ok(PostReply::Deferred) | Ok(PostReply::Cancelled) => {
                    (StatusCode::ACCEPTED, session_header).into_response()
                }
                Err(_) => {
                    warn!("session dropped while a POST was pending");
                    StatusCode::INTERNAL_SERVER_ERROR.into_response()
                }
            }
        }
        other => {
            // Cancellations resolve the matching pending POST here: a
            // cancelled request never gets a response, and the POST that
            // carried it must not hang.
            if other.method() == Some(methods::CANCELLED) {
                if let JsonRpcMessage::Notification(n) = &other {
                    if let Some(params) = &n.params {
                        if let Ok(cancel) =
                            serde_json::from_value::<CancelledNotification>(params.clone())
                        {
                            if let Some((_, waiter)) =
                                endpoint.pending_posts.remove(&cancel.request_id)
                            {
                                let _ = waiter.send(PostReply::Cancelled);
                            }
                        }
                    }
                }
            }
            if endpoint.inbound.send(other).await.is_err() {
                return StatusCode::NOT_FOUND.into_response();
            }
            (StatusCode::ACCEPTED, session_header).into_response()
        }
    }
}

async fn handle_get(
    State(server): State<Arc<StreamableHttpServer>>,
    headers: HeaderMap,
) -> Response {
    if !server.origin_allowed(&headers) {
        return StatusCode::FORBIDDEN.into_response();
    }
    let Some(session_id) = StreamableHttpServer::session_header(&headers) else {
        return rpc_error_response(
            StatusCode::BAD_REQUEST,
            RpcError::invalid_request("missing Mcp-Session-Id header"),
        );
    };
    let Some(endpoint) = server.sessions.get(&session_id).map(|e| Arc::clone(e.value()))
    else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let last_event_id = headers
        .get(headers::LAST_EVENT_ID)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);

    let (live_tx, live_rx) = mpsc::channel(64);
    endpoint.set_live_stream(live_tx);

    let replayed = server.event_store.replay_after(&session_id, last_event_id);
    trace!(
        %session_id,
        last_event_id,
        replay = replayed.len(),
        "sse stream opened"
    );

    let replay_stream = futures::stream::iter(
        replayed
            .into_iter()
            .map(|event| (event.id, event.message)),
    );
    let live_stream = ReceiverStream::new(live_rx);
    let stream = replay_stream
        .chain(live_stream)
        .map(|(id, message)| {
            let data = message.to_json().unwrap_or_else(|_| "{}".to_string());
            Ok::<Event, std::convert::Infallible>(Event::default().id(id.to_string()).data(data))
        });

    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

async fn handle_delete(
    State(server): State<Arc<StreamableHttpServer>>,
    headers: HeaderMap,
) -> Response {
    if !server.origin_allowed(&headers) {
        return StatusCode::FORBIDDEN.into_response();
    }
    let Some(session_id) = StreamableHttpServer::session_header(&headers) else {
        return rpc_error_response(
            StatusCode::BAD_REQUEST,
            RpcError::invalid_request("missing Mcp-Session-Id header"),
        );
    };
    if !server.sessions.contains_key(&session_id) {
        return StatusCode::NOT_FOUND.into_response();
    }
    server.remove_session(&session_id);
    StatusCode::OK.into_response()
}
