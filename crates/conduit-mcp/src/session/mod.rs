//! Session Engine
//!
//! A [`Session`] owns one [`Transport`] and runs the bidirectional
//! JSON-RPC demultiplexing loop:
//!
//! 1. A single reader task pulls messages off the transport.
//! 2. Responses and errors complete the matching entry in the
//!    pending-request table; unknown ids are logged and discarded.
//! 3. Notifications the engine understands (cancellation, progress,
//!    `initialized`) are consumed in place; the rest are forwarded to
//!    the plugged-in [`RequestHandler`] without blocking the reader.
//! 4. Requests are admitted through the state machine, then dispatched
//!    on their own task with a [`RequestContext`] carrying a
//!    cancellation token, an optional progress reporter, and a service
//!    scope.
//!
//! Handlers for distinct methods run in parallel; invocations of the
//! same method are serialized behind a per-method lock. Outbound sends
//! go through the transport's internal write lock, so frames never
//! interleave. Cancelling an inbound request aborts only its own
//! scope; closing the session cancels everything and fails every
//! pending outbound future.

// Layer 1: Standard library imports
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use dashmap::{DashMap, DashSet};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use uuid::Uuid;

// Layer 3: Internal module imports
use crate::protocol::constants::{defaults, methods};
use crate::protocol::{
    CancelledNotification, ErrorObject, JsonRpcMessage, JsonRpcRequest, LogLevel,
    LoggingMessageNotification, ProgressNotification, ProgressToken, RequestId, RpcError, Uri,
};
use crate::transport::{Transport, TransportError};

pub mod context;
pub mod handler;
pub mod pending;
pub mod state;

pub use context::{
    ProgressReporter, RequestContext, ServiceProvider, ServiceProviderBuilder, ServiceScope,
};
pub use handler::RequestHandler;
pub use pending::RequestIdGenerator;
pub use state::{DispatchDecision, SessionState};

use pending::PendingRequests;
use state::StateMachine;

/// Errors surfaced to callers awaiting session operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    /// The request was cancelled locally before a reply arrived
    #[error("Request cancelled")]
    Cancelled,

    /// The request's deadline expired
    #[error("Request timed out")]
    TimedOut,

    /// The transport closed; no reply can arrive
    #[error("Transport closed")]
    TransportClosed,

    /// The peer answered with a JSON-RPC error
    #[error("Peer error: {0}")]
    Remote(ErrorObject),

    /// The pending-request table is at capacity
    #[error("Too many pending requests (limit {limit})")]
    TooManyPendingRequests { limit: usize },

    /// The session is not ready for this operation
    #[error("Session is not ready")]
    NotReady,

    /// Payload could not be serialized or deserialized
    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

/// Tunables for one session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Default deadline for outbound requests
    pub request_timeout: Duration,

    /// Deadline for the whole handshake; the session closes on expiry.
    /// Servers set this; clients normally leave it `None` because the
    /// request timeout already bounds their `initialize`.
    pub initialization_timeout: Option<Duration>,

    /// Requests held while the handshake completes; overflow is
    /// rejected with InvalidRequest
    pub max_queued_requests: usize,

    /// Bound on concurrently pending outbound requests
    pub max_pending_requests: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout: defaults::REQUEST_TIMEOUT,
            initialization_timeout: None,
            max_queued_requests: defaults::MAX_QUEUED_REQUESTS,
            max_pending_requests: defaults::MAX_PENDING_REQUESTS,
        }
    }
}

/// Callback invoked for each progress notification of one request
pub type ProgressCallback = Arc<dyn Fn(ProgressNotification) + Send + Sync>;

/// Per-request options for [`Peer::request_with_options`]
#[derive(Default)]
pub struct RequestOptions {
    /// Deadline override; `None` uses the session default
    pub timeout: Option<Duration>,

    /// Progress callback; setting one attaches a progress token to the
    /// outgoing request
    pub progress: Option<ProgressCallback>,

    /// External cancellation for this request
    pub cancellation: Option<CancellationToken>,
}

impl RequestOptions {
    /// Options with a deadline override
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Default::default()
        }
    }
}

/// Per-session set of subscribed resource URIs
///
/// Lifetime is bound to the session; the set is cleared at close.
/// Unsubscribing an absent URI is a no-op, which is what makes
/// unsubscribe idempotent.
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    uris: DashSet<Uri>,
}

impl SubscriptionSet {
    /// Add a URI to the set
    pub fn subscribe(&self, uri: Uri) {
        self.uris.insert(uri);
    }

    /// Remove a URI; absent URIs are fine
    pub fn unsubscribe(&self, uri: &Uri) {
        self.uris.remove(uri);
    }

    /// Whether the session watches this URI
    pub fn contains(&self, uri: &Uri) -> bool {
        self.uris.contains(uri)
    }

    /// Number of watched URIs
    pub fn len(&self) -> usize {
        self.uris.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.uris.is_empty()
    }

    /// Discard every subscription
    pub fn clear(&self) {
        self.uris.clear();
    }
}

struct SessionInner {
    transport: Arc<dyn Transport>,
    handler: Arc<dyn RequestHandler>,
    config: SessionConfig,
    state: StateMachine,
    pending: PendingRequests,
    /// Cancellation scopes of in-flight inbound requests
    inflight: DashMap<RequestId, CancellationToken>,
    /// Progress callbacks of in-flight outbound requests, by token
    progress_routes: DashMap<ProgressToken, ProgressCallback>,
    /// Requests held back while the handshake completes
    queued: std::sync::Mutex<Vec<JsonRpcRequest>>,
    /// Per-method serialization locks
    method_locks: DashMap<String, Arc<Mutex<()>>>,
    /// Minimum level for outgoing log records
    min_log_level: std::sync::RwLock<LogLevel>,
    subscriptions: SubscriptionSet,
    services: ServiceProvider,
    shutdown: CancellationToken,
    session_id: String,
}

impl SessionInner {
    fn method_lock(&self, method: &str) -> Arc<Mutex<()>> {
        let entry = self
            .method_locks
            .entry(method.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())));
        Arc::clone(entry.value())
    }
}

/// Cloneable handle for talking to the remote side of a session
///
/// Handlers receive one through their [`RequestContext`]; hosts get one
/// from [`Session::peer`]. All operations go through the session's
/// transport and correlation table.
#[derive(Clone)]
pub struct Peer {
    inner: Arc<SessionInner>,
}

impl Peer {
    /// Issue a request with default options and await the reply
    ///
    /// # Errors
    ///
    /// Fails with `TimedOut`, `Cancelled`, `TransportClosed`, or the
    /// peer's `Remote` error.
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, SessionError> {
        self.request_with_options(method, params, RequestOptions::default())
            .await
    }

    /// Issue a request with explicit options and await the reply
    ///
    /// The returned future completes exactly once: with the result, the
    /// peer's error, `TimedOut`, `Cancelled`, or `TransportClosed`. On
    /// timeout or cancellation a `notifications/cancelled` is emitted
    /// toward the peer, and never after the future has already
    /// resolved.
    ///
    /// # Errors
    ///
    /// See [`SessionError`].
    pub async fn request_with_options(
        &self,
        method: &str,
        params: Option<Value>,
        options: RequestOptions,
    ) -> Result<Value, SessionError> {
        let inner = &self.inner;
        let (id, receiver) = inner.pending.register(method)?;

        // A progress callback attaches a token derived from the id.
        let mut params = params;
        let progress_token = options.progress.as_ref().map(|callback| {
            let token = progress_token_for(&id);
            inner
                .progress_routes
                .insert(token.clone(), Arc::clone(callback));
            params = inject_progress_token(params.take(), &token);
            token
        });

        let request = JsonRpcMessage::request(method, params, id.clone());
        if let Err(error) = inner.transport.send(request).await {
            inner.pending.forget(&id);
            self.drop_progress_route(progress_token.as_ref());
            return Err(map_transport_error(error));
        }

        let timeout = options.timeout.unwrap_or(inner.config.request_timeout);
        let external_cancel = options.cancellation.unwrap_or_default();

        let outcome = tokio::select! {
            result = receiver => match result {
                Ok(result) => result,
                // Sender dropped without resolving: session teardown race.
                Err(_) => Err(SessionError::TransportClosed),
            },
            _ = tokio::time::sleep(timeout) => {
                self.abandon_request(&id, "deadline exceeded").await;
                Err(SessionError::TimedOut)
            }
            _ = external_cancel.cancelled() => {
                self.abandon_request(&id, "cancelled by caller").await;
                Err(SessionError::Cancelled)
            }
        };

        self.drop_progress_route(progress_token.as_ref());
        outcome
    }

    /// Send a one-way notification
    ///
    /// # Errors
    ///
    /// Fails when the transport is closed.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), SessionError> {
        self.inner
            .transport
            .send(JsonRpcMessage::notification(method, params))
            .await
            .map_err(map_transport_error)
    }

    /// Liveness check; requires a ready session
    ///
    /// # Errors
    ///
    /// Fails with `NotReady` before the handshake completes.
    pub async fn ping(&self) -> Result<(), SessionError> {
        if self.inner.state.current() != SessionState::Ready {
            return Err(SessionError::NotReady);
        }
        self.request(methods::PING, None).await.map(|_| ())
    }

    /// Send `notifications/initialized` and mark the session ready
    ///
    /// The client side of the handshake: called after `initialize`
    /// returned successfully.
    ///
    /// # Errors
    ///
    /// Fails when the transport is closed.
    pub async fn notify_initialized(&self) -> Result<(), SessionError> {
        self.notify(methods::INITIALIZED, None).await?;
        self.inner.state.mark_ready();
        Ok(())
    }

    /// Emit a log record, suppressed below the session's minimum level
    ///
    /// # Errors
    ///
    /// Fails when the transport is closed; suppressed records succeed.
    pub async fn send_log(
        &self,
        level: LogLevel,
        logger: Option<&str>,
        data: Value,
    ) -> Result<(), SessionError> {
        if !level.passes(self.min_log_level()) {
            return Ok(());
        }
        let mut record = LoggingMessageNotification::new(level, data);
        if let Some(logger) = logger {
            record = record.with_logger(logger);
        }
        self.notify(methods::LOG_MESSAGE, Some(serde_json::to_value(record)?))
            .await
    }

    /// The session's minimum log level
    pub fn min_log_level(&self) -> LogLevel {
        *self
            .inner
            .min_log_level
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Update the session's minimum log level
    pub fn set_min_log_level(&self, level: LogLevel) {
        *self
            .inner
            .min_log_level
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = level;
    }

    /// This session's subscription set
    pub fn subscriptions(&self) -> &SubscriptionSet {
        &self.inner.subscriptions
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        self.inner.state.current()
    }

    /// Session identifier (transport-assigned when available)
    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    /// Number of pending outbound requests (diagnostics)
    pub fn pending_requests(&self) -> usize {
        self.inner.pending.len()
    }

    pub(crate) async fn send_progress(&self, notification: ProgressNotification) {
        let params = match serde_json::to_value(&notification) {
            Ok(params) => params,
            Err(_) => return,
        };
        // Best-effort: progress must never fail a handler.
        let _ = self.notify(methods::PROGRESS, Some(params)).await;
    }

    /// Remove the pending entry and tell the peer, unless the reply won
    async fn abandon_request(&self, id: &RequestId, reason: &str) {
        // Only the party that actually removed the entry may emit the
        // cancellation; this keeps cancellation monotonic with respect
        // to the future resolving.
        if self.inner.pending.forget(id) {
            let cancel = CancelledNotification::new(id.clone()).with_reason(reason);
            if let Ok(params) = serde_json::to_value(&cancel) {
                let _ = self.notify(methods::CANCELLED, Some(params)).await;
            }
        }
    }

    fn drop_progress_route(&self, token: Option<&ProgressToken>) {
        if let Some(token) = token {
            self.inner.progress_routes.remove(token);
        }
    }
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer")
            .field("session_id", &self.inner.session_id)
            .field("state", &self.inner.state.current())
            .finish()
    }
}

/// One end of an MCP conversation
///
/// Spawning a session starts its reader task; dropping the handle does
/// not stop it; call [`Session::close`] for a graceful teardown.
pub struct Session {
    inner: Arc<SessionInner>,
    reader: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Spawn a session over a transport with the given handler
    pub fn spawn(
        transport: Arc<dyn Transport>,
        handler: Arc<dyn RequestHandler>,
        config: SessionConfig,
        services: ServiceProvider,
    ) -> Self {
        let session_id = transport
            .session_id()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let inner = Arc::new(SessionInner {
            pending: PendingRequests::new(config.max_pending_requests),
            transport,
            handler,
            config,
            state: StateMachine::new(),
            inflight: DashMap::new(),
            progress_routes: DashMap::new(),
            queued: std::sync::Mutex::new(Vec::new()),
            method_locks: DashMap::new(),
            min_log_level: std::sync::RwLock::new(LogLevel::Warning),
            subscriptions: SubscriptionSet::default(),
            services,
            shutdown: CancellationToken::new(),
            session_id,
        });

        if let Some(timeout) = inner.config.initialization_timeout {
            let watchdog = Arc::clone(&inner);
            tokio::spawn(async move {
                tokio::select! {
                    _ = watchdog.shutdown.cancelled() => return,
                    _ = tokio::time::sleep(timeout) => {}
                }
                if matches!(
                    watchdog.state.current(),
                    SessionState::Created | SessionState::Initializing
                ) {
                    warn!(session_id = %watchdog.session_id, "initialization timed out");
                    teardown(&watchdog, false).await;
                }
            });
        }

        let reader_inner = Arc::clone(&inner);
        let reader = tokio::spawn(async move { run_reader(reader_inner).await });

        Self {
            inner,
            reader: std::sync::Mutex::new(Some(reader)),
        }
    }

    /// Handle for talking to the remote side
    pub fn peer(&self) -> Peer {
        Peer {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        self.inner.state.current()
    }

    /// Session identifier
    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    /// Close the session: cancel in-flight handlers, fail pending
    /// outbound futures with `Cancelled`, dispose the transport
    pub async fn close(&self) {
        teardown(&self.inner, true).await;
    }

    /// Wait for the reader task to finish (after close or peer EOF)
    pub async fn wait(&self) {
        let handle = self
            .reader
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

/// Map transport failures into the session error space
fn map_transport_error(error: TransportError) -> SessionError {
    match error {
        TransportError::Closed => SessionError::TransportClosed,
        TransportError::Serialization { source } => SessionError::Serialization {
            message: source.to_string(),
        },
        other => SessionError::Serialization {
            message: other.to_string(),
        },
    }
}

fn progress_token_for(id: &RequestId) -> ProgressToken {
    match id {
        RequestId::Number(n) => ProgressToken::Number(*n),
        RequestId::String(s) => ProgressToken::String(s.clone()),
    }
}

/// Attach `_meta.progressToken` to an outgoing request's params
fn inject_progress_token(params: Option<Value>, token: &ProgressToken) -> Option<Value> {
    let mut object = match params {
        Some(Value::Object(map)) => map,
        None => Map::new(),
        // Array params cannot carry _meta; leave them untouched.
        Some(other) => return Some(other),
    };
    let meta = object
        .entry("_meta".to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if let Value::Object(meta) = meta {
        let token_value = match token {
            ProgressToken::Number(n) => Value::from(*n),
            ProgressToken::String(s) => Value::from(s.clone()),
        };
        meta.insert("progressToken".to_string(), token_value);
    }
    Some(Value::Object(object))
}

async fn run_reader(inner: Arc<SessionInner>) {
    debug!(session_id = %inner.session_id, transport = inner.transport.transport_type(), "session started");
    loop {
        let received = tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            received = inner.transport.receive() => received,
        };
        match received {
            Ok(Some(message)) => dispatch_message(&inner, message),
            Ok(None) => {
                debug!(session_id = %inner.session_id, "peer closed the stream");
                break;
            }
            Err(TransportError::Closed) => break,
            Err(error) => {
                warn!(session_id = %inner.session_id, %error, "transport failure");
                break;
            }
        }
    }
    teardown(&inner, false).await;
}

/// Classify one inbound message; never blocks on handler execution
fn dispatch_message(inner: &Arc<SessionInner>, message: JsonRpcMessage) {
    match message {
        JsonRpcMessage::Response(response) => {
            if !inner
                .pending
                .complete(&response.id, Ok(response.result))
            {
                debug!(id = %response.id, "response for unknown request; discarding");
            }
        }
        JsonRpcMessage::Error(error) => match &error.id {
            Some(id) => {
                if !inner
                    .pending
                    .complete(id, Err(SessionError::Remote(error.error)))
                {
                    debug!(%id, "error for unknown request; discarding");
                }
            }
            None => warn!(error = %error.error, "peer reported a request-less error"),
        },
        JsonRpcMessage::Notification(notification) => {
            dispatch_notification(inner, notification.method, notification.params);
        }
        JsonRpcMessage::Request(request) => {
            dispatch_request(inner, request);
        }
    }
}

fn dispatch_notification(inner: &Arc<SessionInner>, method: String, params: Option<Value>) {
    match method.as_str() {
        methods::CANCELLED => {
            let Some(cancel) = params
                .and_then(|p| serde_json::from_value::<CancelledNotification>(p).ok())
            else {
                trace!("malformed cancellation; ignoring");
                return;
            };
            match inner.inflight.remove(&cancel.request_id) {
                Some((id, token)) => {
                    debug!(%id, reason = cancel.reason.as_deref().unwrap_or(""), "request cancelled by peer");
                    token.cancel();
                }
                // Cancellation for an unknown id is a no-op.
                None => trace!(id = %cancel.request_id, "cancellation for unknown request"),
            }
        }
        methods::PROGRESS => {
            let Some(progress) = params
                .and_then(|p| serde_json::from_value::<ProgressNotification>(p).ok())
            else {
                trace!("malformed progress notification; ignoring");
                return;
            };
            // Clone the route out so the callback runs without holding
            // a shard lock; it may re-enter the session.
            let route = inner
                .progress_routes
                .get(&progress.progress_token)
                .map(|entry| Arc::clone(entry.value()));
            match route {
                Some(callback) => callback(progress),
                // Progress for an unknown token is dropped silently.
                None => trace!(token = %progress.progress_token, "progress for unknown token"),
            }
        }
        methods::INITIALIZED => {
            if inner.state.mark_ready() {
                debug!(session_id = %inner.session_id, "session ready");
                drain_queued(inner);
            }
        }
        _ => {
            let inner = Arc::clone(inner);
            tokio::spawn(async move {
                let peer = Peer {
                    inner: Arc::clone(&inner),
                };
                inner
                    .handler
                    .handle_notification(&method, params, peer)
                    .await;
            });
        }
    }
}

fn dispatch_request(inner: &Arc<SessionInner>, request: JsonRpcRequest) {
    // Liveness checks bypass the handler and the state machine's
    // pre-Ready rejections; the state table admits ping everywhere
    // except a closing session.
    if request.method == methods::PING
        && !matches!(
            inner.state.current(),
            SessionState::Closing | SessionState::Closed
        )
    {
        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            let reply = JsonRpcMessage::response(Value::Object(Map::new()), request.id);
            let _ = inner.transport.send(reply).await;
        });
        return;
    }

    match inner.state.admit(&request.method) {
        DispatchDecision::Dispatch => {
            if request.method == methods::INITIALIZE {
                inner.state.begin_initializing();
            }
            spawn_request(inner, request);
        }
        DispatchDecision::Queue => {
            let overflowed = {
                let mut queued = inner
                    .queued
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                if queued.len() >= inner.config.max_queued_requests {
                    true
                } else {
                    trace!(method = %request.method, "queued until handshake completes");
                    queued.push(request.clone());
                    false
                }
            };
            if overflowed {
                reject_request(inner, request, "initialization in progress, queue full");
            }
        }
        DispatchDecision::Reject => {
            reject_request(inner, request, "session is not ready for this method");
        }
    }
}

fn reject_request(inner: &Arc<SessionInner>, request: JsonRpcRequest, message: &str) {
    let error = RpcError::invalid_request(format!("{}: {message}", request.method));
    let reply = JsonRpcMessage::error(error.to_error_object(), Some(request.id));
    let inner = Arc::clone(inner);
    tokio::spawn(async move {
        let _ = inner.transport.send(reply).await;
    });
}

fn drain_queued(inner: &Arc<SessionInner>) {
    let queued: Vec<JsonRpcRequest> = {
        let mut guard = inner
            .queued
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.drain(..).collect()
    };
    for request in queued {
        spawn_request(inner, request);
    }
}

/// Run one inbound request on its own task
fn spawn_request(inner: &Arc<SessionInner>, request: JsonRpcRequest) {
    let id = request.id.clone();
    let method = request.method.clone();
    let token = CancellationToken::new();
    inner.inflight.insert(id.clone(), token.clone());

    let peer = Peer {
        inner: Arc::clone(inner),
    };
    let progress = request
        .progress_token()
        .map(|t| ProgressReporter::new(t, peer.clone()));
    let context = RequestContext::new(
        id.clone(),
        peer,
        progress,
        token.clone(),
        inner.services.create_scope(),
    );

    let lock = inner.method_lock(&method);
    let inner = Arc::clone(inner);
    tokio::spawn(async move {
        // One suspended invocation per method; distinct methods run in
        // parallel.
        let _serialized = lock.lock().await;

        let outcome = tokio::select! {
            _ = token.cancelled() => None,
            result = inner
                .handler
                .handle_request(&method, request.params, context.clone()) => Some(result),
        };
        inner.inflight.remove(&id);

        match outcome {
            // Cancelled requests are answered with silence.
            None => trace!(%id, %method, "cancelled; no response emitted"),
            Some(Ok(result)) => {
                if context.polling_retention().is_some() && inner.transport.defer_reply(&id) {
                    trace!(%id, "reply deferred to out-of-band delivery");
                }
                let reply = JsonRpcMessage::response(result, id);
                let _ = inner.transport.send(reply).await;
            }
            Some(Err(error)) => {
                let reply = JsonRpcMessage::error(error.to_error_object(), Some(id));
                let _ = inner.transport.send(reply).await;
            }
        }
    });
}

/// Tear the session down exactly once
///
/// `explicit` distinguishes a host-driven close (pending futures fail
/// with `Cancelled`) from a transport failure (`TransportClosed`).
async fn teardown(inner: &Arc<SessionInner>, explicit: bool) {
    if inner.state.begin_closing().is_none() {
        return; // someone else is already tearing down
    }
    inner.shutdown.cancel();

    for entry in inner.inflight.iter() {
        entry.value().cancel();
    }
    inner.inflight.clear();

    if explicit {
        inner.pending.fail_all(|| SessionError::Cancelled);
    } else {
        inner.pending.fail_all(|| SessionError::TransportClosed);
    }
    inner.progress_routes.clear();
    inner.subscriptions.clear();

    // Requests still parked behind the handshake will never run.
    let parked: Vec<JsonRpcRequest> = {
        let mut queued = inner
            .queued
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        queued.drain(..).collect()
    };
    for request in parked {
        let error = RpcError::invalid_request(format!("{}: session closing", request.method));
        let reply = JsonRpcMessage::error(error.to_error_object(), Some(request.id));
        let _ = inner.transport.send(reply).await;
    }

    let _ = inner.transport.close().await;
    inner.state.mark_closed();
    debug!(session_id = %inner.session_id, "session closed");
}

#[cfg(test)]
pub mod test_support {
    //! Helpers for exercising handler pipelines without a live peer.

    use super::*;
    use async_trait::async_trait;

    /// Transport that never yields a message and swallows sends
    struct NullTransport;

    #[async_trait]
    impl Transport for NullTransport {
        async fn receive(&self) -> Result<Option<JsonRpcMessage>, TransportError> {
            std::future::pending().await
        }

        async fn send(&self, _message: JsonRpcMessage) -> Result<(), TransportError> {
            Ok(())
        }

        async fn close(&self) -> Result<(), TransportError> {
            Ok(())
        }

        fn transport_type(&self) -> &'static str {
            "null"
        }
    }

    struct NullHandler;

    #[async_trait]
    impl RequestHandler for NullHandler {
        async fn handle_request(
            &self,
            method: &str,
            _params: Option<Value>,
            _context: RequestContext,
        ) -> Result<Value, RpcError> {
            Err(RpcError::method_not_found(method))
        }
    }

    /// A context bound to an inert session, for pipeline tests
    pub fn detached_context(request_id: RequestId) -> RequestContext {
        let session = Session::spawn(
            Arc::new(NullTransport),
            Arc::new(NullHandler),
            SessionConfig::default(),
            ServiceProvider::default(),
        );
        RequestContext::new(
            request_id,
            session.peer(),
            None,
            CancellationToken::new(),
            ServiceScope::empty(),
        )
    }
}
