//! Streamable HTTP Client Transport
//!
//! The single-endpoint HTTP binding. Every outbound message is an HTTP
//! POST to the MCP endpoint; the response is one of:
//!
//! - `200 application/json`: the body is the correlated response
//! - `200 text/event-stream`: the server streams the response and may
//!   interleave unsolicited messages
//! - `202 Accepted`: fire-and-forget (notifications and responses)
//!
//! A long-lived GET on the same endpoint opens the unsolicited
//! server→client stream. The first response carrying `Mcp-Session-Id`
//! binds the session; the id is echoed on every subsequent POST, GET,
//! and DELETE. Dropped streams resume with `Last-Event-ID` under the
//! transport's [`ReconnectPolicy`].

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use url::Url;

// Layer 3: Internal module imports
use super::auth::{send_with_auth, CredentialProvider};
use super::ReconnectPolicy;
use crate::protocol::constants::headers;
use crate::protocol::{JsonRpcMessage, JsonRpcMessageTrait};
use crate::transport::sse::SseParser;
use crate::transport::{Transport, TransportError};

/// Shared mutable state between the transport handle and its tasks
struct Shared {
    http: reqwest::Client,
    url: Url,
    session_id: std::sync::RwLock<Option<String>>,
    last_event_id: std::sync::Mutex<Option<String>>,
    inbound: mpsc::Sender<JsonRpcMessage>,
    shutdown: CancellationToken,
    failed: AtomicBool,
    policy: ReconnectPolicy,
    auth: Option<Arc<dyn CredentialProvider>>,
}

impl Shared {
    fn session_header(&self) -> Option<String> {
        self.session_id
            .read()
            .ok()
            .and_then(|guard| guard.clone())
    }

    fn record_event_id(&self, id: &str) {
        if let Ok(mut guard) = self.last_event_id.lock() {
            *guard = Some(id.to_string());
        }
    }

    /// Feed a raw SSE data payload into the inbound channel
    async fn deliver(&self, data: &str) -> bool {
        match JsonRpcMessage::from_json(data) {
            Ok(message) => self.inbound.send(message).await.is_ok(),
            Err(error) => {
                trace!(%error, "skipping unparseable sse message");
                true
            }
        }
    }
}

/// Client transport for the Streamable HTTP binding
pub struct StreamableClientTransport {
    shared: Arc<Shared>,
    inbound: Mutex<mpsc::Receiver<JsonRpcMessage>>,
    closed: AtomicBool,
    listener_started: AtomicBool,
}

impl StreamableClientTransport {
    /// Create a transport for the given MCP endpoint
    ///
    /// No network traffic happens here; the connection is established
    /// by the first `send` (normally the `initialize` request).
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Connection` for an unparseable URL.
    pub fn new(url: &str, policy: ReconnectPolicy) -> Result<Self, TransportError> {
        Self::with_auth(url, policy, None)
    }

    /// Create a transport with a credential provider attached
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Connection` for an unparseable URL.
    pub fn with_auth(
        url: &str,
        policy: ReconnectPolicy,
        auth: Option<Arc<dyn CredentialProvider>>,
    ) -> Result<Self, TransportError> {
        let url = Url::parse(url)
            .map_err(|e| TransportError::connection(format!("invalid MCP url: {e}")))?;
        let (inbound_tx, inbound_rx) = mpsc::channel(64);

        let shared = Arc::new(Shared {
            http: reqwest::Client::new(),
            url,
            session_id: std::sync::RwLock::new(None),
            last_event_id: std::sync::Mutex::new(None),
            inbound: inbound_tx,
            shutdown: CancellationToken::new(),
            failed: AtomicBool::new(false),
            policy,
            auth,
        });

        Ok(Self {
            shared,
            inbound: Mutex::new(inbound_rx),
            closed: AtomicBool::new(false),
            listener_started: AtomicBool::new(false),
        })
    }

    /// Spawn the long-lived GET listener once a session exists
    fn ensure_listener(&self) {
        if self.listener_started.swap(true, Ordering::SeqCst) {
            return;
        }
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move { run_get_listener(shared).await });
    }

    fn capture_session_id(&self, response: &reqwest::Response) {
        let Some(value) = response
            .headers()
            .get(headers::MCP_SESSION_ID)
            .and_then(|v| v.to_str().ok())
        else {
            return;
        };
        if let Ok(mut guard) = self.shared.session_id.write() {
            if guard.as_deref() != Some(value) {
                debug!(session_id = value, "session bound");
                *guard = Some(value.to_string());
            }
        }
        self.ensure_listener();
    }
}

#[async_trait]
impl Transport for StreamableClientTransport {
    async fn receive(&self) -> Result<Option<JsonRpcMessage>, TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let mut inbound = self.inbound.lock().await;
        match inbound.recv().await {
            Some(message) => Ok(Some(message)),
            None if self.shared.failed.load(Ordering::SeqCst) => Err(TransportError::Closed),
            None => Ok(None),
        }
    }

    async fn send(&self, message: JsonRpcMessage) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let body = message.to_json()?;
        let shared = &self.shared;
        let session = shared.session_header();

        let response = send_with_auth(
            || {
                let mut request = shared
                    .http
                    .post(shared.url.clone())
                    .header(reqwest::header::CONTENT_TYPE, "application/json")
                    .header(
                        reqwest::header::ACCEPT,
                        "application/json, text/event-stream",
                    )
                    .body(body.clone());
                if let Some(id) = &session {
                    request = request.header(headers::MCP_SESSION_ID, id);
                }
                request
            },
            shared.auth.as_ref(),
            shared.url.as_str(),
        )
        .await?;

        self.capture_session_id(&response);
        let status = response.status();

        if status == reqwest::StatusCode::ACCEPTED {
            return Ok(());
        }
        if !status.is_success() {
            return Err(TransportError::http(format!(
                "POST {} answered {status}",
                shared.url
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if content_type.starts_with("text/event-stream") {
            // The server streams the response; pump it in the background
            // so concurrent requests are not serialized behind it.
            let shared = Arc::clone(shared);
            tokio::spawn(async move {
                pump_post_stream(shared, response).await;
            });
            return Ok(());
        }

        if content_type.starts_with("application/json") {
            let bytes = response
                .bytes()
                .await
                .map_err(|e| TransportError::http(e.to_string()))?;
            let reply = JsonRpcMessage::from_json_bytes(&bytes)?;
            shared
                .inbound
                .send(reply)
                .await
                .map_err(|_| TransportError::Closed)?;
            return Ok(());
        }

        Err(TransportError::http(format!(
            "POST {} answered unexpected content type {content_type:?}",
            shared.url
        )))
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.shared.shutdown.cancel();

        // Best-effort session teardown; the server also reaps by timeout.
        if let Some(session) = self.shared.session_header() {
            let request = self
                .shared
                .http
                .delete(self.shared.url.clone())
                .header(headers::MCP_SESSION_ID, session);
            if let Err(error) = request.send().await {
                trace!(%error, "session DELETE failed");
            }
        }
        Ok(())
    }

    fn session_id(&self) -> Option<String> {
        self.shared.session_header()
    }

    fn transport_type(&self) -> &'static str {
        "streamable-http"
    }
}

/// Pump the SSE body of a POST response into the inbound channel
async fn pump_post_stream(shared: Arc<Shared>, response: reqwest::Response) {
    let mut parser = SseParser::new();
    let mut body = response.bytes_stream();

    loop {
        let chunk = tokio::select! {
            _ = shared.shutdown.cancelled() => return,
            chunk = body.next() => chunk,
        };
        let Some(Ok(chunk)) = chunk else {
            return; // POST streams are not resumed; the request-level
                    // timeout covers a response lost mid-stream
        };
        for event in parser.feed(&chunk) {
            if let Some(id) = &event.id {
                shared.record_event_id(id);
            }
            if !shared.deliver(&event.data).await {
                return;
            }
        }
    }
}

/// Long-lived GET listener with Last-Event-ID resumption
async fn run_get_listener(shared: Arc<Shared>) {
    let mut attempts: u32 = 0;
    let mut first_attempt = true;

    loop {
        if shared.shutdown.is_cancelled() {
            return;
        }
        if !first_attempt {
            attempts += 1;
            if attempts > shared.policy.max_attempts {
                warn!("streamable GET reconnect budget exhausted");
                shared.failed.store(true, Ordering::SeqCst);
                return;
            }
            tokio::time::sleep(shared.policy.interval).await;
        }
        first_attempt = false;

        let session = shared.session_header();
        let last_event_id = shared
            .last_event_id
            .lock()
            .ok()
            .and_then(|guard| guard.clone());

        let response = send_with_auth(
            || {
                let mut request = shared
                    .http
                    .get(shared.url.clone())
                    .header(reqwest::header::ACCEPT, "text/event-stream");
                if let Some(id) = &session {
                    request = request.header(headers::MCP_SESSION_ID, id);
                }
                if let Some(id) = &last_event_id {
                    request = request.header(headers::LAST_EVENT_ID, id);
                }
                request
            },
            shared.auth.as_ref(),
            shared.url.as_str(),
        )
        .await;

        let response = match response {
            Ok(r) => r,
            Err(error) => {
                trace!(%error, "streamable GET failed");
                continue;
            }
        };

        if response.status() == reqwest::StatusCode::METHOD_NOT_ALLOWED {
            // Server does not offer an unsolicited stream; that is legal.
            debug!("server does not support the standalone GET stream");
            return;
        }
        if !response.status().is_success() {
            trace!(status = %response.status(), "streamable GET rejected");
            continue;
        }

        attempts = 0;
        let mut parser = SseParser::new();
        let mut body = response.bytes_stream();
        loop {
            let chunk = tokio::select! {
                _ = shared.shutdown.cancelled() => return,
                chunk = body.next() => chunk,
            };
            let Some(Ok(chunk)) = chunk else {
                break; // stream dropped; reconnect with Last-Event-ID
            };
            for event in parser.feed(&chunk) {
                if let Some(id) = &event.id {
                    shared.record_event_id(id);
                }
                if !shared.deliver(&event.data).await {
                    return;
                }
            }
        }
    }
}
