//! HTTP+SSE Client Transport
//!
//! The legacy two-channel HTTP binding: a long-lived GET carries
//! server→client messages as SSE, and each client→server message is an
//! HTTP POST. The first event on the SSE stream is named `endpoint` and
//! carries the POST URL; nothing may be sent before it arrives. All
//! subsequent events are named `message` and each carries one JSON-RPC
//! message.
//!
//! On unexpected stream termination the transport reconnects with
//! `Last-Event-ID`, bounded by the [`ReconnectPolicy`]; the initial GET
//! does not consume the retry budget. When the budget is exhausted the
//! transport surfaces [`TransportError::Closed`].

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use url::Url;

// Layer 3: Internal module imports
use super::auth::{send_with_auth, CredentialProvider};
use super::ReconnectPolicy;
use crate::protocol::{JsonRpcMessage, JsonRpcMessageTrait};
use crate::transport::sse::SseParser;
use crate::transport::{Transport, TransportError};

/// Client transport for the HTTP+SSE binding
pub struct SseClientTransport {
    http: reqwest::Client,
    inbound: Mutex<mpsc::Receiver<JsonRpcMessage>>,
    post_url: watch::Receiver<Option<Url>>,
    shutdown: CancellationToken,
    /// Set when the reader gave up reconnecting
    failed: Arc<AtomicBool>,
    closed: AtomicBool,
    auth: Option<Arc<dyn CredentialProvider>>,
}

impl SseClientTransport {
    /// Connect to an SSE endpoint
    ///
    /// Performs the initial GET before returning, so connection-refused
    /// surfaces here rather than on first receive.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Connection` if the initial GET fails or
    /// does not answer with an event stream.
    pub async fn connect(sse_url: &str, policy: ReconnectPolicy) -> Result<Self, TransportError> {
        Self::connect_with_auth(sse_url, policy, None).await
    }

    /// Connect with a credential provider attached
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Connection` if the initial GET fails.
    pub async fn connect_with_auth(
        sse_url: &str,
        policy: ReconnectPolicy,
        auth: Option<Arc<dyn CredentialProvider>>,
    ) -> Result<Self, TransportError> {
        let sse_url = Url::parse(sse_url)
            .map_err(|e| TransportError::connection(format!("invalid SSE url: {e}")))?;
        let http = reqwest::Client::new();

        let initial = open_stream(&http, &sse_url, None, auth.as_ref()).await?;

        let (inbound_tx, inbound_rx) = mpsc::channel(64);
        let (post_url_tx, post_url_rx) = watch::channel(None);
        let shutdown = CancellationToken::new();
        let failed = Arc::new(AtomicBool::new(false));

        let reader = StreamReader {
            http: http.clone(),
            sse_url: sse_url.clone(),
            inbound: inbound_tx,
            post_url: post_url_tx,
            shutdown: shutdown.clone(),
            failed: Arc::clone(&failed),
            policy,
            auth: auth.clone(),
        };
        tokio::spawn(reader.run(initial));

        Ok(Self {
            http,
            inbound: Mutex::new(inbound_rx),
            post_url: post_url_rx,
            shutdown,
            failed,
            closed: AtomicBool::new(false),
            auth,
        })
    }

    /// Wait until the server has announced the POST endpoint
    async fn endpoint(&self) -> Result<Url, TransportError> {
        let mut watcher = self.post_url.clone();
        loop {
            if let Some(url) = watcher.borrow().clone() {
                return Ok(url);
            }
            watcher
                .changed()
                .await
                .map_err(|_| TransportError::Closed)?;
        }
    }
}

#[async_trait]
impl Transport for SseClientTransport {
    async fn receive(&self) -> Result<Option<JsonRpcMessage>, TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let mut inbound = self.inbound.lock().await;
        match inbound.recv().await {
            Some(message) => Ok(Some(message)),
            None if self.failed.load(Ordering::SeqCst) => Err(TransportError::Closed),
            None => Ok(None),
        }
    }

    async fn send(&self, message: JsonRpcMessage) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let endpoint = self.endpoint().await?;
        let body = message.to_json()?;

        let http = &self.http;
        let response = send_with_auth(
            || {
                http.post(endpoint.clone())
                    .header(reqwest::header::CONTENT_TYPE, "application/json")
                    .body(body.clone())
            },
            self.auth.as_ref(),
            endpoint.as_str(),
        )
        .await?;

        if !response.status().is_success() {
            return Err(TransportError::http(format!(
                "POST {} answered {}",
                endpoint,
                response.status()
            )));
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        self.shutdown.cancel();
        Ok(())
    }

    fn transport_type(&self) -> &'static str {
        "http+sse"
    }
}

/// Open the event stream, optionally resuming after an event id
async fn open_stream(
    http: &reqwest::Client,
    sse_url: &Url,
    last_event_id: Option<&str>,
    auth: Option<&Arc<dyn CredentialProvider>>,
) -> Result<reqwest::Response, TransportError> {
    let response = send_with_auth(
        || {
            let mut request = http
                .get(sse_url.clone())
                .header(reqwest::header::ACCEPT, "text/event-stream");
            if let Some(id) = last_event_id {
                request = request.header("Last-Event-ID", id);
            }
            request
        },
        auth,
        sse_url.as_str(),
    )
    .await
    .map_err(|e| TransportError::connection(e.to_string()))?;

    if !response.status().is_success() {
        return Err(TransportError::connection(format!(
            "GET {} answered {}",
            sse_url,
            response.status()
        )));
    }
    Ok(response)
}

struct StreamReader {
    http: reqwest::Client,
    sse_url: Url,
    inbound: mpsc::Sender<JsonRpcMessage>,
    post_url: watch::Sender<Option<Url>>,
    shutdown: CancellationToken,
    failed: Arc<AtomicBool>,
    policy: ReconnectPolicy,
    auth: Option<Arc<dyn CredentialProvider>>,
}

impl StreamReader {
    async fn run(self, initial: reqwest::Response) {
        let mut last_event_id: Option<String> = None;
        let mut response = Some(initial);
        let mut attempts: u32 = 0;

        loop {
            let current = match response.take() {
                Some(r) => r,
                None => {
                    // Reconnection path; the initial GET never lands here.
                    attempts += 1;
                    if attempts > self.policy.max_attempts {
                        warn!("sse reconnect budget exhausted");
                        self.failed.store(true, Ordering::SeqCst);
                        return;
                    }
                    tokio::time::sleep(self.policy.interval).await;
                    match open_stream(
                        &self.http,
                        &self.sse_url,
                        last_event_id.as_deref(),
                        self.auth.as_ref(),
                    )
                    .await
                    {
                        Ok(r) => {
                            debug!(attempt = attempts, "sse stream reconnected");
                            // A healthy stream refreshes the budget.
                            attempts = 0;
                            r
                        }
                        Err(error) => {
                            trace!(%error, attempt = attempts, "sse reconnect failed");
                            continue;
                        }
                    }
                }
            };

            if self.read_stream(current, &mut last_event_id).await {
                return; // shut down or receiver dropped
            }
            // Stream ended unexpectedly; fall through to reconnect.
        }
    }

    /// Pump one response stream; returns true when the transport is done
    async fn read_stream(
        &self,
        response: reqwest::Response,
        last_event_id: &mut Option<String>,
    ) -> bool {
        let mut parser = SseParser::new();
        let mut body = response.bytes_stream();

        loop {
            let chunk = tokio::select! {
                _ = self.shutdown.cancelled() => return true,
                chunk = body.next() => chunk,
            };
            let Some(chunk) = chunk else {
                return false; // stream ended
            };
            let Ok(chunk) = chunk else {
                return false; // transport hiccup; reconnect
            };

            for event in parser.feed(&chunk) {
                if let Some(id) = &event.id {
                    *last_event_id = Some(id.clone());
                }
                match event.name() {
                    "endpoint" => {
                        match self.sse_url.join(event.data.trim()) {
                            Ok(url) => {
                                debug!(%url, "sse endpoint announced");
                                let _ = self.post_url.send(Some(url));
                            }
                            Err(error) => warn!(%error, "ignoring malformed endpoint event"),
                        }
                    }
                    "message" => match JsonRpcMessage::from_json(&event.data) {
                        Ok(message) => {
                            if self.inbound.send(message).await.is_err() {
                                return true; // receiver dropped
                            }
                        }
                        Err(error) => trace!(%error, "skipping unparseable sse message"),
                    },
                    other => trace!(event = other, "ignoring unknown sse event"),
                }
            }
        }
    }
}
