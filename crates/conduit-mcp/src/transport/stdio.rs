//! Stdio Transport
//!
//! Newline-delimited JSON over a byte pipe, the standard binding for
//! locally spawned MCP servers.
//!
//! # Message framing
//!
//! - One JSON-RPC message per line, terminated by `\n` on write
//! - Readers accept both `\n` and `\r\n`
//! - Empty lines and lines that fail to parse are skipped silently;
//!   they may originate from logging or other stream noise
//! - A final fragment without a trailing newline is discarded at EOF
//! - Lines are accumulated as raw bytes before UTF-8 decoding, so
//!   multi-byte characters straddling read buffers decode correctly
//!
//! # Examples
//!
//! ```rust,no_run
//! use conduit_mcp::transport::{StdioTransport, Transport};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = StdioTransport::new();
//! while let Some(message) = transport.receive().await? {
//!     // hand off to the session engine
//!     let _ = message;
//! }
//! # Ok(())
//! # }
//! ```

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicBool, Ordering};

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::trace;

// Layer 3: Internal module imports
use super::{Transport, TransportError};
use crate::protocol::constants::defaults;
use crate::protocol::{JsonRpcMessage, JsonRpcMessageTrait};

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Newline-delimited JSON transport over arbitrary byte streams
///
/// Defaults to the process stdin/stdout; [`StdioTransport::from_parts`]
/// accepts any reader/writer pair, which is how child-process pipes and
/// in-memory test pipes are wired up.
pub struct StdioTransport {
    /// Buffered reader, owned by the single receiving task
    reader: Mutex<BufReader<BoxedReader>>,

    /// Writer guarded so concurrent sends never interleave frames
    writer: Mutex<BoxedWriter>,

    /// Set once `close` has run
    closed: AtomicBool,

    /// Upper bound on a single framed line
    max_message_size: usize,
}

impl StdioTransport {
    /// Create a transport over the process stdin/stdout
    pub fn new() -> Self {
        Self::from_parts(Box::new(tokio::io::stdin()), Box::new(tokio::io::stdout()))
    }

    /// Create a transport over an arbitrary reader/writer pair
    pub fn from_parts(reader: BoxedReader, writer: BoxedWriter) -> Self {
        Self {
            reader: Mutex::new(BufReader::new(reader)),
            writer: Mutex::new(writer),
            closed: AtomicBool::new(false),
            max_message_size: defaults::MAX_MESSAGE_SIZE,
        }
    }

    /// Override the maximum message size
    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn receive(&self) -> Result<Option<JsonRpcMessage>, TransportError> {
        self.ensure_open()?;
        let mut reader = self.reader.lock().await;
        let mut line = Vec::with_capacity(256);

        loop {
            line.clear();
            // read_until accumulates raw bytes, so a multi-byte character
            // straddling a read buffer boundary stays intact.
            let n = reader.read_until(b'\n', &mut line).await?;
            if n == 0 {
                // EOF; an unterminated final fragment is discarded.
                if !line.is_empty() {
                    trace!(bytes = line.len(), "discarding unterminated final fragment");
                }
                return Ok(None);
            }
            if n > self.max_message_size {
                return Err(TransportError::MessageTooLarge {
                    size: n,
                    max: self.max_message_size,
                });
            }

            // Tolerate \r\n line endings.
            while line.last() == Some(&b'\n') || line.last() == Some(&b'\r') {
                line.pop();
            }
            if line.is_empty() {
                continue;
            }

            match JsonRpcMessage::from_json_bytes(&line) {
                Ok(message) => return Ok(Some(message)),
                Err(error) => {
                    // Noise on the pipe (stray logging, partial garbage) is
                    // skipped rather than terminating the session.
                    trace!(%error, "skipping unparseable line");
                    continue;
                }
            }
        }
    }

    async fn send(&self, message: JsonRpcMessage) -> Result<(), TransportError> {
        self.ensure_open()?;
        let mut buffer = BytesMut::with_capacity(256);
        message.serialize_to_buffer(&mut buffer)?;
        buffer.extend_from_slice(b"\n");

        if buffer.len() > self.max_message_size {
            return Err(TransportError::MessageTooLarge {
                size: buffer.len(),
                max: self.max_message_size,
            });
        }

        let mut writer = self.writer.lock().await;
        writer.write_all(&buffer).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let mut writer = self.writer.lock().await;
        writer.shutdown().await?;
        Ok(())
    }

    fn transport_type(&self) -> &'static str {
        "stdio"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{JsonRpcRequest, RequestId};
    use serde_json::json;
    use tokio::io::AsyncWriteExt;

    fn pipe_transport() -> (StdioTransport, tokio::io::DuplexStream, tokio::io::DuplexStream) {
        let (incoming_tx, incoming_rx) = tokio::io::duplex(4096);
        let (outgoing_tx, outgoing_rx) = tokio::io::duplex(4096);
        let transport =
            StdioTransport::from_parts(Box::new(incoming_rx), Box::new(outgoing_tx));
        (transport, incoming_tx, outgoing_rx)
    }

    #[tokio::test]
    async fn receives_one_message_per_line() {
        let (transport, mut input, _output) = pipe_transport();
        input
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n")
            .await
            .unwrap();
        drop(input);

        let message = transport.receive().await.unwrap().unwrap();
        assert_eq!(message.method(), Some("ping"));
        assert!(transport.receive().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn skips_noise_and_empty_lines() {
        let (transport, mut input, _output) = pipe_transport();
        input
            .write_all(b"\nnot json at all\n{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\r\n")
            .await
            .unwrap();
        drop(input);

        let message = transport.receive().await.unwrap().unwrap();
        assert_eq!(message.method(), Some("notifications/initialized"));
    }

    #[tokio::test]
    async fn multi_byte_utf8_across_segments() {
        let (transport, mut input, _output) = pipe_transport();
        let frame =
            b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"echo\",\"params\":{\"text\":\"\xE2\x82\xAC\"}}\n";

        // One byte at a time: the euro sign straddles every boundary.
        let handle = tokio::spawn(async move {
            for byte in frame.iter() {
                input.write_all(&[*byte]).await.unwrap();
                input.flush().await.unwrap();
            }
            drop(input);
        });

        let message = transport.receive().await.unwrap().unwrap();
        match message {
            JsonRpcMessage::Request(request) => {
                assert_eq!(request.params.unwrap()["text"], "€");
            }
            other => panic!("expected request, got {other:?}"),
        }
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn unterminated_final_fragment_is_discarded() {
        let (transport, mut input, _output) = pipe_transport();
        input
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"")
            .await
            .unwrap();
        drop(input);

        assert!(transport.receive().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn send_terminates_with_newline() {
        let (transport, _input, mut output) = pipe_transport();
        let request = JsonRpcRequest::new("ping", Some(json!({})), RequestId::new_number(1));
        transport
            .send(JsonRpcMessage::Request(request))
            .await
            .unwrap();

        let mut buf = vec![0u8; 256];
        let n = tokio::io::AsyncReadExt::read(&mut output, &mut buf).await.unwrap();
        let text = String::from_utf8(buf[..n].to_vec()).unwrap();
        assert!(text.ends_with('\n'));
        assert!(!text[..text.len() - 1].contains('\n'));
    }

    #[tokio::test]
    async fn closed_transport_rejects_io() {
        let (transport, _input, _output) = pipe_transport();
        transport.close().await.unwrap();
        assert!(matches!(
            transport.receive().await,
            Err(TransportError::Closed)
        ));
        let request = JsonRpcRequest::new("ping", None, RequestId::new_number(1));
        assert!(matches!(
            transport.send(JsonRpcMessage::Request(request)).await,
            Err(TransportError::Closed)
        ));
        // close is idempotent
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn oversized_line_is_an_error() {
        let (transport, mut input, _output) = pipe_transport();
        let transport = transport.with_max_message_size(16);
        let handle = tokio::spawn(async move {
            let _ = input.write_all(b"{\"jsonrpc\":\"2.0\",\"method\":\"way-too-long-for-the-limit\"}\n").await;
            drop(input);
        });
        assert!(matches!(
            transport.receive().await,
            Err(TransportError::MessageTooLarge { .. })
        ));
        handle.await.unwrap();
    }
}
