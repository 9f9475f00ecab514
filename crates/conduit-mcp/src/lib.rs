//! Conduit MCP: Model Context Protocol Runtime
//!
//! A bidirectional JSON-RPC 2.0 messaging engine that hosts tools,
//! prompts, and resources and exposes them to clients across pluggable
//! transports.
//!
//! # Architecture
//!
//! The crate is organized in layers:
//!
//! - **Protocol** (`protocol`): JSON-RPC 2.0 message model, MCP
//!   operation messages, validated newtypes, error taxonomy
//! - **Transport** (`transport`): the message-pipe abstraction and its
//!   three wire bindings: line-delimited stdio, HTTP+SSE, and
//!   Streamable HTTP (client and server, with resumable SSE)
//! - **Session** (`session`): the demultiplexing engine covering request
//!   correlation, handler dispatch, cancellation in both directions,
//!   progress, ping, and the initialization state machine
//! - **Registry** (`registry`): ordered primitive collections with
//!   change notifications, schema validation, and the filter chain
//! - **Host glue** (`server`, `client`): builders binding transports,
//!   sessions, and the registry into a running server or client
//!
//! # Quick start: a server over stdio
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use conduit_mcp::registry::{RegisteredTool, ToolOutput};
//! use conduit_mcp::server::McpServer;
//! use conduit_mcp::transport::StdioTransport;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = McpServer::builder()
//!         .server_info("echo-server", "1.0.0")
//!         .tool(
//!             RegisteredTool::builder("echo")
//!                 .description("Echo a message back")
//!                 .input_schema(json!({
//!                     "type": "object",
//!                     "properties": {"message": {"type": "string"}},
//!                     "required": ["message"]
//!                 }))
//!                 .handler_fn(|args, _ctx| async move {
//!                     let message = args["message"].as_str().unwrap_or_default();
//!                     Ok(ToolOutput::Text(message.to_string()))
//!                 })
//!                 .build()?,
//!         )
//!         .build()?;
//!
//!     let session = server.serve(Arc::new(StdioTransport::new()));
//!     session.wait().await;
//!     Ok(())
//! }
//! ```
//!
//! # Quick start: a client
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use conduit_mcp::client::McpClient;
//! use conduit_mcp::transport::http::StreamableClientTransport;
//! use conduit_mcp::transport::http::ReconnectPolicy;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = StreamableClientTransport::new(
//!     "http://localhost:8080/mcp",
//!     ReconnectPolicy::default(),
//! )?;
//! let client = McpClient::builder()
//!     .client_info("inspector", "0.1.0")
//!     .connect(Arc::new(transport))
//!     .await?;
//!
//! let result = client.call_tool("echo", json!({"message": "hi"})).await?;
//! assert_eq!(result.first_text(), Some("hi"));
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod transport;

// Re-export the types most hosts touch, so simple embeddings need only
// the crate root.
pub use client::{ClientError, McpClient, McpClientBuilder};
pub use protocol::{
    CallToolResult, ClientCapabilities, Content, JsonRpcMessage, JsonRpcMessageTrait, LogLevel,
    ProgressToken, ProtocolVersion, RequestId, RpcError, ServerCapabilities, Uri,
};
pub use registry::{RegisteredPrompt, RegisteredResource, RegisteredTool, ToolError, ToolOutput};
pub use server::{McpServer, McpServerBuilder, ServerPeerExt, ServerSession};
pub use session::{
    Peer, RequestContext, RequestHandler, RequestOptions, ServiceProvider, Session, SessionConfig,
    SessionError, SessionState,
};
pub use transport::{StdioTransport, Transport, TransportError};

/// Crate version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the crate version
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod crate_api_tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn core_types_are_reachable_from_the_root() {
        let request = JsonRpcMessage::request(
            "tools/call",
            Some(json!({"name": "echo"})),
            RequestId::new_number(1),
        );
        assert!(request.to_json().is_ok());
        assert_eq!(version(), VERSION);
    }
}
