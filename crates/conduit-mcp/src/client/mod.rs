//! MCP Client Host Glue
//!
//! [`McpClient`] drives the client side of a session: it performs the
//! initialize handshake (version negotiation, capability exchange, the
//! `initialized` notification), exposes typed wrappers for every
//! server operation, and plugs client-side handlers into the session
//! for the requests a server may initiate: sampling, roots, and
//! elicitation.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use conduit_mcp::client::McpClient;
//! use conduit_mcp::transport::StdioTransport;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = McpClient::builder()
//!     .client_info("inspector", "0.1.0")
//!     .connect(Arc::new(StdioTransport::new()))
//!     .await?;
//!
//! for tool in client.list_all_tools().await? {
//!     println!("{}", tool.name);
//! }
//! let result = client
//!     .call_tool("echo", json!({"message": "hi"}))
//!     .await?;
//! println!("{:?}", result.first_text());
//! # Ok(())
//! # }
//! ```

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, trace};

// Layer 3: Internal module imports
use crate::protocol::constants::methods;
use crate::protocol::{
    CallToolRequest, CallToolResult, ClientCapabilities, ClientInfo, CreateMessageRequest,
    CreateMessageResult, Cursor, ElicitRequest, ElicitResult, GetPromptResult, InitializeRequest,
    InitializeResult, ListPromptsResult, ListResourceTemplatesResult, ListResourcesResult,
    ListRootsResult, ListToolsResult, LogLevel, LoggingMessageNotification, ProtocolVersion,
    ReadResourceResult, ResourceUpdatedNotification, Root, RpcError, ServerCapabilities, Tool, Uri,
};
use crate::session::{
    Peer, ProgressCallback, RequestContext, RequestHandler, RequestOptions, ServiceProvider,
    Session, SessionConfig, SessionError, SessionState,
};
use crate::transport::Transport;

/// Client-side failures
#[derive(Debug, Error)]
pub enum ClientError {
    /// The underlying session operation failed
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A result did not deserialize into its typed shape
    #[error("Malformed result: {message}")]
    MalformedResult { message: String },

    /// The server offered a protocol version this client cannot speak
    #[error("Version mismatch: requested {requested}, server offered {offered}")]
    VersionMismatch {
        requested: ProtocolVersion,
        offered: ProtocolVersion,
    },
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedResult {
            message: err.to_string(),
        }
    }
}

/// Client-side handler for `sampling/createMessage`
#[async_trait]
pub trait SamplingHandler: Send + Sync {
    /// Produce a sampled message for the server
    async fn create_message(
        &self,
        request: CreateMessageRequest,
        context: RequestContext,
    ) -> Result<CreateMessageResult, RpcError>;
}

/// Client-side handler for `elicitation/create`
#[async_trait]
pub trait ElicitationHandler: Send + Sync {
    /// Ask the user for the requested input
    async fn elicit(
        &self,
        request: ElicitRequest,
        context: RequestContext,
    ) -> Result<ElicitResult, RpcError>;
}

/// Callback invoked for each `notifications/message` log record
pub type LogCallback = Arc<dyn Fn(LoggingMessageNotification) + Send + Sync>;
/// Callback invoked for each `notifications/resources/updated`
pub type ResourceUpdatedCallback = Arc<dyn Fn(Uri) + Send + Sync>;
/// Callback invoked when a server collection changes; the argument is
/// the notification method name
pub type ListChangedCallback = Arc<dyn Fn(&str) + Send + Sync>;

struct ClientHandlers {
    sampling: Option<Arc<dyn SamplingHandler>>,
    elicitation: Option<Arc<dyn ElicitationHandler>>,
    roots: std::sync::RwLock<Vec<Root>>,
    on_log: Option<LogCallback>,
    on_resource_updated: Option<ResourceUpdatedCallback>,
    on_list_changed: Option<ListChangedCallback>,
}

/// The client's [`RequestHandler`]: serves the server-initiated surface
struct ClientRouter {
    handlers: Arc<ClientHandlers>,
}

#[async_trait]
impl RequestHandler for ClientRouter {
    async fn handle_request(
        &self,
        method: &str,
        params: Option<Value>,
        context: RequestContext,
    ) -> Result<Value, RpcError> {
        match method {
            methods::SAMPLING_CREATE_MESSAGE => {
                let Some(handler) = &self.handlers.sampling else {
                    return Err(RpcError::method_not_found(method));
                };
                let request: CreateMessageRequest =
                    serde_json::from_value(params.unwrap_or_default())
                        .map_err(|e| RpcError::invalid_params(e.to_string()))?;
                let result = handler.create_message(request, context).await?;
                serde_json::to_value(result).map_err(|e| RpcError::internal_error(e.to_string()))
            }
            methods::ROOTS_LIST => {
                let roots = self
                    .handlers
                    .roots
                    .read()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .clone();
                serde_json::to_value(ListRootsResult { roots })
                    .map_err(|e| RpcError::internal_error(e.to_string()))
            }
            methods::ELICITATION_CREATE => {
                let Some(handler) = &self.handlers.elicitation else {
                    return Err(RpcError::method_not_found(method));
                };
                let request: ElicitRequest = serde_json::from_value(params.unwrap_or_default())
                    .map_err(|e| RpcError::invalid_params(e.to_string()))?;
                let result = handler.elicit(request, context).await?;
                serde_json::to_value(result).map_err(|e| RpcError::internal_error(e.to_string()))
            }
            other => Err(RpcError::method_not_found(other)),
        }
    }

    async fn handle_notification(&self, method: &str, params: Option<Value>, _peer: Peer) {
        match method {
            methods::LOG_MESSAGE => {
                let Some(record) = params
                    .and_then(|p| serde_json::from_value::<LoggingMessageNotification>(p).ok())
                else {
                    trace!("malformed log record; ignoring");
                    return;
                };
                if let Some(callback) = &self.handlers.on_log {
                    callback(record);
                }
            }
            methods::RESOURCES_UPDATED => {
                let Some(updated) = params
                    .and_then(|p| serde_json::from_value::<ResourceUpdatedNotification>(p).ok())
                else {
                    trace!("malformed resource update; ignoring");
                    return;
                };
                if let Some(callback) = &self.handlers.on_resource_updated {
                    callback(updated.uri);
                }
            }
            methods::TOOLS_LIST_CHANGED
            | methods::PROMPTS_LIST_CHANGED
            | methods::RESOURCES_LIST_CHANGED => {
                if let Some(callback) = &self.handlers.on_list_changed {
                    callback(method);
                }
            }
            other => trace!(method = other, "unhandled notification"),
        }
    }
}

/// Builder for [`McpClient`]
pub struct McpClientBuilder {
    client_info: ClientInfo,
    capabilities: ClientCapabilities,
    protocol_version: ProtocolVersion,
    request_timeout: Duration,
    sampling: Option<Arc<dyn SamplingHandler>>,
    elicitation: Option<Arc<dyn ElicitationHandler>>,
    roots: Vec<Root>,
    on_log: Option<LogCallback>,
    on_resource_updated: Option<ResourceUpdatedCallback>,
    on_list_changed: Option<ListChangedCallback>,
    services: ServiceProvider,
}

impl McpClientBuilder {
    fn new() -> Self {
        Self {
            client_info: ClientInfo {
                name: "conduit-client".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            capabilities: ClientCapabilities::default(),
            protocol_version: ProtocolVersion::current(),
            request_timeout: crate::protocol::constants::defaults::REQUEST_TIMEOUT,
            sampling: None,
            elicitation: None,
            roots: Vec::new(),
            on_log: None,
            on_resource_updated: None,
            on_list_changed: None,
            services: ServiceProvider::default(),
        }
    }

    /// Set the client identification
    pub fn client_info(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.client_info = ClientInfo {
            name: name.into(),
            version: version.into(),
        };
        self
    }

    /// Propose a specific protocol version
    pub fn protocol_version(mut self, version: ProtocolVersion) -> Self {
        self.protocol_version = version;
        self
    }

    /// Default deadline for requests
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Serve `sampling/createMessage`; advertises the capability
    pub fn sampling_handler<H: SamplingHandler + 'static>(mut self, handler: H) -> Self {
        self.sampling = Some(Arc::new(handler));
        self.capabilities = self.capabilities.with_sampling();
        self
    }

    /// Serve `elicitation/create`; advertises the capability
    pub fn elicitation_handler<H: ElicitationHandler + 'static>(mut self, handler: H) -> Self {
        self.elicitation = Some(Arc::new(handler));
        self.capabilities = self.capabilities.with_elicitation();
        self
    }

    /// Expose filesystem roots; advertises the capability
    pub fn roots(mut self, roots: Vec<Root>) -> Self {
        self.roots = roots;
        self.capabilities = self.capabilities.with_roots(true);
        self
    }

    /// Observe server log records
    pub fn on_log(mut self, callback: impl Fn(LoggingMessageNotification) + Send + Sync + 'static) -> Self {
        self.on_log = Some(Arc::new(callback));
        self
    }

    /// Observe subscribed-resource updates
    pub fn on_resource_updated(mut self, callback: impl Fn(Uri) + Send + Sync + 'static) -> Self {
        self.on_resource_updated = Some(Arc::new(callback));
        self
    }

    /// Observe collection-changed notifications
    pub fn on_list_changed(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_list_changed = Some(Arc::new(callback));
        self
    }

    /// Install the host's service provider
    pub fn services(mut self, services: ServiceProvider) -> Self {
        self.services = services;
        self
    }

    /// Connect over a transport and run the initialize handshake
    ///
    /// # Errors
    ///
    /// Fails when the transport cannot deliver, the server rejects the
    /// handshake, or the offered protocol version is unsupported.
    pub async fn connect(self, transport: Arc<dyn Transport>) -> Result<McpClient, ClientError> {
        let handlers = Arc::new(ClientHandlers {
            sampling: self.sampling,
            elicitation: self.elicitation,
            roots: std::sync::RwLock::new(self.roots),
            on_log: self.on_log,
            on_resource_updated: self.on_resource_updated,
            on_list_changed: self.on_list_changed,
        });
        let router = Arc::new(ClientRouter {
            handlers: Arc::clone(&handlers),
        });
        let session = Session::spawn(
            transport,
            router,
            SessionConfig {
                request_timeout: self.request_timeout,
                ..Default::default()
            },
            self.services,
        );
        let peer = session.peer();

        let request = InitializeRequest {
            protocol_version: self.protocol_version.clone(),
            capabilities: self.capabilities,
            client_info: self.client_info,
        };
        let result = peer
            .request(methods::INITIALIZE, Some(serde_json::to_value(&request)?))
            .await
            .map_err(|error| {
                // The handshake failed; the session is useless.
                debug!(%error, "initialize failed");
                error
            })?;
        let initialized: InitializeResult = serde_json::from_value(result)?;

        if !initialized.protocol_version.is_supported() {
            session.close().await;
            return Err(ClientError::VersionMismatch {
                requested: self.protocol_version,
                offered: initialized.protocol_version,
            });
        }

        peer.notify_initialized().await?;
        debug!(
            server = %initialized.server_info.name,
            version = %initialized.protocol_version,
            "handshake complete"
        );

        Ok(McpClient {
            session,
            handlers,
            initialize_result: initialized,
        })
    }
}

/// High-level MCP client over one session
pub struct McpClient {
    session: Session,
    handlers: Arc<ClientHandlers>,
    initialize_result: InitializeResult,
}

impl McpClient {
    /// Start building a client
    pub fn builder() -> McpClientBuilder {
        McpClientBuilder::new()
    }

    /// Handle for raw requests and notifications
    pub fn peer(&self) -> Peer {
        self.session.peer()
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// The server's initialize result
    pub fn initialize_result(&self) -> &InitializeResult {
        &self.initialize_result
    }

    /// Capabilities the server advertised
    pub fn server_capabilities(&self) -> &ServerCapabilities {
        &self.initialize_result().capabilities
    }

    /// Instructions the server provided, if any
    pub fn instructions(&self) -> Option<&str> {
        self.initialize_result().instructions.as_deref()
    }

    /// Liveness check
    ///
    /// # Errors
    ///
    /// Fails when the session is not ready or the peer is gone.
    pub async fn ping(&self) -> Result<(), ClientError> {
        Ok(self.session.peer().ping().await?)
    }

    /// One page of tools
    ///
    /// # Errors
    ///
    /// Propagates session and deserialization failures.
    pub async fn list_tools(&self, cursor: Option<Cursor>) -> Result<ListToolsResult, ClientError> {
        self.list_page(methods::TOOLS_LIST, cursor).await
    }

    /// Every tool, walking all pages
    ///
    /// # Errors
    ///
    /// Propagates session and deserialization failures.
    pub async fn list_all_tools(&self) -> Result<Vec<Tool>, ClientError> {
        let mut tools = Vec::new();
        let mut cursor = None;
        loop {
            let page = self.list_tools(cursor).await?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(tools),
            }
        }
    }

    /// Invoke a tool
    ///
    /// `arguments` must be a JSON object (or `null` for none).
    ///
    /// # Errors
    ///
    /// Fails on session errors or a protocol-level server error; tool
    /// execution failures come back as `Ok` with `isError: true`.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<CallToolResult, ClientError> {
        self.call_tool_with_options(name, arguments, RequestOptions::default())
            .await
    }

    /// Invoke a tool with progress reporting
    ///
    /// # Errors
    ///
    /// As [`McpClient::call_tool`].
    pub async fn call_tool_with_progress(
        &self,
        name: &str,
        arguments: Value,
        progress: ProgressCallback,
    ) -> Result<CallToolResult, ClientError> {
        self.call_tool_with_options(
            name,
            arguments,
            RequestOptions {
                progress: Some(progress),
                ..Default::default()
            },
        )
        .await
    }

    /// Invoke a tool with explicit request options
    ///
    /// # Errors
    ///
    /// As [`McpClient::call_tool`].
    pub async fn call_tool_with_options(
        &self,
        name: &str,
        arguments: Value,
        options: RequestOptions,
    ) -> Result<CallToolResult, ClientError> {
        let arguments = match arguments {
            Value::Null => None,
            Value::Object(map) => Some(map),
            other => {
                return Err(ClientError::MalformedResult {
                    message: format!("tool arguments must be an object, got {other}"),
                })
            }
        };
        let request = CallToolRequest {
            name: name.to_string(),
            arguments,
            meta: None,
        };
        let result = self
            .session
            .peer()
            .request_with_options(
                methods::TOOLS_CALL,
                Some(serde_json::to_value(&request)?),
                options,
            )
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    /// One page of prompts
    ///
    /// # Errors
    ///
    /// Propagates session and deserialization failures.
    pub async fn list_prompts(
        &self,
        cursor: Option<Cursor>,
    ) -> Result<ListPromptsResult, ClientError> {
        self.list_page(methods::PROMPTS_LIST, cursor).await
    }

    /// Render a prompt
    ///
    /// # Errors
    ///
    /// Propagates session and deserialization failures.
    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: HashMap<String, String>,
    ) -> Result<GetPromptResult, ClientError> {
        let params = serde_json::json!({"name": name, "arguments": arguments});
        let result = self
            .session
            .peer()
            .request(methods::PROMPTS_GET, Some(params))
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    /// One page of resources
    ///
    /// # Errors
    ///
    /// Propagates session and deserialization failures.
    pub async fn list_resources(
        &self,
        cursor: Option<Cursor>,
    ) -> Result<ListResourcesResult, ClientError> {
        self.list_page(methods::RESOURCES_LIST, cursor).await
    }

    /// One page of resource templates
    ///
    /// # Errors
    ///
    /// Propagates session and deserialization failures.
    pub async fn list_resource_templates(
        &self,
        cursor: Option<Cursor>,
    ) -> Result<ListResourceTemplatesResult, ClientError> {
        self.list_page(methods::RESOURCES_TEMPLATES_LIST, cursor)
            .await
    }

    /// Read a resource by URI
    ///
    /// # Errors
    ///
    /// Propagates session and deserialization failures.
    pub async fn read_resource(&self, uri: &Uri) -> Result<ReadResourceResult, ClientError> {
        let result = self
            .session
            .peer()
            .request(
                methods::RESOURCES_READ,
                Some(serde_json::json!({"uri": uri})),
            )
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Subscribe to updates for a resource URI
    ///
    /// # Errors
    ///
    /// Propagates session failures.
    pub async fn subscribe_resource(&self, uri: &Uri) -> Result<(), ClientError> {
        self.session
            .peer()
            .request(
                methods::RESOURCES_SUBSCRIBE,
                Some(serde_json::json!({"uri": uri})),
            )
            .await?;
        Ok(())
    }

    /// Unsubscribe from a resource URI; idempotent
    ///
    /// # Errors
    ///
    /// Propagates session failures.
    pub async fn unsubscribe_resource(&self, uri: &Uri) -> Result<(), ClientError> {
        self.session
            .peer()
            .request(
                methods::RESOURCES_UNSUBSCRIBE,
                Some(serde_json::json!({"uri": uri})),
            )
            .await?;
        Ok(())
    }

    /// Ask the server to raise or lower this session's log level
    ///
    /// # Errors
    ///
    /// Propagates session failures.
    pub async fn set_log_level(&self, level: LogLevel) -> Result<(), ClientError> {
        self.session
            .peer()
            .request(
                methods::LOGGING_SET_LEVEL,
                Some(serde_json::json!({"level": level})),
            )
            .await?;
        Ok(())
    }

    /// Replace the advertised roots and notify the server
    ///
    /// # Errors
    ///
    /// Propagates session failures.
    pub async fn set_roots(&self, roots: Vec<Root>) -> Result<(), ClientError> {
        {
            let mut guard = self
                .handlers
                .roots
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *guard = roots;
        }
        self.session
            .peer()
            .notify(methods::ROOTS_LIST_CHANGED, None)
            .await?;
        Ok(())
    }

    /// Close the session
    pub async fn close(&self) {
        self.session.close().await;
    }

    async fn list_page<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        cursor: Option<Cursor>,
    ) -> Result<T, ClientError> {
        let params = cursor.map(|cursor| {
            let mut map = Map::new();
            map.insert(
                "cursor".to_string(),
                Value::String(cursor.as_str().to_string()),
            );
            Value::Object(map)
        });
        let result = self.session.peer().request(method, params).await?;
        Ok(serde_json::from_value(result)?)
    }
}

impl std::fmt::Debug for McpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClient")
            .field("state", &self.session.state())
            .finish()
    }
}
