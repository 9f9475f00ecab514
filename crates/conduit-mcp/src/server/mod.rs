//! MCP Server Host Glue
//!
//! [`McpServer`] binds the primitive registry, filter chains, and
//! configuration into something that serves sessions: hand it a
//! transport and it spawns a [`Session`] running the server router.
//! One server hosts many sessions against the same shared registry;
//! failure of one session never affects the others.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use conduit_mcp::registry::{RegisteredTool, ToolOutput};
//! use conduit_mcp::server::McpServer;
//! use conduit_mcp::transport::StdioTransport;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let server = McpServer::builder()
//!     .server_info("echo-server", "1.0.0")
//!     .tool(
//!         RegisteredTool::builder("echo")
//!             .description("Echo the message back")
//!             .input_schema(json!({
//!                 "type": "object",
//!                 "properties": {"message": {"type": "string"}},
//!                 "required": ["message"]
//!             }))
//!             .handler_fn(|args, _ctx| async move {
//!                 let message = args["message"].as_str().unwrap_or_default();
//!                 Ok(ToolOutput::Text(message.to_string()))
//!             })
//!             .build()?,
//!     )
//!     .build()?;
//!
//! let session = server.serve(Arc::new(StdioTransport::new()));
//! session.wait().await;
//! # Ok(())
//! # }
//! ```

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use tracing::{debug, trace};

// Layer 3: Internal module imports
use crate::protocol::constants::{defaults, methods};
use crate::protocol::{
    CallToolRequest, CallToolResult, ClientCapabilities, CreateMessageRequest, CreateMessageResult,
    ElicitRequest, ElicitResult, GetPromptRequest, GetPromptResult, ListPromptsRequest,
    ListPromptsResult, ListResourcesRequest, ListResourcesResult, ListRootsResult, ListToolsRequest,
    ListToolsResult, LoggingCapability, PromptsCapability, ReadResourceRequest, ReadResourceResult,
    ResourcesCapability, Root, ServerCapabilities, ServerInfo, TasksCapability, ToolsCapability,
    Uri,
};
use crate::registry::{
    FilterChain, PrimitiveCollection, PrimitiveKind, RegisteredPrompt, RegisteredResource,
    RegisteredTool, RegistryError, RequestFilter,
};
use crate::session::{
    Peer, ServiceProvider, Session, SessionConfig, SessionError, SessionState,
};
use crate::transport::http::{StreamableHttpServer, StreamableServerConfig};
use crate::transport::Transport;

pub mod router;
pub mod subscriptions;
pub mod tasks;

pub use tasks::{InMemoryTaskStore, TaskStore};

use router::McpRouter;
use subscriptions::SessionRoster;

/// Host-facing server configuration
#[derive(Debug, Clone)]
pub struct McpServerConfig {
    /// Identification sent in the initialize result
    pub server_info: ServerInfo,

    /// Usage instructions surfaced to clients
    pub instructions: Option<String>,

    /// Deadline for the whole handshake; sessions close on expiry
    pub initialization_timeout: Duration,

    /// Fallback timeout for tools without one of their own; `None`
    /// means unbounded
    pub default_tool_timeout: Option<Duration>,

    /// Default deadline for server-initiated requests
    pub request_timeout: Duration,

    /// Page size for `*/list` results
    pub page_size: usize,

    /// Requests queued per session while its handshake completes
    pub max_queued_requests: usize,
}

impl Default for McpServerConfig {
    fn default() -> Self {
        Self {
            server_info: ServerInfo {
                name: "conduit-server".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            instructions: None,
            initialization_timeout: defaults::INITIALIZATION_TIMEOUT,
            default_tool_timeout: None,
            request_timeout: defaults::REQUEST_TIMEOUT,
            page_size: defaults::LIST_PAGE_SIZE,
            max_queued_requests: defaults::MAX_QUEUED_REQUESTS,
        }
    }
}

/// Filter chains around the six filterable operations
#[derive(Debug, Default)]
pub(crate) struct Filters {
    pub list_tools: FilterChain<ListToolsRequest, ListToolsResult>,
    pub call_tool: FilterChain<CallToolRequest, CallToolResult>,
    pub list_prompts: FilterChain<ListPromptsRequest, ListPromptsResult>,
    pub get_prompt: FilterChain<GetPromptRequest, GetPromptResult>,
    pub list_resources: FilterChain<ListResourcesRequest, ListResourcesResult>,
    pub read_resource: FilterChain<ReadResourceRequest, ReadResourceResult>,
}

/// Shared server state behind every session
pub(crate) struct ServerCore {
    pub config: McpServerConfig,
    pub tools: PrimitiveCollection<RegisteredTool>,
    pub prompts: PrimitiveCollection<RegisteredPrompt>,
    pub resources: PrimitiveCollection<RegisteredResource>,
    pub filters: Filters,
    pub task_store: Option<Arc<dyn TaskStore>>,
    pub roster: SessionRoster,
    pub services: ServiceProvider,
    pub on_roots_changed: Option<Arc<dyn Fn(Peer) + Send + Sync>>,
    forwarder_started: AtomicBool,
}

impl ServerCore {
    /// Derive the capability advertisement from the registry
    pub fn build_capabilities(&self) -> ServerCapabilities {
        ServerCapabilities {
            experimental: None,
            logging: Some(LoggingCapability {}),
            prompts: (!self.prompts.is_empty()).then(|| PromptsCapability {
                list_changed: Some(true),
            }),
            resources: (!self.resources.is_empty()).then(|| ResourcesCapability {
                subscribe: Some(true),
                list_changed: Some(true),
            }),
            tools: (!self.tools.is_empty()).then(|| ToolsCapability {
                list_changed: Some(true),
            }),
            tasks: self.task_store.is_some().then(TasksCapability::default),
        }
    }
}

/// An MCP server hosting sessions over pluggable transports
pub struct McpServer {
    core: Arc<ServerCore>,
}

impl McpServer {
    /// Start building a server
    pub fn builder() -> McpServerBuilder {
        McpServerBuilder::new()
    }

    /// The tool collection; mutations notify connected sessions
    pub fn tools(&self) -> &PrimitiveCollection<RegisteredTool> {
        &self.core.tools
    }

    /// The prompt collection
    pub fn prompts(&self) -> &PrimitiveCollection<RegisteredPrompt> {
        &self.core.prompts
    }

    /// The resource collection
    pub fn resources(&self) -> &PrimitiveCollection<RegisteredResource> {
        &self.core.resources
    }

    /// Serve one transport, spawning its session
    pub fn serve(&self, transport: Arc<dyn Transport>) -> ServerSession {
        self.ensure_forwarder();
        let session = spawn_session(&self.core, transport);
        ServerSession {
            session,
            core: Arc::clone(&self.core),
        }
    }

    /// Serve the Streamable HTTP binding; returns the binding and the
    /// axum router to mount
    ///
    /// Every `initialize` POST creates a session served by this server.
    /// Hosting the router (listeners, TLS) is up to the embedder.
    pub fn streamable_http(
        &self,
        config: StreamableServerConfig,
    ) -> (Arc<StreamableHttpServer>, axum::Router) {
        self.ensure_forwarder();
        let core = Arc::clone(&self.core);
        let http = StreamableHttpServer::new(
            config,
            Box::new(move |transport| {
                // The roster keeps the session reachable; its reader
                // task runs detached from the dropped handle.
                let _ = spawn_session(&core, transport);
            }),
        );
        let router = Arc::clone(&http).router();
        (http, router)
    }

    /// Signal that a resource changed; subscribed sessions are told
    pub async fn notify_resource_updated(&self, uri: &Uri) {
        self.core.roster.notify_resource_updated(uri).await;
    }

    /// Capabilities a connected client declared, by session id
    pub fn client_capabilities(&self, session_id: &str) -> Option<ClientCapabilities> {
        self.core.roster.client_capabilities(session_id)
    }

    /// Number of live sessions
    pub fn session_count(&self) -> usize {
        self.core.roster.len()
    }

    /// Forward registry change events to sessions, once per server
    fn ensure_forwarder(&self) {
        if self.core.forwarder_started.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut tools_rx = self.core.tools.subscribe_changes();
        let mut prompts_rx = self.core.prompts.subscribe_changes();
        let mut resources_rx = self.core.resources.subscribe_changes();
        let core: Weak<ServerCore> = Arc::downgrade(&self.core);

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    event = tools_rx.recv() => event,
                    event = prompts_rx.recv() => event,
                    event = resources_rx.recv() => event,
                };
                let Some(core) = core.upgrade() else {
                    return; // server dropped
                };
                match event {
                    Ok(kind) => core.roster.notify_list_changed(kind).await,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        trace!(skipped, "list-changed events coalesced");
                        // A lag is fine: one notification already tells
                        // the client to relist.
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                }
            }
        });
    }
}

/// Spawn one server session over a transport against the shared core
fn spawn_session(core: &Arc<ServerCore>, transport: Arc<dyn Transport>) -> Session {
    let router = Arc::new(McpRouter {
        core: Arc::clone(core),
    });
    let session = Session::spawn(
        transport,
        router,
        SessionConfig {
            request_timeout: core.config.request_timeout,
            initialization_timeout: Some(core.config.initialization_timeout),
            max_queued_requests: core.config.max_queued_requests,
            max_pending_requests: defaults::MAX_PENDING_REQUESTS,
        },
        core.services.clone(),
    );
    core.roster.add(session.peer());
    debug!(session_id = session.session_id(), "session attached");
    session
}

impl std::fmt::Debug for McpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpServer")
            .field("server", &self.core.config.server_info.name)
            .field("tools", &self.core.tools.len())
            .field("prompts", &self.core.prompts.len())
            .field("resources", &self.core.resources.len())
            .finish()
    }
}

/// One hosted session and its server
pub struct ServerSession {
    session: Session,
    core: Arc<ServerCore>,
}

impl ServerSession {
    /// Handle for talking to the connected client
    pub fn peer(&self) -> Peer {
        self.session.peer()
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Session identifier
    pub fn session_id(&self) -> &str {
        self.session.session_id()
    }

    /// Close this session; the server keeps running
    pub async fn close(&self) {
        self.core.roster.remove(self.session.session_id());
        self.session.close().await;
    }

    /// Wait for the session to end (client disconnect or close)
    pub async fn wait(&self) {
        self.session.wait().await;
        self.core.roster.remove(self.session.session_id());
    }
}

/// Typed server→client requests issued from handler context
#[async_trait]
pub trait ServerPeerExt {
    /// Ask the client to sample a model response
    async fn create_message(
        &self,
        request: CreateMessageRequest,
    ) -> Result<CreateMessageResult, SessionError>;

    /// Ask the client for its filesystem roots
    async fn list_roots(&self) -> Result<Vec<Root>, SessionError>;

    /// Ask the client to elicit structured input from the user
    async fn elicit(&self, request: ElicitRequest) -> Result<ElicitResult, SessionError>;
}

#[async_trait]
impl ServerPeerExt for Peer {
    async fn create_message(
        &self,
        request: CreateMessageRequest,
    ) -> Result<CreateMessageResult, SessionError> {
        let params = serde_json::to_value(request)?;
        let result = self
            .request(methods::SAMPLING_CREATE_MESSAGE, Some(params))
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn list_roots(&self) -> Result<Vec<Root>, SessionError> {
        let result = self.request(methods::ROOTS_LIST, None).await?;
        let roots: ListRootsResult = serde_json::from_value(result)?;
        Ok(roots.roots)
    }

    async fn elicit(&self, request: ElicitRequest) -> Result<ElicitResult, SessionError> {
        let params = serde_json::to_value(request)?;
        let result = self
            .request(methods::ELICITATION_CREATE, Some(params))
            .await?;
        Ok(serde_json::from_value(result)?)
    }
}

/// Builder for [`McpServer`]
pub struct McpServerBuilder {
    config: McpServerConfig,
    tools: Vec<RegisteredTool>,
    prompts: Vec<RegisteredPrompt>,
    resources: Vec<RegisteredResource>,
    filters: Filters,
    task_store: Option<Arc<dyn TaskStore>>,
    services: ServiceProvider,
    on_roots_changed: Option<Arc<dyn Fn(Peer) + Send + Sync>>,
}

impl McpServerBuilder {
    fn new() -> Self {
        Self {
            config: McpServerConfig::default(),
            tools: Vec::new(),
            prompts: Vec::new(),
            resources: Vec::new(),
            filters: Filters::default(),
            task_store: None,
            services: ServiceProvider::default(),
            on_roots_changed: None,
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: McpServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the advertised server identification
    pub fn server_info(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.config.server_info = ServerInfo {
            name: name.into(),
            version: version.into(),
        };
        self
    }

    /// Set the instructions surfaced to clients
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.config.instructions = Some(instructions.into());
        self
    }

    /// Bound the handshake duration
    pub fn initialization_timeout(mut self, timeout: Duration) -> Self {
        self.config.initialization_timeout = timeout;
        self
    }

    /// Fallback timeout for tools without their own
    pub fn default_tool_timeout(mut self, timeout: Duration) -> Self {
        self.config.default_tool_timeout = Some(timeout);
        self
    }

    /// Page size for list results
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.config.page_size = page_size;
        self
    }

    /// Register a tool
    pub fn tool(mut self, tool: RegisteredTool) -> Self {
        self.tools.push(tool);
        self
    }

    /// Register a prompt
    pub fn prompt(mut self, prompt: RegisteredPrompt) -> Self {
        self.prompts.push(prompt);
        self
    }

    /// Register a resource
    pub fn resource(mut self, resource: RegisteredResource) -> Self {
        self.resources.push(resource);
        self
    }

    /// Append a filter around `tools/call`
    pub fn call_tool_filter(
        mut self,
        filter: Arc<dyn RequestFilter<CallToolRequest, CallToolResult>>,
    ) -> Self {
        self.filters.call_tool.push(filter);
        self
    }

    /// Append a filter around `tools/list`
    pub fn list_tools_filter(
        mut self,
        filter: Arc<dyn RequestFilter<ListToolsRequest, ListToolsResult>>,
    ) -> Self {
        self.filters.list_tools.push(filter);
        self
    }

    /// Append a filter around `prompts/list`
    pub fn list_prompts_filter(
        mut self,
        filter: Arc<dyn RequestFilter<ListPromptsRequest, ListPromptsResult>>,
    ) -> Self {
        self.filters.list_prompts.push(filter);
        self
    }

    /// Append a filter around `prompts/get`
    pub fn get_prompt_filter(
        mut self,
        filter: Arc<dyn RequestFilter<GetPromptRequest, GetPromptResult>>,
    ) -> Self {
        self.filters.get_prompt.push(filter);
        self
    }

    /// Append a filter around `resources/list`
    pub fn list_resources_filter(
        mut self,
        filter: Arc<dyn RequestFilter<ListResourcesRequest, ListResourcesResult>>,
    ) -> Self {
        self.filters.list_resources.push(filter);
        self
    }

    /// Append a filter around `resources/read`
    pub fn read_resource_filter(
        mut self,
        filter: Arc<dyn RequestFilter<ReadResourceRequest, ReadResourceResult>>,
    ) -> Self {
        self.filters.read_resource.push(filter);
        self
    }

    /// Enable deferred tool results through a task store
    pub fn task_store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.task_store = Some(store);
        self
    }

    /// Install the host's service provider
    pub fn services(mut self, services: ServiceProvider) -> Self {
        self.services = services;
        self
    }

    /// Callback for `notifications/roots/list_changed`
    pub fn on_roots_changed(
        mut self,
        callback: impl Fn(Peer) + Send + Sync + 'static,
    ) -> Self {
        self.on_roots_changed = Some(Arc::new(callback));
        self
    }

    /// Finish building
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::DuplicateName` when two primitives of
    /// the same kind share a name.
    pub fn build(self) -> Result<Arc<McpServer>, RegistryError> {
        let tools = PrimitiveCollection::new(PrimitiveKind::Tool);
        for tool in self.tools {
            tools.add(tool)?;
        }
        let prompts = PrimitiveCollection::new(PrimitiveKind::Prompt);
        for prompt in self.prompts {
            prompts.add(prompt)?;
        }
        let resources = PrimitiveCollection::new(PrimitiveKind::Resource);
        for resource in self.resources {
            resources.add(resource)?;
        }

        Ok(Arc::new(McpServer {
            core: Arc::new(ServerCore {
                config: self.config,
                tools,
                prompts,
                resources,
                filters: self.filters,
                task_store: self.task_store,
                roster: SessionRoster::default(),
                services: self.services,
                on_roots_changed: self.on_roots_changed,
                forwarder_started: AtomicBool::new(false),
            }),
        }))
    }
}

impl Default for McpServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
