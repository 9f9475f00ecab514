//! Protocol Constants
//!
//! Method names, JSON-RPC error codes, and runtime defaults shared across
//! the session engine, transports, and host glue.

/// MCP method and notification names
pub mod methods {
    /// Initialization handshake request
    pub const INITIALIZE: &str = "initialize";
    /// Client signals the handshake is complete
    pub const INITIALIZED: &str = "notifications/initialized";
    /// Liveness check, valid from either side
    pub const PING: &str = "ping";

    /// Request cancellation notification
    pub const CANCELLED: &str = "notifications/cancelled";
    /// Out-of-band progress notification
    pub const PROGRESS: &str = "notifications/progress";
    /// Log message notification
    pub const LOG_MESSAGE: &str = "notifications/message";

    /// List registered tools
    pub const TOOLS_LIST: &str = "tools/list";
    /// Invoke a tool
    pub const TOOLS_CALL: &str = "tools/call";
    /// Tool collection changed
    pub const TOOLS_LIST_CHANGED: &str = "notifications/tools/list_changed";

    /// List registered prompts
    pub const PROMPTS_LIST: &str = "prompts/list";
    /// Render a prompt
    pub const PROMPTS_GET: &str = "prompts/get";
    /// Prompt collection changed
    pub const PROMPTS_LIST_CHANGED: &str = "notifications/prompts/list_changed";

    /// List registered resources
    pub const RESOURCES_LIST: &str = "resources/list";
    /// List registered resource templates
    pub const RESOURCES_TEMPLATES_LIST: &str = "resources/templates/list";
    /// Read a resource by URI
    pub const RESOURCES_READ: &str = "resources/read";
    /// Subscribe to updates for a resource URI
    pub const RESOURCES_SUBSCRIBE: &str = "resources/subscribe";
    /// Unsubscribe from updates for a resource URI
    pub const RESOURCES_UNSUBSCRIBE: &str = "resources/unsubscribe";
    /// A subscribed resource changed
    pub const RESOURCES_UPDATED: &str = "notifications/resources/updated";
    /// Resource collection changed
    pub const RESOURCES_LIST_CHANGED: &str = "notifications/resources/list_changed";

    /// Adjust the session's minimum log level
    pub const LOGGING_SET_LEVEL: &str = "logging/setLevel";

    /// Server-initiated sampling request
    pub const SAMPLING_CREATE_MESSAGE: &str = "sampling/createMessage";
    /// Server asks the client for its filesystem roots
    pub const ROOTS_LIST: &str = "roots/list";
    /// Client's root set changed
    pub const ROOTS_LIST_CHANGED: &str = "notifications/roots/list_changed";
    /// Server-initiated elicitation request
    pub const ELICITATION_CREATE: &str = "elicitation/create";
}

/// JSON-RPC 2.0 error codes
pub mod error_codes {
    /// Malformed JSON was received
    pub const PARSE_ERROR: i32 = -32700;
    /// The message was not a valid request
    pub const INVALID_REQUEST: i32 = -32600;
    /// The requested method does not exist
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// The parameters failed validation
    pub const INVALID_PARAMS: i32 = -32602;
    /// An internal error occurred while handling the request
    pub const INTERNAL_ERROR: i32 = -32603;

    /// Lower bound of the implementation-defined server error range
    pub const SERVER_ERROR_RANGE_MIN: i32 = -32099;
    /// Upper bound of the implementation-defined server error range
    pub const SERVER_ERROR_RANGE_MAX: i32 = -32000;

    /// Requested resource URI matched nothing (implementation-defined)
    pub const RESOURCE_NOT_FOUND: i32 = -32002;
}

/// Runtime defaults; every value is overridable through the builders
pub mod defaults {
    use std::time::Duration;

    /// Time the handshake may take before the session is closed
    pub const INITIALIZATION_TIMEOUT: Duration = Duration::from_secs(60);

    /// Default timeout for outbound requests
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    /// Requests queued while the handshake completes, before overflow
    /// is rejected with InvalidRequest
    pub const MAX_QUEUED_REQUESTS: usize = 16;

    /// Upper bound on concurrently pending outbound requests
    pub const MAX_PENDING_REQUESTS: usize = 1000;

    /// Page size for `*/list` results
    pub const LIST_PAGE_SIZE: usize = 50;

    /// Events retained per session for SSE resumability
    pub const EVENT_STORE_CAPACITY: usize = 256;

    /// Age bound on retained SSE events
    pub const EVENT_STORE_MAX_AGE: Duration = Duration::from_secs(300);

    /// Delay between SSE reconnection attempts
    pub const RECONNECTION_INTERVAL: Duration = Duration::from_millis(500);

    /// Reconnection attempts before the transport reports itself closed
    pub const MAX_RECONNECTION_ATTEMPTS: u32 = 5;

    /// Upper bound on a single framed message
    pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;
}

/// Header names used by the HTTP bindings
pub mod headers {
    /// Session binding header for Streamable HTTP
    pub const MCP_SESSION_ID: &str = "Mcp-Session-Id";
    /// SSE resumption header
    pub const LAST_EVENT_ID: &str = "Last-Event-ID";
}
