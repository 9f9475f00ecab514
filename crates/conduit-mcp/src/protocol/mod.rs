//! Protocol Layer
//!
//! The wire-level message model (JSON-RPC 2.0), MCP operation messages,
//! validated domain newtypes, error taxonomy, and shared constants.
//! Everything above this layer (transports, the session engine, the
//! registry) speaks in these types.

pub mod constants;
pub mod errors;
pub mod message;
pub mod messages;
pub mod types;

// Re-export the types the rest of the crate and downstream hosts use daily.
pub use errors::{ProtocolError, ProtocolResult, RpcError};
pub use message::{
    ErrorObject, JsonRpcError, JsonRpcMessage, JsonRpcMessageTrait, JsonRpcNotification,
    JsonRpcRequest, JsonRpcResponse, RequestId, JSONRPC_VERSION,
};
pub use messages::capabilities::{
    ClientCapabilities, ElicitationCapability, LoggingCapability, PromptsCapability,
    ResourcesCapability, RootsCapability, SamplingCapability, ServerCapabilities, TasksCapability,
    ToolsCapability,
};
pub use messages::initialization::{InitializeRequest, InitializeResult};
pub use messages::logging::{LogLevel, LoggingMessageNotification, SetLevelRequest};
pub use messages::notifications::{CancelledNotification, ProgressNotification};
pub use messages::prompts::{
    GetPromptRequest, GetPromptResult, ListPromptsRequest, ListPromptsResult, Prompt,
    PromptArgument, PromptMessage, Role,
};
pub use messages::resources::{
    ListResourceTemplatesRequest, ListResourceTemplatesResult, ListResourcesRequest,
    ListResourcesResult, ReadResourceRequest, ReadResourceResult, Resource, ResourceTemplate,
    ResourceUpdatedNotification, SubscribeRequest, UnsubscribeRequest,
};
pub use messages::sampling::{
    CreateMessageRequest, CreateMessageResult, ElicitAction, ElicitRequest, ElicitResult,
    ListRootsResult, Root, SamplingMessage,
};
pub use messages::tools::{
    CallToolRequest, CallToolResult, ListToolsRequest, ListToolsResult, Tool, ToolExecution,
};
pub use types::{
    Base64Data, ClientInfo, Content, Cursor, MetaEntry, MimeType, ProgressToken, ProtocolVersion,
    ResourceContents, ServerInfo, Uri,
};
