//! JSON-RPC 2.0 Message Model
//!
//! This module provides the wire-level message types shared by every
//! transport and by both ends of a session: requests, notifications,
//! responses, and error responses, unified under [`JsonRpcMessage`].
//!
//! # Architecture
//!
//! - Four concrete message structs with a shared `jsonrpc = "2.0"` tag
//! - [`JsonRpcMessage`] as an untagged sum used for framing and dispatch
//! - [`RequestId`] preserving the wire variant (string vs number) across
//!   round-trips; `"1"` and `1` are distinct identifiers
//! - [`JsonRpcMessageTrait`] for consistent serialization across types
//!
//! # Examples
//!
//! ```rust
//! use conduit_mcp::protocol::{JsonRpcMessageTrait, JsonRpcRequest, RequestId};
//! use serde_json::json;
//!
//! let request = JsonRpcRequest::new(
//!     "tools/call",
//!     Some(json!({"name": "echo", "arguments": {"message": "hi"}})),
//!     RequestId::new_number(1),
//! );
//!
//! let json = request.to_json().unwrap();
//! let parsed = JsonRpcRequest::from_json(&json).unwrap();
//! assert_eq!(request, parsed);
//! ```

// Layer 1: Standard library imports
use std::fmt;

// Layer 2: Third-party crate imports
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// Layer 3: Internal module imports
use super::types::ProgressToken;

/// JSON-RPC protocol version tag carried by every message
pub const JSONRPC_VERSION: &str = "2.0";

/// Request ID supporting both string and numeric formats
///
/// JSON-RPC 2.0 allows request ids to be strings or numbers (null ids are
/// rejected on requests). The concrete wire variant is preserved on
/// deserialization so that a response echoes the exact id it was asked
/// with, and equality is variant-sensitive: `"1"` never matches `1`.
///
/// Numeric ids are constrained to the signed 64-bit range; a numeric id
/// outside that range fails deserialization (surfaced as a parse error).
///
/// # Examples
///
/// ```rust
/// use conduit_mcp::protocol::RequestId;
///
/// let string_id = RequestId::new_string("req-1");
/// let numeric_id = RequestId::new_number(1);
/// assert_ne!(string_id, RequestId::new_string("req-2"));
/// assert_ne!(numeric_id, RequestId::new_string("1"));
///
/// assert_eq!(serde_json::to_string(&string_id).unwrap(), r#""req-1""#);
/// assert_eq!(serde_json::to_string(&numeric_id).unwrap(), "1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric request identifier (signed 64-bit range)
    Number(i64),
    /// String-based request identifier
    String(String),
}

impl RequestId {
    /// Create a new string-based request ID
    pub fn new_string(id: impl Into<String>) -> Self {
        RequestId::String(id.into())
    }

    /// Create a new numeric request ID
    pub fn new_number(id: i64) -> Self {
        RequestId::Number(id)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::String(s) => write!(f, "{s}"),
            RequestId::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<i64> for RequestId {
    fn from(id: i64) -> Self {
        RequestId::Number(id)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        RequestId::String(id.to_string())
    }
}

/// Error object carried by a JSON-RPC error response
///
/// `code` uses the standard JSON-RPC ranges; implementation-defined codes
/// live in `[-32099, -32000]`. See [`crate::protocol::constants::error_codes`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// Numeric error code
    pub code: i32,
    /// Short human-readable error description
    pub message: String,
    /// Optional structured error details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorObject {
    /// Create a new error object without additional data
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Create a new error object with structured details
    pub fn with_data(code: i32, message: impl Into<String>, data: Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }
}

impl fmt::Display for ErrorObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

/// JSON-RPC 2.0 request message
///
/// A request invokes a method on the peer and expects exactly one
/// response or error carrying the same `id`, unless the request is
/// cancelled, in which case no reply is emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol version, always "2.0"
    pub jsonrpc: String,

    /// Name of the method to invoke
    pub method: String,

    /// Parameters for the method (object or array)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,

    /// Unique identifier for this request
    pub id: RequestId,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC 2.0 request
    pub fn new(method: impl Into<String>, params: Option<Value>, id: RequestId) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id,
        }
    }

    /// Extract the progress token from `params._meta.progressToken`, if any
    ///
    /// A request carrying a progress token authorizes the receiver to emit
    /// `notifications/progress` correlated by that token while the request
    /// is in flight.
    pub fn progress_token(&self) -> Option<ProgressToken> {
        let meta = self.params.as_ref()?.get("_meta")?;
        let token = meta.get("progressToken")?;
        serde_json::from_value(token.clone()).ok()
    }
}

/// JSON-RPC 2.0 notification message
///
/// A notification carries no `id` and never receives a reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// Protocol version, always "2.0"
    pub jsonrpc: String,

    /// Name of the notification method
    pub method: String,

    /// Parameters for the notification (object or array)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    /// Create a new JSON-RPC 2.0 notification
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC 2.0 success response
///
/// Carries the `result` of the correlated request. `result` is required
/// on the wire but may be JSON `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Protocol version, always "2.0"
    pub jsonrpc: String,

    /// Result of the method invocation (may be null)
    pub result: Value,

    /// Identifier of the request this responds to
    pub id: RequestId,
}

impl JsonRpcResponse {
    /// Create a successful response for the given request id
    pub fn new(result: Value, id: RequestId) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result,
            id,
        }
    }
}

/// JSON-RPC 2.0 error response
///
/// The error counterpart of [`JsonRpcResponse`]; a response carries
/// exactly one of `result` or `error`. The `id` is `None` only for
/// parse errors where the offending request id could not be recovered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Protocol version, always "2.0"
    pub jsonrpc: String,

    /// Error details
    pub error: ErrorObject,

    /// Identifier of the request this responds to (null for parse errors)
    pub id: Option<RequestId>,
}

impl JsonRpcError {
    /// Create an error response for the given request id
    pub fn new(error: ErrorObject, id: Option<RequestId>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            error,
            id,
        }
    }
}

/// Unified JSON-RPC message for transport framing and session dispatch
///
/// Variant order matters for untagged deserialization: a request is
/// distinguished by `method` + `id`, a notification by `method` alone,
/// and responses by the mutually exclusive `error` / `result` members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    /// Request message expecting a correlated reply
    Request(JsonRpcRequest),
    /// One-way notification
    Notification(JsonRpcNotification),
    /// Error response
    Error(JsonRpcError),
    /// Success response
    Response(JsonRpcResponse),
}

impl JsonRpcMessage {
    /// Create a request message
    pub fn request(method: impl Into<String>, params: Option<Value>, id: RequestId) -> Self {
        JsonRpcMessage::Request(JsonRpcRequest::new(method, params, id))
    }

    /// Create a notification message
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        JsonRpcMessage::Notification(JsonRpcNotification::new(method, params))
    }

    /// Create a success response message
    pub fn response(result: Value, id: RequestId) -> Self {
        JsonRpcMessage::Response(JsonRpcResponse::new(result, id))
    }

    /// Create an error response message
    pub fn error(error: ErrorObject, id: Option<RequestId>) -> Self {
        JsonRpcMessage::Error(JsonRpcError::new(error, id))
    }

    /// The request id this message carries, if any
    ///
    /// Notifications return `None`; parse-error responses may return `None`.
    pub fn id(&self) -> Option<&RequestId> {
        match self {
            JsonRpcMessage::Request(r) => Some(&r.id),
            JsonRpcMessage::Notification(_) => None,
            JsonRpcMessage::Response(r) => Some(&r.id),
            JsonRpcMessage::Error(e) => e.id.as_ref(),
        }
    }

    /// The method name, for requests and notifications
    pub fn method(&self) -> Option<&str> {
        match self {
            JsonRpcMessage::Request(r) => Some(&r.method),
            JsonRpcMessage::Notification(n) => Some(&n.method),
            _ => None,
        }
    }

    /// True for response and error messages
    pub fn is_reply(&self) -> bool {
        matches!(
            self,
            JsonRpcMessage::Response(_) | JsonRpcMessage::Error(_)
        )
    }
}

impl From<JsonRpcRequest> for JsonRpcMessage {
    fn from(request: JsonRpcRequest) -> Self {
        JsonRpcMessage::Request(request)
    }
}

impl From<JsonRpcNotification> for JsonRpcMessage {
    fn from(notification: JsonRpcNotification) -> Self {
        JsonRpcMessage::Notification(notification)
    }
}

impl From<JsonRpcResponse> for JsonRpcMessage {
    fn from(response: JsonRpcResponse) -> Self {
        JsonRpcMessage::Response(response)
    }
}

impl From<JsonRpcError> for JsonRpcMessage {
    fn from(error: JsonRpcError) -> Self {
        JsonRpcMessage::Error(error)
    }
}

/// Trait for JSON-RPC message serialization and deserialization
///
/// Provides shared conversion behavior for all message types. Any type
/// implementing `Serialize + Deserialize` gets the default
/// implementations for free.
pub trait JsonRpcMessageTrait: Serialize + for<'de> Deserialize<'de> {
    /// Serialize this message to a JSON string
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if serialization fails.
    fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize this message to pretty-printed JSON (debugging aid)
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if serialization fails.
    fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize from a JSON string
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if the input is not a valid message.
    fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize directly into a reusable buffer, avoiding the
    /// intermediate `String`
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if serialization fails.
    fn serialize_to_buffer(&self, buffer: &mut BytesMut) -> Result<(), serde_json::Error> {
        serde_json::to_writer(buffer.writer(), self)
    }

    /// Serialize this message to bytes
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if serialization fails.
    fn to_bytes(&self) -> Result<Bytes, serde_json::Error> {
        let mut buffer = BytesMut::with_capacity(256);
        self.serialize_to_buffer(&mut buffer)?;
        Ok(buffer.freeze())
    }

    /// Deserialize a message from JSON bytes
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if the bytes are not a valid message.
    fn from_json_bytes(json: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(json)
    }
}

impl JsonRpcMessageTrait for JsonRpcRequest {}
impl JsonRpcMessageTrait for JsonRpcNotification {}
impl JsonRpcMessageTrait for JsonRpcResponse {}
impl JsonRpcMessageTrait for JsonRpcError {}
impl JsonRpcMessageTrait for JsonRpcMessage {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_round_trip() {
        let request = JsonRpcRequest::new(
            "tools/call",
            Some(json!({"name": "echo"})),
            RequestId::new_number(7),
        );
        let text = request.to_json().unwrap();
        let parsed = JsonRpcRequest::from_json(&text).unwrap();
        assert_eq!(request, parsed);
        assert!(text.contains(r#""jsonrpc":"2.0""#));
        assert!(text.contains(r#""id":7"#));
    }

    #[test]
    fn request_id_variants_are_distinct() {
        assert_ne!(RequestId::new_string("1"), RequestId::new_number(1));
        assert_eq!(RequestId::new_number(1), RequestId::new_number(1));
    }

    #[test]
    fn request_id_preserves_wire_variant() {
        let string_id: RequestId = serde_json::from_str(r#""42""#).unwrap();
        let number_id: RequestId = serde_json::from_str("42").unwrap();
        assert_eq!(string_id, RequestId::new_string("42"));
        assert_eq!(number_id, RequestId::new_number(42));

        assert_eq!(serde_json::to_string(&string_id).unwrap(), r#""42""#);
        assert_eq!(serde_json::to_string(&number_id).unwrap(), "42");
    }

    #[test]
    fn request_id_rejects_out_of_range_integers() {
        // One past i64::MAX cannot be represented as a numeric id.
        let result: Result<RequestId, _> = serde_json::from_str("9223372036854775808");
        assert!(result.is_err());
    }

    #[test]
    fn message_classification() {
        let request: JsonRpcMessage =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).unwrap();
        assert!(matches!(request, JsonRpcMessage::Request(_)));

        let notification: JsonRpcMessage =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
                .unwrap();
        assert!(matches!(notification, JsonRpcMessage::Notification(_)));

        let response: JsonRpcMessage =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#).unwrap();
        assert!(matches!(response, JsonRpcMessage::Response(_)));

        let error: JsonRpcMessage = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"no such method"}}"#,
        )
        .unwrap();
        assert!(matches!(error, JsonRpcMessage::Error(_)));
    }

    #[test]
    fn null_result_is_a_valid_response() {
        let message: JsonRpcMessage =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":3,"result":null}"#).unwrap();
        match message {
            JsonRpcMessage::Response(r) => assert_eq!(r.result, Value::Null),
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn notification_has_no_id() {
        let notification = JsonRpcNotification::new("notifications/progress", None);
        let text = notification.to_json().unwrap();
        assert!(!text.contains("\"id\""));
    }

    #[test]
    fn progress_token_extraction() {
        let request = JsonRpcRequest::new(
            "tools/call",
            Some(json!({
                "name": "slow",
                "arguments": {},
                "_meta": {"progressToken": "tok-1"}
            })),
            RequestId::new_number(1),
        );
        assert_eq!(
            request.progress_token(),
            Some(ProgressToken::String("tok-1".to_string()))
        );

        let numeric = JsonRpcRequest::new(
            "tools/call",
            Some(json!({"_meta": {"progressToken": 9}})),
            RequestId::new_number(2),
        );
        assert_eq!(numeric.progress_token(), Some(ProgressToken::Number(9)));

        let absent = JsonRpcRequest::new("ping", None, RequestId::new_number(3));
        assert_eq!(absent.progress_token(), None);
    }

    #[test]
    fn error_response_without_id() {
        let error = JsonRpcError::new(ErrorObject::new(-32700, "parse error"), None);
        let text = error.to_json().unwrap();
        assert!(text.contains(r#""id":null"#));
        let parsed = JsonRpcError::from_json(&text).unwrap();
        assert_eq!(parsed.id, None);
    }

    #[test]
    fn bytes_round_trip() {
        let message = JsonRpcMessage::response(json!({"ok": true}), RequestId::new_number(1));
        let bytes = message.to_bytes().unwrap();
        let parsed = JsonRpcMessage::from_json_bytes(&bytes).unwrap();
        assert_eq!(message, parsed);
    }
}
