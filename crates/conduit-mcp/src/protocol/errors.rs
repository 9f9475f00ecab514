//! Protocol Error Handling
//!
//! Two layers of errors live here:
//!
//! - [`RpcError`]: the typed counterpart of a JSON-RPC error object, with
//!   constructors for the standard codes. It converts losslessly to and
//!   from the wire-level [`ErrorObject`].
//! - [`ProtocolError`]: crate-level failures around message construction
//!   and validation that never cross the wire directly.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use serde_json::Value;
use thiserror::Error;

// Layer 3: Internal module imports
use super::constants::error_codes;
use super::message::ErrorObject;

/// Typed JSON-RPC error with standard-code constructors
///
/// # Examples
///
/// ```rust
/// use conduit_mcp::protocol::RpcError;
///
/// let err = RpcError::method_not_found("tools/unknown");
/// assert_eq!(err.code(), -32601);
/// ```
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RpcError {
    /// Malformed JSON from the peer (-32700)
    #[error("Parse error: {message}")]
    ParseError { message: String },

    /// The message was not a valid request (-32600)
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// Unknown method (-32601)
    #[error("Method not found: {method}")]
    MethodNotFound { method: String },

    /// Parameter binding or schema validation failed (-32602)
    #[error("Invalid params: {message}")]
    InvalidParams { message: String },

    /// Internal failure while handling the request (-32603)
    #[error("Internal error: {message}")]
    InternalError { message: String },

    /// Implementation-defined error with an explicit code
    #[error("Server error {code}: {message}")]
    ServerError {
        code: i32,
        message: String,
        data: Option<Value>,
    },
}

impl RpcError {
    /// Create a parse error
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::ParseError {
            message: message.into(),
        }
    }

    /// Create an invalid request error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Create a method not found error
    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::MethodNotFound {
            method: method.into(),
        }
    }

    /// Create an invalid parameters error
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }

    /// Create a server error with an implementation-defined code
    pub fn server_error(code: i32, message: impl Into<String>) -> Self {
        Self::ServerError {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// The JSON-RPC error code for this error
    pub fn code(&self) -> i32 {
        match self {
            RpcError::ParseError { .. } => error_codes::PARSE_ERROR,
            RpcError::InvalidRequest { .. } => error_codes::INVALID_REQUEST,
            RpcError::MethodNotFound { .. } => error_codes::METHOD_NOT_FOUND,
            RpcError::InvalidParams { .. } => error_codes::INVALID_PARAMS,
            RpcError::InternalError { .. } => error_codes::INTERNAL_ERROR,
            RpcError::ServerError { code, .. } => *code,
        }
    }

    /// Convert to the wire-level error object
    pub fn to_error_object(&self) -> ErrorObject {
        let data = match self {
            RpcError::ServerError { data, .. } => data.clone(),
            _ => None,
        };
        ErrorObject {
            code: self.code(),
            message: self.to_string(),
            data,
        }
    }
}

impl From<ErrorObject> for RpcError {
    fn from(object: ErrorObject) -> Self {
        match object.code {
            error_codes::PARSE_ERROR => Self::ParseError {
                message: object.message,
            },
            error_codes::INVALID_REQUEST => Self::InvalidRequest {
                message: object.message,
            },
            error_codes::METHOD_NOT_FOUND => Self::MethodNotFound {
                method: object.message,
            },
            error_codes::INVALID_PARAMS => Self::InvalidParams {
                message: object.message,
            },
            error_codes::INTERNAL_ERROR => Self::InternalError {
                message: object.message,
            },
            code => Self::ServerError {
                code,
                message: object.message,
                data: object.data,
            },
        }
    }
}

impl From<RpcError> for ErrorObject {
    fn from(error: RpcError) -> Self {
        error.to_error_object()
    }
}

/// Crate-level protocol failures outside the JSON-RPC error space
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    /// Serialization or deserialization failed
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// A message violated a structural invariant
    #[error("Invalid message: {message}")]
    InvalidMessage { message: String },

    /// The protocol version string is not of the form YYYY-MM-DD
    #[error("Invalid protocol version: {0}")]
    InvalidProtocolVersion(String),

    /// The URI failed validation
    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    /// The MIME type failed validation
    #[error("Invalid MIME type: {0}")]
    InvalidMimeType(String),

    /// Base64 payload failed validation
    #[error("Invalid base64 data")]
    InvalidBase64Data,

    /// A pagination cursor could not be decoded
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),
}

/// Convenient result type for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}
