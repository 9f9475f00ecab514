//! Initialization Handshake Messages
//!
//! The `initialize` request opens every session: the client proposes a
//! protocol version and declares its capabilities, the server answers
//! with the negotiated version and its own capability set, and the
//! client confirms with `notifications/initialized`. Every other method
//! is gated behind this exchange.

use serde::{Deserialize, Serialize};

use super::capabilities::{ClientCapabilities, ServerCapabilities};
use crate::protocol::types::{ClientInfo, ProtocolVersion, ServerInfo};

/// Parameters of the `initialize` request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InitializeRequest {
    /// Protocol version the client wants to speak
    pub protocol_version: ProtocolVersion,

    /// Capabilities the client supports
    pub capabilities: ClientCapabilities,

    /// Identification of the client application
    pub client_info: ClientInfo,
}

impl InitializeRequest {
    /// Create an initialize request for the current protocol version
    pub fn new(client_info: ClientInfo, capabilities: ClientCapabilities) -> Self {
        Self {
            protocol_version: ProtocolVersion::current(),
            capabilities,
            client_info,
        }
    }
}

/// Result of the `initialize` request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    /// Version the server selected (≤ the requested version)
    pub protocol_version: ProtocolVersion,

    /// Capabilities the server supports
    pub capabilities: ServerCapabilities,

    /// Identification of the server application
    pub server_info: ServerInfo,

    /// Optional usage instructions surfaced to the model
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

impl InitializeResult {
    /// Create an initialize result
    pub fn new(
        protocol_version: ProtocolVersion,
        capabilities: ServerCapabilities,
        server_info: ServerInfo,
        instructions: Option<String>,
    ) -> Self {
        Self {
            protocol_version,
            capabilities,
            server_info,
            instructions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn initialize_request_wire_shape() {
        let request = InitializeRequest::new(
            ClientInfo {
                name: "client".to_string(),
                version: "0.1.0".to_string(),
            },
            ClientCapabilities::default(),
        );
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("protocolVersion").is_some());
        assert!(value.get("clientInfo").is_some());
        assert_eq!(value["capabilities"], json!({}));
    }

    #[test]
    fn initialize_request_parses_spec_example() {
        let request: InitializeRequest = serde_json::from_value(json!({
            "protocolVersion": "2024-11-05",
            "clientInfo": {"name": "c", "version": "0"},
            "capabilities": {}
        }))
        .unwrap();
        assert_eq!(request.protocol_version.as_str(), "2024-11-05");
        assert_eq!(request.client_info.name, "c");
    }

    #[test]
    fn initialize_result_round_trip() {
        let result = InitializeResult::new(
            ProtocolVersion::current(),
            ServerCapabilities::default(),
            ServerInfo {
                name: "server".to_string(),
                version: "1.0.0".to_string(),
            },
            Some("call tools/list first".to_string()),
        );
        let json = serde_json::to_string(&result).unwrap();
        let parsed: InitializeResult = serde_json::from_str(&json).unwrap();
        assert_eq!(result, parsed);
    }
}
