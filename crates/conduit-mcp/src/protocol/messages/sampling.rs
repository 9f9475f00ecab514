//! Server-Initiated Requests
//!
//! Messages for the operations a server may drive against a connected
//! client from inside a handler: model sampling, filesystem roots, and
//! user elicitation. Each is gated on the corresponding client
//! capability negotiated at initialize time.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::prompts::Role;
use crate::protocol::types::{Content, Uri};

/// One message of a sampling conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SamplingMessage {
    /// Who the message is attributed to
    pub role: Role,
    /// Message content
    pub content: Content,
}

/// Parameters of `sampling/createMessage`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageRequest {
    /// Conversation so far
    pub messages: Vec<SamplingMessage>,

    /// Upper bound on tokens to sample
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,

    /// Optional system prompt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    /// Model selection hints, passed through to the client verbatim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_preferences: Option<Value>,
}

/// Result of `sampling/createMessage`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageResult {
    /// Role of the sampled message (normally assistant)
    pub role: Role,

    /// Sampled content
    pub content: Content,

    /// Model that produced the sample
    pub model: String,

    /// Why sampling stopped, when reported
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}

/// One filesystem root exposed by the client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Root {
    /// Root URI (normally a `file://` URI)
    pub uri: Uri,

    /// Human-readable name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Result of `roots/list`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListRootsResult {
    /// The client's current roots
    pub roots: Vec<Root>,
}

/// Parameters of `elicitation/create`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ElicitRequest {
    /// What the server is asking the user for
    pub message: String,

    /// JSON Schema of the expected answer object
    pub requested_schema: Value,
}

/// How the user responded to an elicitation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ElicitAction {
    /// User supplied the requested data
    Accept,
    /// User explicitly declined
    Decline,
    /// User dismissed the request
    Cancel,
}

/// Result of `elicitation/create`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ElicitResult {
    /// How the user responded
    pub action: ElicitAction,

    /// The answer object when the action is `accept`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_message_request_shape() {
        let request = CreateMessageRequest {
            messages: vec![SamplingMessage {
                role: Role::User,
                content: Content::text("summarize this"),
            }],
            max_tokens: Some(256),
            system_prompt: None,
            temperature: None,
            model_preferences: None,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["maxTokens"], 256);
        assert_eq!(value["messages"][0]["role"], "user");
    }

    #[test]
    fn elicit_result_actions() {
        let accepted: ElicitResult =
            serde_json::from_value(json!({"action": "accept", "content": {"name": "x"}})).unwrap();
        assert_eq!(accepted.action, ElicitAction::Accept);

        let declined: ElicitResult = serde_json::from_value(json!({"action": "decline"})).unwrap();
        assert_eq!(declined.action, ElicitAction::Decline);
        assert!(declined.content.is_none());
    }

    #[test]
    fn roots_round_trip() {
        let result = ListRootsResult {
            roots: vec![Root {
                uri: Uri::new_unchecked("file:///workspace"),
                name: Some("workspace".to_string()),
            }],
        };
        let text = serde_json::to_string(&result).unwrap();
        let parsed: ListRootsResult = serde_json::from_str(&text).unwrap();
        assert_eq!(result, parsed);
    }
}
