//! Prompt Messages
//!
//! Descriptors and request/result types for prompt discovery and
//! rendering.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::protocol::types::{Content, Cursor};

/// A prompt template available for rendering
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prompt {
    /// Unique name the prompt is fetched by
    pub name: String,

    /// Human-readable title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// What the prompt produces
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Arguments the prompt accepts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<PromptArgument>,

    /// Attached metadata entries
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

impl Prompt {
    /// Create a prompt descriptor
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: None,
            description: None,
            arguments: Vec::new(),
            meta: None,
        }
    }

    /// Add an argument to the descriptor
    pub fn with_argument(mut self, argument: PromptArgument) -> Self {
        self.arguments.push(argument);
        self
    }

    /// Names of the arguments marked required
    pub fn required_arguments(&self) -> Vec<&str> {
        self.arguments
            .iter()
            .filter(|a| a.required)
            .map(|a| a.name.as_str())
            .collect()
    }
}

/// One declared prompt argument
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptArgument {
    /// Argument name
    pub name: String,

    /// What the argument controls
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Whether the argument must be supplied
    #[serde(default)]
    pub required: bool,
}

impl PromptArgument {
    /// Create a required argument
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            required: true,
        }
    }

    /// Create an optional argument
    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            required: false,
        }
    }

    /// Attach a description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Role of a prompt message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Message authored by the user
    User,
    /// Message authored by the assistant
    Assistant,
}

/// One message of a rendered prompt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptMessage {
    /// Who the message is attributed to
    pub role: Role,
    /// Message content
    pub content: Content,
}

impl PromptMessage {
    /// Create a user text message
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Content::text(text),
        }
    }

    /// Create an assistant text message
    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Content::text(text),
        }
    }
}

/// Parameters of `prompts/list`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ListPromptsRequest {
    /// Opaque continuation cursor from a previous page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Cursor>,
}

/// Result of `prompts/list`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ListPromptsResult {
    /// One page of prompt descriptors
    pub prompts: Vec<Prompt>,
    /// Cursor for the next page, absent on the last page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<Cursor>,
}

/// Parameters of `prompts/get`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GetPromptRequest {
    /// Name of the prompt to render
    pub name: String,

    /// Argument values keyed by argument name
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub arguments: HashMap<String, String>,
}

/// Result of `prompts/get`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GetPromptResult {
    /// Description of the rendered prompt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// The rendered messages
    pub messages: Vec<PromptMessage>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prompt_descriptor_shape() {
        let prompt = Prompt::new("greeting")
            .with_argument(PromptArgument::required("name"))
            .with_argument(PromptArgument::optional("tone").with_description("formal or casual"));
        assert_eq!(prompt.required_arguments(), vec!["name"]);

        let value = serde_json::to_value(&prompt).unwrap();
        assert_eq!(value["arguments"][0]["required"], true);
        assert_eq!(value["arguments"][1]["required"], false);
    }

    #[test]
    fn role_serializes_lowercase() {
        let message = PromptMessage::user_text("hello");
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["role"], "user");
    }

    #[test]
    fn get_prompt_request_defaults() {
        let request: GetPromptRequest = serde_json::from_value(json!({"name": "greeting"})).unwrap();
        assert!(request.arguments.is_empty());
    }

    #[test]
    fn get_prompt_result_round_trip() {
        let result = GetPromptResult {
            description: Some("a greeting".to_string()),
            messages: vec![
                PromptMessage::user_text("hi"),
                PromptMessage::assistant_text("hello there"),
            ],
        };
        let text = serde_json::to_string(&result).unwrap();
        let parsed: GetPromptResult = serde_json::from_str(&text).unwrap();
        assert_eq!(result, parsed);
    }
}
