//! Tool Messages
//!
//! Descriptors and request/result types for tool discovery and
//! invocation. A tool result is never a JSON-RPC error: execution
//! failures and timeouts travel inside [`CallToolResult`] with
//! `isError: true`, so only protocol-level faults (unknown tool,
//! argument binding) surface as error responses.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::protocol::types::{Content, Cursor};

/// A tool available for invocation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    /// Unique name the tool is invoked by
    pub name: String,

    /// Human-readable title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// What the tool does
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// JSON Schema describing the argument object
    pub input_schema: Value,

    /// JSON Schema describing `structuredContent` in results
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,

    /// Behavioral hints (read-only, destructive, idempotent, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Value>,

    /// Execution options
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<ToolExecution>,

    /// Attached metadata entries
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

/// Execution options advertised on a tool descriptor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ToolExecution {
    /// Whether the tool's results may be delivered through the task store
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_support: Option<bool>,
}

impl Tool {
    /// Create a tool descriptor with the given input schema
    pub fn new(name: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            title: None,
            description: None,
            input_schema,
            output_schema: None,
            annotations: None,
            execution: None,
            meta: None,
        }
    }

    /// The argument names listed as required by the input schema
    pub fn required_arguments(&self) -> Vec<&str> {
        self.input_schema
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

/// Parameters of `tools/list`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ListToolsRequest {
    /// Opaque continuation cursor from a previous page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Cursor>,
}

/// Result of `tools/list`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsResult {
    /// One page of tool descriptors
    pub tools: Vec<Tool>,
    /// Cursor for the next page, absent on the last page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<Cursor>,
}

/// Parameters of `tools/call`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallToolRequest {
    /// Name of the tool to invoke
    pub name: String,

    /// Argument object, validated against the tool's input schema
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Map<String, Value>>,

    /// Request metadata (progress token and friends); carried verbatim
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl CallToolRequest {
    /// Create a call request with an argument object
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            arguments: Some(arguments),
            meta: None,
        }
    }

    /// Create a call request without arguments
    pub fn no_args(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: None,
            meta: None,
        }
    }
}

/// Result of `tools/call`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    /// Content blocks produced by the tool
    pub content: Vec<Content>,

    /// Machine-readable result, present for typed tool outputs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,

    /// Whether the invocation failed (execution failure, not protocol)
    #[serde(default)]
    pub is_error: bool,

    /// Result metadata; carries `{"isTimeout": true}` on tool timeout
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl CallToolResult {
    /// Successful result with content blocks
    pub fn success(content: Vec<Content>) -> Self {
        Self {
            content,
            structured_content: None,
            is_error: false,
            meta: None,
        }
    }

    /// Successful result with a single text block
    pub fn text(text: impl Into<String>) -> Self {
        Self::success(vec![Content::text(text)])
    }

    /// Failed result carrying an error description
    pub fn error_text(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(text)],
            structured_content: None,
            is_error: true,
            meta: None,
        }
    }

    /// Failed result marking a tool-level timeout
    pub fn timeout() -> Self {
        Self {
            content: vec![Content::text("tool execution timed out")],
            structured_content: None,
            is_error: true,
            meta: Some(serde_json::json!({"isTimeout": true})),
        }
    }

    /// Attach structured content
    pub fn with_structured_content(mut self, value: Value) -> Self {
        self.structured_content = Some(value);
        self
    }

    /// Whether this result marks a tool-level timeout
    pub fn is_timeout(&self) -> bool {
        self.meta
            .as_ref()
            .and_then(|meta| meta.get("isTimeout"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// The text of the first content block, if any
    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(Content::as_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_wire_shape() {
        let tool = Tool::new(
            "echo",
            json!({
                "type": "object",
                "properties": {"message": {"type": "string"}},
                "required": ["message"]
            }),
        );
        let value = serde_json::to_value(&tool).unwrap();
        assert!(value.get("inputSchema").is_some());
        assert!(value.get("outputSchema").is_none());
        assert_eq!(tool.required_arguments(), vec!["message"]);
    }

    #[test]
    fn call_request_parses_spec_example() {
        let request: CallToolRequest = serde_json::from_value(json!({
            "name": "echo",
            "arguments": {"message": "hi"}
        }))
        .unwrap();
        assert_eq!(request.name, "echo");
        assert_eq!(request.arguments.unwrap()["message"], "hi");
    }

    #[test]
    fn result_error_flag_defaults_false() {
        let result: CallToolResult = serde_json::from_value(json!({
            "content": [{"type": "text", "text": "ok"}]
        }))
        .unwrap();
        assert!(!result.is_error);
        assert_eq!(result.first_text(), Some("ok"));
    }

    #[test]
    fn timeout_result_marks_meta() {
        let result = CallToolResult::timeout();
        assert!(result.is_error);
        assert!(result.is_timeout());
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["_meta"]["isTimeout"], true);
    }

    #[test]
    fn list_result_round_trip() {
        let result = ListToolsResult {
            tools: vec![Tool::new("a", json!({"type": "object"}))],
            next_cursor: Some(Cursor::from_index(1)),
        };
        let text = serde_json::to_string(&result).unwrap();
        assert!(text.contains("nextCursor"));
        let parsed: ListToolsResult = serde_json::from_str(&text).unwrap();
        assert_eq!(result, parsed);
    }
}
