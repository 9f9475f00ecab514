//! Resource Messages
//!
//! Descriptors and request/result types for resource discovery, reads,
//! templates, and the subscription operations backing
//! `notifications/resources/updated`.

use serde::{Deserialize, Serialize};

use crate::protocol::types::{Cursor, MimeType, ResourceContents, Uri};

/// A concrete resource addressed by URI
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    /// URI the resource is read by
    pub uri: Uri,

    /// Unique name of the resource
    pub name: String,

    /// Human-readable title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// What the resource contains
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// MIME type of the contents
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<MimeType>,

    /// Attached metadata entries
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

impl Resource {
    /// Create a resource descriptor
    pub fn new(uri: Uri, name: impl Into<String>) -> Self {
        Self {
            uri,
            name: name.into(),
            title: None,
            description: None,
            mime_type: None,
            meta: None,
        }
    }

    /// Attach a MIME type
    pub fn with_mime_type(mut self, mime_type: MimeType) -> Self {
        self.mime_type = Some(mime_type);
        self
    }

    /// Attach a description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A parameterized resource addressed by URI template
///
/// Templates use `{name}` placeholders in the RFC 6570 simple-expansion
/// subset; `file:///logs/{date}.log` matches `file:///logs/2026-08-01.log`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTemplate {
    /// URI template with `{name}` placeholders
    pub uri_template: String,

    /// Unique name of the template
    pub name: String,

    /// Human-readable title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// What the expanded resources contain
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// MIME type of the expanded resources
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<MimeType>,
}

impl ResourceTemplate {
    /// Create a resource template descriptor
    pub fn new(uri_template: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uri_template: uri_template.into(),
            name: name.into(),
            title: None,
            description: None,
            mime_type: None,
        }
    }
}

/// Parameters of `resources/list`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ListResourcesRequest {
    /// Opaque continuation cursor from a previous page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Cursor>,
}

/// Result of `resources/list`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ListResourcesResult {
    /// One page of resource descriptors
    pub resources: Vec<Resource>,
    /// Cursor for the next page, absent on the last page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<Cursor>,
}

/// Parameters of `resources/templates/list`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ListResourceTemplatesRequest {
    /// Opaque continuation cursor from a previous page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Cursor>,
}

/// Result of `resources/templates/list`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ListResourceTemplatesResult {
    /// One page of template descriptors
    pub resource_templates: Vec<ResourceTemplate>,
    /// Cursor for the next page, absent on the last page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<Cursor>,
}

/// Parameters of `resources/read`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReadResourceRequest {
    /// URI to read
    pub uri: Uri,
}

/// Result of `resources/read`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReadResourceResult {
    /// Contents of the resource (possibly several representations)
    pub contents: Vec<ResourceContents>,
}

/// Parameters of `resources/subscribe`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubscribeRequest {
    /// URI to watch for updates
    pub uri: Uri,
}

/// Parameters of `resources/unsubscribe`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnsubscribeRequest {
    /// URI to stop watching
    pub uri: Uri,
}

/// Parameters of `notifications/resources/updated`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceUpdatedNotification {
    /// URI of the resource that changed
    pub uri: Uri,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resource_descriptor_shape() {
        let resource = Resource::new(Uri::new_unchecked("file:///readme.md"), "readme")
            .with_mime_type(MimeType::new("text/markdown").unwrap());
        let value = serde_json::to_value(&resource).unwrap();
        assert_eq!(value["uri"], "file:///readme.md");
        assert_eq!(value["mimeType"], "text/markdown");
    }

    #[test]
    fn template_uses_camel_case_key() {
        let template = ResourceTemplate::new("file:///logs/{date}.log", "log-by-date");
        let value = serde_json::to_value(&template).unwrap();
        assert!(value.get("uriTemplate").is_some());
    }

    #[test]
    fn read_result_round_trip() {
        let result = ReadResourceResult {
            contents: vec![ResourceContents::text(
                Uri::new_unchecked("mem://note"),
                "contents",
            )],
        };
        let text = serde_json::to_string(&result).unwrap();
        let parsed: ReadResourceResult = serde_json::from_str(&text).unwrap();
        assert_eq!(result, parsed);
    }

    #[test]
    fn subscribe_request_parses() {
        let request: SubscribeRequest =
            serde_json::from_value(json!({"uri": "file:///watched.txt"})).unwrap();
        assert_eq!(request.uri.as_str(), "file:///watched.txt");
    }
}
