//! Capability Structures for Protocol Negotiation
//!
//! Capabilities gate every optional protocol feature: a peer may only use
//! an operation whose capability the other side advertised during the
//! `initialize` handshake. Server capabilities are derived from the
//! primitive registry at initialize time; client capabilities come from
//! the client builder.

use serde::{Deserialize, Serialize};

/// Capabilities advertised by a client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClientCapabilities {
    /// Experimental, implementation-specific capabilities
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<serde_json::Value>,

    /// Client can satisfy `sampling/createMessage` requests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling: Option<SamplingCapability>,

    /// Client exposes filesystem roots via `roots/list`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roots: Option<RootsCapability>,

    /// Client can satisfy `elicitation/create` requests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elicitation: Option<ElicitationCapability>,
}

/// Capabilities advertised by a server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerCapabilities {
    /// Experimental, implementation-specific capabilities
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<serde_json::Value>,

    /// Server emits `notifications/message`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingCapability>,

    /// Server exposes prompts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<PromptsCapability>,

    /// Server exposes resources
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesCapability>,

    /// Server exposes tools
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,

    /// Server supports deferred tool results through a task store
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks: Option<TasksCapability>,
}

/// Tool capability flags
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ToolsCapability {
    /// Server emits `notifications/tools/list_changed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Prompt capability flags
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PromptsCapability {
    /// Server emits `notifications/prompts/list_changed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Resource capability flags
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResourcesCapability {
    /// Server accepts `resources/subscribe`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<bool>,

    /// Server emits `notifications/resources/list_changed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Logging capability marker (no flags yet)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LoggingCapability {}

/// Task-store capability marker (no flags yet)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TasksCapability {}

/// Sampling capability marker (client side, no flags yet)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SamplingCapability {}

/// Elicitation capability marker (client side, no flags yet)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ElicitationCapability {}

/// Roots capability flags (client side)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RootsCapability {
    /// Client emits `notifications/roots/list_changed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

impl ClientCapabilities {
    /// Enable sampling support
    pub fn with_sampling(mut self) -> Self {
        self.sampling = Some(SamplingCapability {});
        self
    }

    /// Enable roots support
    pub fn with_roots(mut self, list_changed: bool) -> Self {
        self.roots = Some(RootsCapability {
            list_changed: Some(list_changed),
        });
        self
    }

    /// Enable elicitation support
    pub fn with_elicitation(mut self) -> Self {
        self.elicitation = Some(ElicitationCapability {});
        self
    }
}

impl ServerCapabilities {
    /// Whether tool list-change notifications were negotiated
    pub fn tools_list_changed(&self) -> bool {
        self.tools
            .as_ref()
            .and_then(|t| t.list_changed)
            .unwrap_or(false)
    }

    /// Whether prompt list-change notifications were negotiated
    pub fn prompts_list_changed(&self) -> bool {
        self.prompts
            .as_ref()
            .and_then(|p| p.list_changed)
            .unwrap_or(false)
    }

    /// Whether resource list-change notifications were negotiated
    pub fn resources_list_changed(&self) -> bool {
        self.resources
            .as_ref()
            .and_then(|r| r.list_changed)
            .unwrap_or(false)
    }

    /// Whether resource subscriptions were negotiated
    pub fn resources_subscribe(&self) -> bool {
        self.resources
            .as_ref()
            .and_then(|r| r.subscribe)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_capabilities_serialize_to_empty_objects() {
        let caps = ServerCapabilities::default();
        let json = serde_json::to_value(&caps).unwrap();
        assert_eq!(json, serde_json::json!({}));
    }

    #[test]
    fn list_changed_uses_camel_case_on_the_wire() {
        let caps = ServerCapabilities {
            tools: Some(ToolsCapability {
                list_changed: Some(true),
            }),
            ..Default::default()
        };
        let json = serde_json::to_value(&caps).unwrap();
        assert_eq!(json["tools"]["listChanged"], true);
    }

    #[test]
    fn client_capability_builders() {
        let caps = ClientCapabilities::default()
            .with_sampling()
            .with_roots(true);
        assert!(caps.sampling.is_some());
        assert_eq!(caps.roots.unwrap().list_changed, Some(true));
        assert!(caps.elicitation.is_none());
    }

    #[test]
    fn capability_round_trip() {
        let caps = ServerCapabilities {
            resources: Some(ResourcesCapability {
                subscribe: Some(true),
                list_changed: Some(false),
            }),
            logging: Some(LoggingCapability {}),
            ..Default::default()
        };
        let json = serde_json::to_string(&caps).unwrap();
        let parsed: ServerCapabilities = serde_json::from_str(&json).unwrap();
        assert_eq!(caps, parsed);
        assert!(parsed.resources_subscribe());
        assert!(!parsed.resources_list_changed());
    }
}
