//! Registered Tools and the Invocation Pipeline
//!
//! A [`RegisteredTool`] pairs a wire descriptor with its handler, the
//! compiled argument validator, an optional per-tool timeout, and an
//! optional structured-output validator. Invocation walks the spec'd
//! pipeline: bind arguments against `inputSchema`, run the handler
//! under its cancellation scope, then map whatever the handler
//! returned into a [`CallToolResult`].
//!
//! Execution failures never become JSON-RPC errors: they are captured
//! as `isError` results. Only protocol-level faults (unknown tool,
//! argument binding) bubble out.

// Layer 1: Standard library imports
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

// Layer 3: Internal module imports
use super::schema::SchemaValidator;
use super::{Primitive, RegistryError};
use crate::protocol::types::meta_object;
use crate::protocol::{
    CallToolResult, Content, MetaEntry, MimeType, ResourceContents, RpcError, Tool, ToolExecution,
};
use crate::session::RequestContext;

/// What a tool handler may hand back
///
/// Everything except a native [`CallToolResult`] is wrapped per the
/// result-mapping rules: strings become a text block, blobs an image
/// block, resource contents an embedded-resource block, and arbitrary
/// JSON is attached both as text and as `structuredContent`.
#[derive(Debug)]
pub enum ToolOutput {
    /// Pass the result through untouched
    Result(CallToolResult),
    /// A single text block
    Text(String),
    /// A binary payload
    Blob {
        /// Raw bytes, base64-encoded on the wire
        data: Vec<u8>,
        /// MIME type of the payload
        mime_type: MimeType,
    },
    /// Embedded resource contents
    Resource(ResourceContents),
    /// Structured output; validated against `outputSchema` if declared
    Json(Value),
}

impl From<String> for ToolOutput {
    fn from(text: String) -> Self {
        ToolOutput::Text(text)
    }
}

impl From<&str> for ToolOutput {
    fn from(text: &str) -> Self {
        ToolOutput::Text(text.to_string())
    }
}

impl From<CallToolResult> for ToolOutput {
    fn from(result: CallToolResult) -> Self {
        ToolOutput::Result(result)
    }
}

impl From<Value> for ToolOutput {
    fn from(value: Value) -> Self {
        ToolOutput::Json(value)
    }
}

/// Tool failure, split by where it surfaces
#[derive(Debug, Error)]
pub enum ToolError {
    /// Execution failure; captured as an `isError` result
    #[error("{0}")]
    Execution(String),

    /// Protocol fault; bubbles as a JSON-RPC error response
    #[error(transparent)]
    Protocol(RpcError),
}

impl ToolError {
    /// Execution failure from any displayable error
    pub fn execution(message: impl std::fmt::Display) -> Self {
        Self::Execution(message.to_string())
    }
}

impl From<String> for ToolError {
    fn from(message: String) -> Self {
        ToolError::Execution(message)
    }
}

impl From<&str> for ToolError {
    fn from(message: &str) -> Self {
        ToolError::Execution(message.to_string())
    }
}

/// The invocable side of a tool
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Execute with bound arguments under the invocation's context
    async fn call(
        &self,
        arguments: Map<String, Value>,
        context: RequestContext,
    ) -> Result<ToolOutput, ToolError>;
}

/// Adapter turning an async closure into a [`ToolHandler`]
struct FnToolHandler<F> {
    function: F,
}

#[async_trait]
impl<F, Fut> ToolHandler for FnToolHandler<F>
where
    F: Fn(Map<String, Value>, RequestContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ToolOutput, ToolError>> + Send,
{
    async fn call(
        &self,
        arguments: Map<String, Value>,
        context: RequestContext,
    ) -> Result<ToolOutput, ToolError> {
        (self.function)(arguments, context).await
    }
}

/// A tool wired into the registry
pub struct RegisteredTool {
    descriptor: Tool,
    handler: Arc<dyn ToolHandler>,
    timeout: Option<Duration>,
    input_validator: Option<SchemaValidator>,
    output_validator: Option<SchemaValidator>,
}

impl Primitive for RegisteredTool {
    fn name(&self) -> &str {
        &self.descriptor.name
    }
}

impl RegisteredTool {
    /// Start building a tool registration
    pub fn builder(name: impl Into<String>) -> ToolBuilder {
        ToolBuilder::new(name)
    }

    /// The wire descriptor served by `tools/list`
    pub fn descriptor(&self) -> &Tool {
        &self.descriptor
    }

    /// The per-tool timeout, if one was registered
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Bind and validate the raw argument object
    ///
    /// # Errors
    ///
    /// Returns `InvalidParams` when the arguments violate `inputSchema`.
    pub fn bind_arguments(
        &self,
        arguments: Option<Map<String, Value>>,
    ) -> Result<Map<String, Value>, RpcError> {
        let arguments = arguments.unwrap_or_default();
        if let Some(validator) = &self.input_validator {
            validator
                .validate(&Value::Object(arguments.clone()))
                .map_err(|violation| {
                    RpcError::invalid_params(format!(
                        "arguments for {:?} rejected: {violation}",
                        self.descriptor.name
                    ))
                })?;
        }
        Ok(arguments)
    }

    /// Run the handler and map its output into a [`CallToolResult`]
    ///
    /// # Errors
    ///
    /// Returns an `RpcError` only for protocol-level faults; execution
    /// failures come back as `Ok` results with `isError: true`.
    pub async fn invoke(
        &self,
        arguments: Map<String, Value>,
        context: RequestContext,
    ) -> Result<CallToolResult, RpcError> {
        match self.handler.call(arguments, context).await {
            Ok(output) => self.map_output(output),
            Err(ToolError::Execution(message)) => {
                debug!(tool = %self.descriptor.name, %message, "tool execution failed");
                Ok(CallToolResult::error_text(message))
            }
            Err(ToolError::Protocol(error)) => Err(error),
        }
    }

    fn map_output(&self, output: ToolOutput) -> Result<CallToolResult, RpcError> {
        let result = match output {
            ToolOutput::Result(result) => result,
            ToolOutput::Text(text) => CallToolResult::text(text),
            ToolOutput::Blob { data, mime_type } => {
                CallToolResult::success(vec![Content::image(&data, mime_type)])
            }
            ToolOutput::Resource(contents) => {
                CallToolResult::success(vec![Content::resource(contents)])
            }
            ToolOutput::Json(value) => {
                if let Some(validator) = &self.output_validator {
                    validator.validate(&value).map_err(|violation| {
                        RpcError::internal_error(format!(
                            "structured output of {:?} violates its schema: {violation}",
                            self.descriptor.name
                        ))
                    })?;
                }
                let text = value.to_string();
                CallToolResult::text(text).with_structured_content(value)
            }
        };
        Ok(result)
    }
}

impl std::fmt::Debug for RegisteredTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredTool")
            .field("name", &self.descriptor.name)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Builder for [`RegisteredTool`]
pub struct ToolBuilder {
    name: String,
    title: Option<String>,
    description: Option<String>,
    input_schema: Value,
    output_schema: Option<Value>,
    annotations: Option<Value>,
    meta: Vec<MetaEntry>,
    timeout: Option<Duration>,
    task_support: bool,
    handler: Option<Arc<dyn ToolHandler>>,
}

impl ToolBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: None,
            description: None,
            input_schema: serde_json::json!({"type": "object"}),
            output_schema: None,
            annotations: None,
            meta: Vec::new(),
            timeout: None,
            task_support: false,
            handler: None,
        }
    }

    /// Human-readable title
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// What the tool does
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// JSON Schema for the argument object
    pub fn input_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    /// JSON Schema for `structuredContent` in results
    pub fn output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    /// Derive the output schema from a typed result
    pub fn output_schema_for<T: schemars::JsonSchema>(self) -> Self {
        let schema = super::schema::output_schema_for::<T>();
        self.output_schema(schema)
    }

    /// Behavioral hints attached to the descriptor
    pub fn annotations(mut self, annotations: Value) -> Self {
        self.annotations = Some(annotations);
        self
    }

    /// Attach a `_meta` entry to the descriptor
    pub fn meta(mut self, entry: MetaEntry) -> Self {
        self.meta.push(entry);
        self
    }

    /// Per-tool execution timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Advertise task-store delivery support
    pub fn task_support(mut self) -> Self {
        self.task_support = true;
        self
    }

    /// Install the handler
    pub fn handler<H: ToolHandler + 'static>(mut self, handler: H) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Install an async closure as the handler
    pub fn handler_fn<F, Fut>(mut self, function: F) -> Self
    where
        F: Fn(Map<String, Value>, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutput, ToolError>> + Send + 'static,
    {
        self.handler = Some(Arc::new(FnToolHandler { function }));
        self
    }

    /// Finish the registration
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::InvalidSchema` when a schema does not
    /// compile. A missing handler yields a tool that always fails
    /// execution, which is caught here instead.
    pub fn build(self) -> Result<RegisteredTool, RegistryError> {
        let input_validator = Some(SchemaValidator::compile(&self.input_schema)?);
        let output_validator = self
            .output_schema
            .as_ref()
            .map(SchemaValidator::compile)
            .transpose()?;

        let descriptor = Tool {
            name: self.name,
            title: self.title,
            description: self.description,
            input_schema: self.input_schema,
            output_schema: self.output_schema,
            annotations: self.annotations,
            execution: self.task_support.then(|| ToolExecution {
                task_support: Some(true),
            }),
            meta: meta_object(&self.meta),
        };

        let handler = self.handler.unwrap_or_else(|| {
            Arc::new(FnToolHandler {
                function: |_args, _ctx| async {
                    Err(ToolError::Execution(
                        "tool registered without a handler".to_string(),
                    ))
                },
            })
        });

        Ok(RegisteredTool {
            descriptor,
            handler,
            timeout: self.timeout,
            input_validator,
            output_validator,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RequestId;
    use serde_json::json;

    fn test_context() -> RequestContext {
        crate::session::test_support::detached_context(RequestId::new_number(1))
    }

    fn echo_tool() -> RegisteredTool {
        RegisteredTool::builder("echo")
            .description("Echo the message argument")
            .input_schema(json!({
                "type": "object",
                "properties": {"message": {"type": "string"}},
                "required": ["message"]
            }))
            .handler_fn(|args, _ctx| async move {
                let message = args
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Ok(ToolOutput::Text(message))
            })
            .build()
            .unwrap()
    }

    #[test]
    fn binding_validates_against_input_schema() {
        let tool = echo_tool();
        let mut ok = Map::new();
        ok.insert("message".to_string(), json!("hi"));
        assert!(tool.bind_arguments(Some(ok)).is_ok());

        let mut bad = Map::new();
        bad.insert("message".to_string(), json!(42));
        assert!(matches!(
            tool.bind_arguments(Some(bad)),
            Err(RpcError::InvalidParams { .. })
        ));
        assert!(matches!(
            tool.bind_arguments(None),
            Err(RpcError::InvalidParams { .. })
        ));
    }

    #[tokio::test]
    async fn text_output_becomes_a_text_block() {
        let tool = echo_tool();
        let mut args = Map::new();
        args.insert("message".to_string(), json!("hello"));
        let result = tool.invoke(args, test_context()).await.unwrap();
        assert!(!result.is_error);
        assert_eq!(result.first_text(), Some("hello"));
    }

    #[tokio::test]
    async fn json_output_carries_structured_content() {
        let tool = RegisteredTool::builder("lookup")
            .output_schema(json!({
                "type": "object",
                "properties": {"count": {"type": "integer"}},
                "required": ["count"]
            }))
            .handler_fn(|_args, _ctx| async { Ok(ToolOutput::Json(json!({"count": 3}))) })
            .build()
            .unwrap();

        let result = tool.invoke(Map::new(), test_context()).await.unwrap();
        assert_eq!(result.structured_content, Some(json!({"count": 3})));
        assert_eq!(result.first_text(), Some(r#"{"count":3}"#));
    }

    #[tokio::test]
    async fn invalid_structured_output_is_an_internal_error() {
        let tool = RegisteredTool::builder("broken")
            .output_schema(json!({
                "type": "object",
                "properties": {"count": {"type": "integer"}},
                "required": ["count"]
            }))
            .handler_fn(|_args, _ctx| async { Ok(ToolOutput::Json(json!({"count": "three"}))) })
            .build()
            .unwrap();

        assert!(matches!(
            tool.invoke(Map::new(), test_context()).await,
            Err(RpcError::InternalError { .. })
        ));
    }

    #[tokio::test]
    async fn execution_failure_is_captured_not_bubbled() {
        let tool = RegisteredTool::builder("flaky")
            .handler_fn(|_args, _ctx| async { Err(ToolError::execution("disk on fire")) })
            .build()
            .unwrap();

        let result = tool.invoke(Map::new(), test_context()).await.unwrap();
        assert!(result.is_error);
        assert_eq!(result.first_text(), Some("disk on fire"));
    }

    #[tokio::test]
    async fn protocol_failure_bubbles() {
        let tool = RegisteredTool::builder("strict")
            .handler_fn(|_args, _ctx| async {
                Err(ToolError::Protocol(RpcError::invalid_params("bad shape")))
            })
            .build()
            .unwrap();

        assert!(matches!(
            tool.invoke(Map::new(), test_context()).await,
            Err(RpcError::InvalidParams { .. })
        ));
    }

    #[test]
    fn descriptor_reflects_builder_options() {
        let tool = RegisteredTool::builder("annotated")
            .title("Annotated")
            .timeout(Duration::from_millis(200))
            .task_support()
            .meta(MetaEntry::new("origin", json!("generated")))
            .handler_fn(|_args, _ctx| async { Ok(ToolOutput::Text(String::new())) })
            .build()
            .unwrap();

        let descriptor = tool.descriptor();
        assert_eq!(descriptor.title.as_deref(), Some("Annotated"));
        assert_eq!(
            descriptor.execution.as_ref().unwrap().task_support,
            Some(true)
        );
        assert_eq!(descriptor.meta.as_ref().unwrap()["origin"], "generated");
        assert_eq!(tool.timeout(), Some(Duration::from_millis(200)));
    }
}
