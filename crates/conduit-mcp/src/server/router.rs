//! Server Method Router
//!
//! The server's [`RequestHandler`]: resolves each inbound method
//! against the primitive registry, runs the matching filter chain
//! around the terminal operation, and maps registry errors into the
//! JSON-RPC error taxonomy. The session engine has already gated the
//! method on the handshake state by the time it lands here.

// Layer 1: Standard library imports
use std::sync::Arc;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::trace;

// Layer 3: Internal module imports
use super::ServerCore;
use crate::protocol::constants::{error_codes, methods};
use crate::protocol::{
    CallToolRequest, CallToolResult, GetPromptRequest, InitializeRequest, InitializeResult,
    ListPromptsRequest, ListPromptsResult, ListResourceTemplatesRequest,
    ListResourceTemplatesResult, ListResourcesRequest, ListResourcesResult, ListToolsRequest,
    ListToolsResult, ProtocolVersion, ReadResourceRequest, RpcError, SetLevelRequest,
    SubscribeRequest, UnsubscribeRequest,
};
use crate::registry::paginate;
use crate::session::{Peer, RequestContext, RequestHandler};

/// Parse request params, treating absent params as an empty object
fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, RpcError> {
    let params = params.unwrap_or_else(|| Value::Object(Map::new()));
    serde_json::from_value(params).map_err(|e| RpcError::invalid_params(e.to_string()))
}

fn to_result_value<T: serde::Serialize>(result: T) -> Result<Value, RpcError> {
    serde_json::to_value(result).map_err(|e| RpcError::internal_error(e.to_string()))
}

fn empty_result() -> Value {
    Value::Object(Map::new())
}

/// The server-side request handler
pub(crate) struct McpRouter {
    pub(crate) core: Arc<ServerCore>,
}

#[async_trait]
impl RequestHandler for McpRouter {
    async fn handle_request(
        &self,
        method: &str,
        params: Option<Value>,
        context: RequestContext,
    ) -> Result<Value, RpcError> {
        match method {
            methods::INITIALIZE => self.initialize(params, context),
            methods::TOOLS_LIST => self.list_tools(params, context).await,
            methods::TOOLS_CALL => self.call_tool(params, context).await,
            methods::PROMPTS_LIST => self.list_prompts(params, context).await,
            methods::PROMPTS_GET => self.get_prompt(params, context).await,
            methods::RESOURCES_LIST => self.list_resources(params, context).await,
            methods::RESOURCES_TEMPLATES_LIST => self.list_resource_templates(params),
            methods::RESOURCES_READ => self.read_resource(params, context).await,
            methods::RESOURCES_SUBSCRIBE => self.subscribe(params, context),
            methods::RESOURCES_UNSUBSCRIBE => self.unsubscribe(params, context),
            methods::LOGGING_SET_LEVEL => self.set_level(params, context),
            other => Err(RpcError::method_not_found(other)),
        }
    }

    async fn handle_notification(&self, method: &str, params: Option<Value>, peer: Peer) {
        match method {
            methods::ROOTS_LIST_CHANGED => {
                if let Some(callback) = &self.core.on_roots_changed {
                    callback(peer);
                }
            }
            other => trace!(method = other, ?params, "unhandled notification"),
        }
    }
}

impl McpRouter {
    fn initialize(
        &self,
        params: Option<Value>,
        context: RequestContext,
    ) -> Result<Value, RpcError> {
        let request: InitializeRequest = parse_params(params)?;
        let Some(version) = ProtocolVersion::negotiate(&request.protocol_version) else {
            return Err(RpcError::invalid_request(format!(
                "no supported protocol version at or below {}",
                request.protocol_version
            )));
        };

        let capabilities = self.core.build_capabilities();
        self.core.roster.record_handshake(
            context.peer().session_id(),
            capabilities.clone(),
            request.capabilities,
        );
        trace!(
            client = %request.client_info.name,
            version = %version,
            "initialize negotiated"
        );

        to_result_value(InitializeResult::new(
            version,
            capabilities,
            self.core.config.server_info.clone(),
            self.core.config.instructions.clone(),
        ))
    }

    async fn list_tools(
        &self,
        params: Option<Value>,
        context: RequestContext,
    ) -> Result<Value, RpcError> {
        let request: ListToolsRequest = parse_params(params)?;
        let core = Arc::clone(&self.core);
        let result = self
            .core
            .filters
            .list_tools
            .execute(
                request,
                context,
                Box::new(move |request, _ctx| {
                    Box::pin(async move {
                        let snapshot = core.tools.snapshot();
                        let (page, next_cursor) =
                            paginate(&snapshot, request.cursor.as_ref(), core.config.page_size)?;
                        Ok(ListToolsResult {
                            tools: page.iter().map(|t| t.descriptor().clone()).collect(),
                            next_cursor,
                        })
                    })
                }),
            )
            .await?;
        to_result_value(result)
    }

    async fn call_tool(
        &self,
        params: Option<Value>,
        context: RequestContext,
    ) -> Result<Value, RpcError> {
        let request: CallToolRequest = parse_params(params)?;
        let core = Arc::clone(&self.core);
        let result = self
            .core
            .filters
            .call_tool
            .execute(
                request,
                context,
                Box::new(move |request, ctx| {
                    Box::pin(async move { invoke_tool(core, request, ctx).await })
                }),
            )
            .await?;
        to_result_value(result)
    }

    async fn list_prompts(
        &self,
        params: Option<Value>,
        context: RequestContext,
    ) -> Result<Value, RpcError> {
        let request: ListPromptsRequest = parse_params(params)?;
        let core = Arc::clone(&self.core);
        let result = self
            .core
            .filters
            .list_prompts
            .execute(
                request,
                context,
                Box::new(move |request, _ctx| {
                    Box::pin(async move {
                        let snapshot = core.prompts.snapshot();
                        let (page, next_cursor) =
                            paginate(&snapshot, request.cursor.as_ref(), core.config.page_size)?;
                        Ok(ListPromptsResult {
                            prompts: page.iter().map(|p| p.descriptor().clone()).collect(),
                            next_cursor,
                        })
                    })
                }),
            )
            .await?;
        to_result_value(result)
    }

    async fn get_prompt(
        &self,
        params: Option<Value>,
        context: RequestContext,
    ) -> Result<Value, RpcError> {
        let request: GetPromptRequest = parse_params(params)?;
        let core = Arc::clone(&self.core);
        let result = self
            .core
            .filters
            .get_prompt
            .execute(
                request,
                context,
                Box::new(move |request, ctx| {
                    Box::pin(async move {
                        let Some(prompt) = core.prompts.get(&request.name) else {
                            return Err(RpcError::method_not_found(request.name));
                        };
                        let arguments = prompt.bind_arguments(request.arguments)?;
                        prompt.render(arguments, ctx).await
                    })
                }),
            )
            .await?;
        to_result_value(result)
    }

    async fn list_resources(
        &self,
        params: Option<Value>,
        context: RequestContext,
    ) -> Result<Value, RpcError> {
        let request: ListResourcesRequest = parse_params(params)?;
        let core = Arc::clone(&self.core);
        let result = self
            .core
            .filters
            .list_resources
            .execute(
                request,
                context,
                Box::new(move |request, _ctx| {
                    Box::pin(async move {
                        // Only concrete resources are listed here; the
                        // templates have their own listing.
                        let snapshot: Vec<_> = core
                            .resources
                            .snapshot()
                            .into_iter()
                            .filter(|r| r.as_concrete().is_some())
                            .collect();
                        let (page, next_cursor) =
                            paginate(&snapshot, request.cursor.as_ref(), core.config.page_size)?;
                        Ok(ListResourcesResult {
                            resources: page
                                .iter()
                                .filter_map(|r| r.as_concrete().cloned())
                                .collect(),
                            next_cursor,
                        })
                    })
                }),
            )
            .await?;
        to_result_value(result)
    }

    fn list_resource_templates(&self, params: Option<Value>) -> Result<Value, RpcError> {
        let request: ListResourceTemplatesRequest = parse_params(params)?;
        let snapshot: Vec<_> = self
            .core
            .resources
            .snapshot()
            .into_iter()
            .filter(|r| r.as_template().is_some())
            .collect();
        let (page, next_cursor) =
            paginate(&snapshot, request.cursor.as_ref(), self.core.config.page_size)?;
        to_result_value(ListResourceTemplatesResult {
            resource_templates: page
                .iter()
                .filter_map(|r| r.as_template().cloned())
                .collect(),
            next_cursor,
        })
    }

    async fn read_resource(
        &self,
        params: Option<Value>,
        context: RequestContext,
    ) -> Result<Value, RpcError> {
        let request: ReadResourceRequest = parse_params(params)?;
        let core = Arc::clone(&self.core);
        let result = self
            .core
            .filters
            .read_resource
            .execute(
                request,
                context,
                Box::new(move |request, ctx| {
                    Box::pin(async move {
                        let snapshot = core.resources.snapshot();
                        // Concrete resources win over templates; within a
                        // shape, registration order decides.
                        let matched = snapshot
                            .iter()
                            .filter(|r| r.as_concrete().is_some())
                            .chain(snapshot.iter().filter(|r| r.as_template().is_some()))
                            .find_map(|resource| {
                                resource
                                    .match_uri(&request.uri)
                                    .map(|variables| (resource, variables))
                            });
                        let Some((resource, variables)) = matched else {
                            return Err(RpcError::server_error(
                                error_codes::RESOURCE_NOT_FOUND,
                                format!("no resource matches {}", request.uri),
                            ));
                        };
                        resource.read(&request.uri, variables, ctx).await
                    })
                }),
            )
            .await?;
        to_result_value(result)
    }

    fn subscribe(&self, params: Option<Value>, context: RequestContext) -> Result<Value, RpcError> {
        let request: SubscribeRequest = parse_params(params)?;
        context.peer().subscriptions().subscribe(request.uri);
        Ok(empty_result())
    }

    fn unsubscribe(
        &self,
        params: Option<Value>,
        context: RequestContext,
    ) -> Result<Value, RpcError> {
        let request: UnsubscribeRequest = parse_params(params)?;
        // Idempotent by design; an absent URI is not an error.
        context.peer().subscriptions().unsubscribe(&request.uri);
        Ok(empty_result())
    }

    fn set_level(&self, params: Option<Value>, context: RequestContext) -> Result<Value, RpcError> {
        let request: SetLevelRequest = parse_params(params)?;
        context.peer().set_min_log_level(request.level);
        Ok(empty_result())
    }
}

/// The call-tool terminal: bind, time-box, invoke, map, maybe defer
async fn invoke_tool(
    core: Arc<ServerCore>,
    request: CallToolRequest,
    context: RequestContext,
) -> Result<CallToolResult, RpcError> {
    let Some(tool) = core.tools.get(&request.name) else {
        return Err(RpcError::method_not_found(request.name));
    };
    let arguments: Map<String, Value> = tool.bind_arguments(request.arguments)?;

    // Tool-level timeout: the invocation scope is cancelled and the
    // expiry becomes an isError result, not a JSON-RPC error. This is
    // the one place tool timeouts differ from request cancellation.
    let effective_timeout = tool.timeout().or(core.config.default_tool_timeout);
    let scope = context.cancellation_token().child_token();
    let tool_context = context.with_cancellation(scope.clone());
    let invocation = tool.invoke(arguments, tool_context);

    let result = match effective_timeout {
        Some(limit) => match tokio::time::timeout(limit, invocation).await {
            Ok(result) => result?,
            Err(_) => {
                scope.cancel();
                CallToolResult::timeout()
            }
        },
        None => invocation.await?,
    };

    if let (Some(retention), Some(store)) = (context.polling_retention(), core.task_store.as_ref())
    {
        store
            .put(&context.request_id().to_string(), result.clone(), retention)
            .await;
    }

    Ok(result)
}
