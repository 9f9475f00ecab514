//! Registered Prompts
//!
//! A [`RegisteredPrompt`] pairs the wire descriptor with its renderer.
//! Binding checks the declared required arguments before the handler
//! runs; a missing required argument is `InvalidParams`, exactly like
//! a tool argument failing its schema.

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

// Layer 2: Third-party crate imports
use async_trait::async_trait;

// Layer 3: Internal module imports
use super::Primitive;
use crate::protocol::{GetPromptResult, Prompt, PromptArgument, RpcError};
use crate::session::RequestContext;

/// The rendering side of a prompt
#[async_trait]
pub trait PromptHandler: Send + Sync {
    /// Render the prompt with bound arguments
    async fn render(
        &self,
        arguments: HashMap<String, String>,
        context: RequestContext,
    ) -> Result<GetPromptResult, RpcError>;
}

struct FnPromptHandler<F> {
    function: F,
}

#[async_trait]
impl<F, Fut> PromptHandler for FnPromptHandler<F>
where
    F: Fn(HashMap<String, String>, RequestContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<GetPromptResult, RpcError>> + Send,
{
    async fn render(
        &self,
        arguments: HashMap<String, String>,
        context: RequestContext,
    ) -> Result<GetPromptResult, RpcError> {
        (self.function)(arguments, context).await
    }
}

/// A prompt wired into the registry
pub struct RegisteredPrompt {
    descriptor: Prompt,
    handler: Arc<dyn PromptHandler>,
}

impl Primitive for RegisteredPrompt {
    fn name(&self) -> &str {
        &self.descriptor.name
    }
}

impl RegisteredPrompt {
    /// Start building a prompt registration
    pub fn builder(name: impl Into<String>) -> PromptBuilder {
        PromptBuilder {
            descriptor: Prompt::new(name),
            handler: None,
        }
    }

    /// The wire descriptor served by `prompts/list`
    pub fn descriptor(&self) -> &Prompt {
        &self.descriptor
    }

    /// Check required arguments
    ///
    /// # Errors
    ///
    /// Returns `InvalidParams` naming the first missing argument.
    pub fn bind_arguments(
        &self,
        arguments: HashMap<String, String>,
    ) -> Result<HashMap<String, String>, RpcError> {
        for declared in &self.descriptor.arguments {
            if declared.required && !arguments.contains_key(&declared.name) {
                return Err(RpcError::invalid_params(format!(
                    "prompt {:?} requires argument {:?}",
                    self.descriptor.name, declared.name
                )));
            }
        }
        Ok(arguments)
    }

    /// Render with already-bound arguments
    ///
    /// # Errors
    ///
    /// Propagates the handler's error.
    pub async fn render(
        &self,
        arguments: HashMap<String, String>,
        context: RequestContext,
    ) -> Result<GetPromptResult, RpcError> {
        self.handler.render(arguments, context).await
    }
}

impl std::fmt::Debug for RegisteredPrompt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredPrompt")
            .field("name", &self.descriptor.name)
            .finish()
    }
}

/// Builder for [`RegisteredPrompt`]
pub struct PromptBuilder {
    descriptor: Prompt,
    handler: Option<Arc<dyn PromptHandler>>,
}

impl PromptBuilder {
    /// Human-readable title
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.descriptor.title = Some(title.into());
        self
    }

    /// What the prompt produces
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.descriptor.description = Some(description.into());
        self
    }

    /// Declare an argument
    pub fn argument(mut self, argument: PromptArgument) -> Self {
        self.descriptor.arguments.push(argument);
        self
    }

    /// Install the renderer
    pub fn handler<H: PromptHandler + 'static>(mut self, handler: H) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Install an async closure as the renderer
    pub fn handler_fn<F, Fut>(mut self, function: F) -> Self
    where
        F: Fn(HashMap<String, String>, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<GetPromptResult, RpcError>> + Send + 'static,
    {
        self.handler = Some(Arc::new(FnPromptHandler { function }));
        self
    }

    /// Finish the registration
    pub fn build(self) -> RegisteredPrompt {
        let handler = self.handler.unwrap_or_else(|| {
            Arc::new(FnPromptHandler {
                function: |_args, _ctx| async {
                    Err(RpcError::internal_error("prompt registered without a handler"))
                },
            })
        });
        RegisteredPrompt {
            descriptor: self.descriptor,
            handler,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{PromptMessage, RequestId};

    fn greeting_prompt() -> RegisteredPrompt {
        RegisteredPrompt::builder("greeting")
            .description("Greets someone by name")
            .argument(PromptArgument::required("name"))
            .argument(PromptArgument::optional("tone"))
            .handler_fn(|args, _ctx| async move {
                let name = args.get("name").cloned().unwrap_or_default();
                Ok(GetPromptResult {
                    description: None,
                    messages: vec![PromptMessage::user_text(format!("Hello, {name}!"))],
                })
            })
            .build()
    }

    #[test]
    fn binding_requires_declared_arguments() {
        let prompt = greeting_prompt();
        let mut arguments = HashMap::new();
        arguments.insert("name".to_string(), "Ada".to_string());
        assert!(prompt.bind_arguments(arguments).is_ok());

        let missing = prompt.bind_arguments(HashMap::new());
        assert!(matches!(missing, Err(RpcError::InvalidParams { .. })));
    }

    #[tokio::test]
    async fn render_produces_messages() {
        let prompt = greeting_prompt();
        let mut arguments = HashMap::new();
        arguments.insert("name".to_string(), "Ada".to_string());
        let context =
            crate::session::test_support::detached_context(RequestId::new_number(1));

        let rendered = prompt.render(arguments, context).await.unwrap();
        assert_eq!(rendered.messages.len(), 1);
    }
}
