//! Registered Resources and URI Matching
//!
//! Resources come in two shapes: concrete (an exact URI) and templated
//! (a `{var}` pattern in the RFC 6570 simple-expansion subset). A read
//! resolves against concrete resources first, then templates in
//! registration order; the matched variables are handed to the handler.

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

// Layer 2: Third-party crate imports
use async_trait::async_trait;

// Layer 3: Internal module imports
use super::Primitive;
use crate::protocol::{ReadResourceResult, Resource, ResourceTemplate, RpcError, Uri};
use crate::session::RequestContext;

/// The reading side of a resource
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// Read the resource at `uri`
    ///
    /// For templated resources, `variables` holds the captures from
    /// the template match; for concrete resources it is empty.
    async fn read(
        &self,
        uri: &Uri,
        variables: HashMap<String, String>,
        context: RequestContext,
    ) -> Result<ReadResourceResult, RpcError>;
}

struct FnResourceHandler<F> {
    function: F,
}

#[async_trait]
impl<F, Fut> ResourceHandler for FnResourceHandler<F>
where
    F: Fn(Uri, HashMap<String, String>, RequestContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ReadResourceResult, RpcError>> + Send,
{
    async fn read(
        &self,
        uri: &Uri,
        variables: HashMap<String, String>,
        context: RequestContext,
    ) -> Result<ReadResourceResult, RpcError> {
        (self.function)(uri.clone(), variables, context).await
    }
}

/// A parsed `{var}` URI template
///
/// Matching is the simple-expansion subset: literal segments must match
/// exactly and each variable captures one or more characters up to the
/// next literal, never crossing `/`.
#[derive(Debug, Clone)]
pub struct UriTemplate {
    template: String,
    tokens: Vec<TemplateToken>,
}

#[derive(Debug, Clone)]
enum TemplateToken {
    Literal(String),
    Variable(String),
}

impl UriTemplate {
    /// Parse a template string
    ///
    /// # Errors
    ///
    /// Returns `InvalidParams` for unbalanced braces or empty names.
    pub fn parse(template: &str) -> Result<Self, RpcError> {
        let mut tokens = Vec::new();
        let mut rest = template;
        while let Some(open) = rest.find('{') {
            if open > 0 {
                tokens.push(TemplateToken::Literal(rest[..open].to_string()));
            }
            let Some(close) = rest[open..].find('}') else {
                return Err(RpcError::invalid_params(format!(
                    "unbalanced brace in uri template {template:?}"
                )));
            };
            let name = &rest[open + 1..open + close];
            if name.is_empty() || name.contains('{') {
                return Err(RpcError::invalid_params(format!(
                    "invalid variable in uri template {template:?}"
                )));
            }
            tokens.push(TemplateToken::Variable(name.to_string()));
            rest = &rest[open + close + 1..];
        }
        if !rest.is_empty() {
            tokens.push(TemplateToken::Literal(rest.to_string()));
        }
        Ok(Self {
            template: template.to_string(),
            tokens,
        })
    }

    /// The template string
    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Match a URI, returning the captured variables
    pub fn matches(&self, uri: &str) -> Option<HashMap<String, String>> {
        let mut captures = HashMap::new();
        let mut rest = uri;

        for (index, token) in self.tokens.iter().enumerate() {
            match token {
                TemplateToken::Literal(literal) => {
                    rest = rest.strip_prefix(literal.as_str())?;
                }
                TemplateToken::Variable(name) => {
                    // Capture up to the next literal, or the rest of
                    // the input for a trailing variable.
                    let value = match self.tokens.get(index + 1) {
                        Some(TemplateToken::Literal(next)) => {
                            let end = rest.find(next.as_str())?;
                            let (value, tail) = rest.split_at(end);
                            rest = tail;
                            value
                        }
                        _ => {
                            let value = rest;
                            rest = "";
                            value
                        }
                    };
                    if value.is_empty() || value.contains('/') {
                        return None;
                    }
                    captures.insert(name.clone(), value.to_string());
                }
            }
        }

        rest.is_empty().then_some(captures)
    }
}

/// Concrete or templated descriptor of a registered resource
#[derive(Debug, Clone)]
pub enum ResourceDescriptor {
    /// A resource at one exact URI
    Concrete(Resource),
    /// A family of resources behind a URI template
    Template(ResourceTemplate),
}

/// A resource wired into the registry
pub struct RegisteredResource {
    descriptor: ResourceDescriptor,
    template: Option<UriTemplate>,
    handler: Arc<dyn ResourceHandler>,
}

impl Primitive for RegisteredResource {
    fn name(&self) -> &str {
        match &self.descriptor {
            ResourceDescriptor::Concrete(resource) => &resource.name,
            ResourceDescriptor::Template(template) => &template.name,
        }
    }
}

impl RegisteredResource {
    /// Register a concrete resource
    pub fn concrete<H: ResourceHandler + 'static>(descriptor: Resource, handler: H) -> Self {
        Self {
            descriptor: ResourceDescriptor::Concrete(descriptor),
            template: None,
            handler: Arc::new(handler),
        }
    }

    /// Register a concrete resource with an async closure
    pub fn concrete_fn<F, Fut>(descriptor: Resource, function: F) -> Self
    where
        F: Fn(Uri, HashMap<String, String>, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ReadResourceResult, RpcError>> + Send + 'static,
    {
        Self::concrete(descriptor, FnResourceHandler { function })
    }

    /// Register a templated resource
    ///
    /// # Errors
    ///
    /// Returns `InvalidParams` when the template does not parse.
    pub fn templated<H: ResourceHandler + 'static>(
        descriptor: ResourceTemplate,
        handler: H,
    ) -> Result<Self, RpcError> {
        let template = UriTemplate::parse(&descriptor.uri_template)?;
        Ok(Self {
            descriptor: ResourceDescriptor::Template(descriptor),
            template: Some(template),
            handler: Arc::new(handler),
        })
    }

    /// Register a templated resource with an async closure
    ///
    /// # Errors
    ///
    /// Returns `InvalidParams` when the template does not parse.
    pub fn templated_fn<F, Fut>(
        descriptor: ResourceTemplate,
        function: F,
    ) -> Result<Self, RpcError>
    where
        F: Fn(Uri, HashMap<String, String>, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ReadResourceResult, RpcError>> + Send + 'static,
    {
        Self::templated(descriptor, FnResourceHandler { function })
    }

    /// The descriptor, concrete or templated
    pub fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    /// The concrete descriptor, when this is not a template
    pub fn as_concrete(&self) -> Option<&Resource> {
        match &self.descriptor {
            ResourceDescriptor::Concrete(resource) => Some(resource),
            ResourceDescriptor::Template(_) => None,
        }
    }

    /// The template descriptor, when this is one
    pub fn as_template(&self) -> Option<&ResourceTemplate> {
        match &self.descriptor {
            ResourceDescriptor::Template(template) => Some(template),
            ResourceDescriptor::Concrete(_) => None,
        }
    }

    /// Match a URI against this resource
    ///
    /// Concrete resources match exactly; templates capture variables.
    pub fn match_uri(&self, uri: &Uri) -> Option<HashMap<String, String>> {
        match (&self.descriptor, &self.template) {
            (ResourceDescriptor::Concrete(resource), _) => {
                (resource.uri == *uri).then(HashMap::new)
            }
            (ResourceDescriptor::Template(_), Some(template)) => template.matches(uri.as_str()),
            (ResourceDescriptor::Template(_), None) => None,
        }
    }

    /// Read through the handler
    ///
    /// # Errors
    ///
    /// Propagates the handler's error.
    pub async fn read(
        &self,
        uri: &Uri,
        variables: HashMap<String, String>,
        context: RequestContext,
    ) -> Result<ReadResourceResult, RpcError> {
        self.handler.read(uri, variables, context).await
    }
}

impl std::fmt::Debug for RegisteredResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredResource")
            .field("name", &self.name())
            .finish()
    }
}
