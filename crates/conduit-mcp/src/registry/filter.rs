//! Request Filter Chain
//!
//! Filters wrap the terminal handler of a registry operation the way
//! middleware wraps an HTTP route: each filter receives the request,
//! the invocation context, and a `next` continuation. A filter may
//! transform the request, transform the result, short-circuit with an
//! authorization failure, or enable deferred delivery on the context.
//! Filters compose in registration order; the first registered filter
//! is the outermost.

// Layer 1: Standard library imports
use std::sync::Arc;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use futures::future::BoxFuture;

// Layer 3: Internal module imports
use crate::protocol::RpcError;
use crate::session::RequestContext;

/// Continuation invoking the rest of the chain
pub type Next<Req, Res> =
    Box<dyn FnOnce(Req, RequestContext) -> BoxFuture<'static, Result<Res, RpcError>> + Send>;

/// One link in a filter chain
#[async_trait]
pub trait RequestFilter<Req, Res>: Send + Sync
where
    Req: Send + 'static,
    Res: Send + 'static,
{
    /// Observe or transform the request and result, or short-circuit
    async fn handle(
        &self,
        request: Req,
        context: RequestContext,
        next: Next<Req, Res>,
    ) -> Result<Res, RpcError>;
}

/// Ordered collection of filters around one operation
pub struct FilterChain<Req, Res> {
    filters: Vec<Arc<dyn RequestFilter<Req, Res>>>,
}

impl<Req, Res> Default for FilterChain<Req, Res> {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
        }
    }
}

impl<Req, Res> FilterChain<Req, Res>
where
    Req: Send + 'static,
    Res: Send + 'static,
{
    /// An empty chain
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a filter; later filters run closer to the terminal
    pub fn push(&mut self, filter: Arc<dyn RequestFilter<Req, Res>>) {
        self.filters.push(filter);
    }

    /// Number of registered filters
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Whether the chain has no filters
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Run the chain around a terminal handler
    ///
    /// # Errors
    ///
    /// Propagates the first filter or terminal error.
    pub async fn execute(
        &self,
        request: Req,
        context: RequestContext,
        terminal: Next<Req, Res>,
    ) -> Result<Res, RpcError> {
        let mut next = terminal;
        for filter in self.filters.iter().rev() {
            let filter = Arc::clone(filter);
            let inner = next;
            next = Box::new(move |request, context| {
                Box::pin(async move { filter.handle(request, context, inner).await })
            });
        }
        next(request, context).await
    }
}

impl<Req, Res> std::fmt::Debug for FilterChain<Req, Res> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterChain")
            .field("filters", &self.filters.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RequestId;

    struct Tag {
        label: &'static str,
    }

    #[async_trait]
    impl RequestFilter<Vec<&'static str>, Vec<&'static str>> for Tag {
        async fn handle(
            &self,
            mut request: Vec<&'static str>,
            context: RequestContext,
            next: Next<Vec<&'static str>, Vec<&'static str>>,
        ) -> Result<Vec<&'static str>, RpcError> {
            request.push(self.label);
            let mut result = next(request, context).await?;
            result.push(self.label);
            Ok(result)
        }
    }

    struct Deny;

    #[async_trait]
    impl RequestFilter<Vec<&'static str>, Vec<&'static str>> for Deny {
        async fn handle(
            &self,
            _request: Vec<&'static str>,
            _context: RequestContext,
            _next: Next<Vec<&'static str>, Vec<&'static str>>,
        ) -> Result<Vec<&'static str>, RpcError> {
            Err(RpcError::server_error(-32001, "not authorized"))
        }
    }

    fn context() -> RequestContext {
        crate::session::test_support::detached_context(RequestId::new_number(1))
    }

    #[tokio::test]
    async fn filters_compose_in_registration_order() {
        let mut chain = FilterChain::new();
        chain.push(Arc::new(Tag { label: "outer" }));
        chain.push(Arc::new(Tag { label: "inner" }));

        let trace = chain
            .execute(
                Vec::new(),
                context(),
                Box::new(|mut request, _ctx| {
                    Box::pin(async move {
                        request.push("terminal");
                        Ok(request)
                    })
                }),
            )
            .await
            .unwrap();

        // Request path outer→inner→terminal, result path inner→outer.
        assert_eq!(trace, vec!["outer", "inner", "terminal", "inner", "outer"]);
    }

    #[tokio::test]
    async fn short_circuit_skips_the_terminal() {
        let mut chain = FilterChain::new();
        chain.push(Arc::new(Deny));
        chain.push(Arc::new(Tag { label: "never" }));

        let result = chain
            .execute(
                Vec::new(),
                context(),
                Box::new(|_request, _ctx| {
                    Box::pin(async move { panic!("terminal must not run") })
                }),
            )
            .await;
        assert!(matches!(result, Err(RpcError::ServerError { code: -32001, .. })));
    }

    #[tokio::test]
    async fn empty_chain_is_just_the_terminal() {
        let chain: FilterChain<u32, u32> = FilterChain::new();
        let doubled = chain
            .execute(
                21,
                context(),
                Box::new(|n, _ctx| Box::pin(async move { Ok(n * 2) })),
            )
            .await
            .unwrap();
        assert_eq!(doubled, 42);
        assert!(chain.is_empty());
    }
}
