//! Request Context and Per-Invocation Services
//!
//! Every dispatched handler receives a [`RequestContext`]: the request
//! id, a [`Peer`] for talking back to the remote side, a cancellation
//! token scoped to this invocation, an optional progress reporter bound
//! to the request's progress token, and a per-invocation
//! [`ServiceScope`].
//!
//! Services follow the locator pattern: the host registers shared
//! instances by type on a [`ServiceProvider`], and each invocation gets
//! a scope resolving those types. The scope's lifetime is the
//! invocation; it is released on every exit path, including
//! cancellation, because dropping the context drops the scope.

// Layer 1: Standard library imports
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// Layer 2: Third-party crate imports
use tokio_util::sync::CancellationToken;

// Layer 3: Internal module imports
use super::Peer;
use crate::protocol::{ProgressNotification, ProgressToken, RequestId};

type ServiceMap = HashMap<TypeId, Arc<dyn Any + Send + Sync>>;

/// Host-level registry of shared services, resolvable by type
///
/// # Examples
///
/// ```rust
/// use conduit_mcp::session::ServiceProvider;
///
/// struct Clock;
///
/// let provider = ServiceProvider::builder()
///     .register(Clock)
///     .build();
/// let scope = provider.create_scope();
/// assert!(scope.get::<Clock>().is_some());
/// ```
#[derive(Clone, Default)]
pub struct ServiceProvider {
    services: Arc<ServiceMap>,
}

impl ServiceProvider {
    /// Start building a provider
    pub fn builder() -> ServiceProviderBuilder {
        ServiceProviderBuilder {
            services: HashMap::new(),
        }
    }

    /// Open a scope for one invocation
    pub fn create_scope(&self) -> ServiceScope {
        ServiceScope {
            services: Arc::clone(&self.services),
        }
    }
}

impl std::fmt::Debug for ServiceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceProvider")
            .field("registered", &self.services.len())
            .finish()
    }
}

/// Builder for [`ServiceProvider`]
pub struct ServiceProviderBuilder {
    services: ServiceMap,
}

impl ServiceProviderBuilder {
    /// Register a service instance under its concrete type
    pub fn register<T: Send + Sync + 'static>(mut self, service: T) -> Self {
        self.services.insert(TypeId::of::<T>(), Arc::new(service));
        self
    }

    /// Register an already-shared service instance
    pub fn register_arc<T: Send + Sync + 'static>(mut self, service: Arc<T>) -> Self {
        self.services.insert(TypeId::of::<T>(), service);
        self
    }

    /// Finish building
    pub fn build(self) -> ServiceProvider {
        ServiceProvider {
            services: Arc::new(self.services),
        }
    }
}

/// Per-invocation service scope
///
/// Resolution is by exact type: `scope.get::<T>()` returns the instance
/// registered as `T`, or `None`.
#[derive(Clone)]
pub struct ServiceScope {
    services: Arc<ServiceMap>,
}

impl ServiceScope {
    /// Resolve a service by type
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.services
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|service| service.downcast::<T>().ok())
    }

    /// An empty scope, for sessions without a service provider
    pub fn empty() -> Self {
        Self {
            services: Arc::new(HashMap::new()),
        }
    }
}

impl std::fmt::Debug for ServiceScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceScope").finish()
    }
}

/// Progress reporter bound to one request's progress token
///
/// Reports are best-effort notifications; failures to send (transport
/// gone) are swallowed so a progress call can never fail a handler.
#[derive(Clone)]
pub struct ProgressReporter {
    token: ProgressToken,
    peer: Peer,
}

impl ProgressReporter {
    pub(crate) fn new(token: ProgressToken, peer: Peer) -> Self {
        Self { token, peer }
    }

    /// The token this reporter is bound to
    pub fn token(&self) -> &ProgressToken {
        &self.token
    }

    /// Emit a progress update
    pub async fn report(&self, progress: f64, total: Option<f64>, message: Option<&str>) {
        let mut notification = ProgressNotification::new(self.token.clone(), progress);
        notification.total = total;
        notification.message = message.map(str::to_string);
        self.peer.send_progress(notification).await;
    }
}

/// Deferred-delivery flag settable by filters on a tool call
#[derive(Debug, Default)]
pub(crate) struct PollingFlag {
    enabled: AtomicBool,
    retention: Mutex<Option<Duration>>,
}

impl PollingFlag {
    pub fn enable(&self, retention: Duration) {
        if let Ok(mut guard) = self.retention.lock() {
            *guard = Some(retention);
        }
        self.enabled.store(true, Ordering::SeqCst);
    }

    pub fn retention(&self) -> Option<Duration> {
        if !self.enabled.load(Ordering::SeqCst) {
            return None;
        }
        self.retention
            .lock()
            .ok()
            .and_then(|guard| *guard)
    }
}

/// Everything a handler invocation can see and do
#[derive(Clone)]
pub struct RequestContext {
    request_id: RequestId,
    peer: Peer,
    progress: Option<ProgressReporter>,
    cancellation: CancellationToken,
    services: ServiceScope,
    polling: Arc<PollingFlag>,
}

impl RequestContext {
    pub(crate) fn new(
        request_id: RequestId,
        peer: Peer,
        progress: Option<ProgressReporter>,
        cancellation: CancellationToken,
        services: ServiceScope,
    ) -> Self {
        Self {
            request_id,
            peer,
            progress,
            cancellation,
            services,
            polling: Arc::new(PollingFlag::default()),
        }
    }

    /// Id of the request being handled
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Handle for requests and notifications toward the remote side
    pub fn peer(&self) -> &Peer {
        &self.peer
    }

    /// Progress reporter, present when the request carried a token
    pub fn progress(&self) -> Option<&ProgressReporter> {
        self.progress.as_ref()
    }

    /// Whether this invocation has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Future that resolves when this invocation is cancelled
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await;
    }

    /// The raw cancellation token, for `select!`-style handlers
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Per-invocation service scope
    pub fn services(&self) -> &ServiceScope {
        &self.services
    }

    /// Route the eventual response through the event store instead of
    /// the live stream, retaining it for `retention`
    ///
    /// Only meaningful on transports with an event store; elsewhere the
    /// response is delivered normally.
    pub fn enable_polling(&self, retention: Duration) {
        self.polling.enable(retention);
    }

    /// The polling retention, when a filter enabled deferred delivery
    pub(crate) fn polling_retention(&self) -> Option<Duration> {
        self.polling.retention()
    }

    /// A context sharing everything but running under a child scope
    ///
    /// Cancelling the child does not touch the parent; cancelling the
    /// parent cancels the child. Used for per-tool timeouts, which must
    /// abort the tool's scope without ending the surrounding request.
    pub(crate) fn with_cancellation(&self, cancellation: CancellationToken) -> Self {
        Self {
            request_id: self.request_id.clone(),
            peer: self.peer.clone(),
            progress: self.progress.clone(),
            cancellation,
            services: self.services.clone(),
            polling: Arc::clone(&self.polling),
        }
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Database {
        name: &'static str,
    }

    #[test]
    fn scope_resolves_registered_types() {
        let provider = ServiceProvider::builder()
            .register(Database { name: "primary" })
            .build();
        let scope = provider.create_scope();
        assert_eq!(scope.get::<Database>().unwrap().name, "primary");
        assert!(scope.get::<String>().is_none());
    }

    #[test]
    fn scopes_share_the_host_instances() {
        let provider = ServiceProvider::builder()
            .register_arc(Arc::new(Database { name: "shared" }))
            .build();
        let first = provider.create_scope().get::<Database>().unwrap();
        let second = provider.create_scope().get::<Database>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn empty_scope_resolves_nothing() {
        assert!(ServiceScope::empty().get::<Database>().is_none());
    }

    #[test]
    fn polling_flag_round_trip() {
        let flag = PollingFlag::default();
        assert!(flag.retention().is_none());
        flag.enable(Duration::from_secs(60));
        assert_eq!(flag.retention(), Some(Duration::from_secs(60)));
    }
}
