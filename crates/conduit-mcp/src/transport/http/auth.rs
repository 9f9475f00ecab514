//! Authorization Collaborator
//!
//! Credential acquisition is external to the runtime: OAuth discovery,
//! PKCE, refresh, and key storage all live behind
//! [`CredentialProvider`]. The HTTP bindings only attach
//! `Authorization: <scheme> <token>` to outgoing requests and, on a
//! `401`, offer the response to the provider and retry once if it
//! reports the challenge handled.

// Layer 1: Standard library imports
use std::sync::Arc;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use tracing::debug;

// Layer 3: Internal module imports
use super::super::TransportError;

/// Default authorization scheme when the provider does not pick one
pub const DEFAULT_SCHEME: &str = "Bearer";

/// The parts of a `401` response a provider may inspect
#[derive(Debug, Clone)]
pub struct UnauthorizedResponse {
    /// HTTP status (always 401 today; carried for forward compatibility)
    pub status: u16,
    /// The `WWW-Authenticate` challenge header, when present
    pub www_authenticate: Option<String>,
}

/// External credential source driven by the HTTP bindings
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Produce a token for the given scheme and resource, if one is held
    async fn get_credential(&self, scheme: &str, resource: &str) -> Option<String>;

    /// Offered a `401` response; returns `(handled, scheme)`
    ///
    /// Returning `(true, scheme)` makes the binding retry the request
    /// once with a fresh credential under `scheme` (or the previous
    /// scheme when `None`). Returning `(false, _)` surfaces the `401`
    /// to the caller.
    async fn handle_unauthorized(
        &self,
        response: &UnauthorizedResponse,
        scheme: &str,
    ) -> (bool, Option<String>);
}

/// Send a request, driving the provider through the 401-retry-once flow
///
/// `build` must produce a fresh equivalent request on each call; the
/// retry rebuilds rather than clones so streaming bodies stay usable.
pub(crate) async fn send_with_auth<F>(
    build: F,
    provider: Option<&Arc<dyn CredentialProvider>>,
    resource: &str,
) -> Result<reqwest::Response, TransportError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut scheme = DEFAULT_SCHEME.to_string();
    let mut retried = false;

    loop {
        let mut request = build();
        if let Some(provider) = provider {
            if let Some(token) = provider.get_credential(&scheme, resource).await {
                request = request.header(reqwest::header::AUTHORIZATION, format!("{scheme} {token}"));
            }
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::http(e.to_string()))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED && !retried {
            if let Some(provider) = provider {
                let unauthorized = UnauthorizedResponse {
                    status: response.status().as_u16(),
                    www_authenticate: response
                        .headers()
                        .get(reqwest::header::WWW_AUTHENTICATE)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string),
                };
                let (handled, new_scheme) =
                    provider.handle_unauthorized(&unauthorized, &scheme).await;
                if handled {
                    debug!(resource, "retrying once after provider handled 401");
                    if let Some(new_scheme) = new_scheme {
                        scheme = new_scheme;
                    }
                    retried = true;
                    continue;
                }
            }
        }

        return Ok(response);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        handled: AtomicUsize,
    }

    #[async_trait]
    impl CredentialProvider for CountingProvider {
        async fn get_credential(&self, _scheme: &str, _resource: &str) -> Option<String> {
            Some("token".to_string())
        }

        async fn handle_unauthorized(
            &self,
            _response: &UnauthorizedResponse,
            _scheme: &str,
        ) -> (bool, Option<String>) {
            self.handled.fetch_add(1, Ordering::SeqCst);
            (true, None)
        }
    }

    #[tokio::test]
    async fn provider_shape_is_object_safe() {
        let provider: Arc<dyn CredentialProvider> = Arc::new(CountingProvider {
            handled: AtomicUsize::new(0),
        });
        assert_eq!(
            provider.get_credential("Bearer", "http://x").await.as_deref(),
            Some("token")
        );
        let (handled, scheme) = provider
            .handle_unauthorized(
                &UnauthorizedResponse {
                    status: 401,
                    www_authenticate: None,
                },
                DEFAULT_SCHEME,
            )
            .await;
        assert!(handled);
        assert!(scheme.is_none());
    }
}
