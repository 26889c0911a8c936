// Authenticated fetch: header injection, query smuggling, 401 retry

use std::sync::Arc;

use crate::auth::{Headers, RefreshCoordinator};
use crate::error::{AuthError, Result};
use crate::http_client::{RequestOptions, Transport};
use crate::schemes::{Scheme, QUERY_PARAMS_HEADER};

/// Observer invoked when a refresh triggered by a 401 fails
pub type RefreshFailureHook = Arc<dyn Fn(&AuthError) + Send + Sync>;

/// Default number of retries after the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 1;

/// Wraps a base transport with credentials from an ordered scheme list
pub struct AuthenticatedFetch<T: Transport> {
    transport: T,
    schemes: Vec<Arc<dyn Scheme>>,
    coordinator: Arc<RefreshCoordinator>,
    max_retries: u32,
    on_refresh_failure: Option<RefreshFailureHook>,
}

impl<T: Transport> AuthenticatedFetch<T> {
    /// Create a fetch wrapper with its own refresh coordinator
    pub fn new(transport: T, schemes: Vec<Arc<dyn Scheme>>) -> Self {
        let coordinator = Arc::new(RefreshCoordinator::new(schemes.clone()));
        Self::with_coordinator(transport, schemes, coordinator)
    }

    /// Create a fetch wrapper that shares an existing coordinator
    pub fn with_coordinator(
        transport: T,
        schemes: Vec<Arc<dyn Scheme>>,
        coordinator: Arc<RefreshCoordinator>,
    ) -> Self {
        Self {
            transport,
            schemes,
            coordinator,
            max_retries: DEFAULT_MAX_RETRIES,
            on_refresh_failure: None,
        }
    }

    /// Retries allowed after the first attempt. Only 401 responses retry.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn on_refresh_failure<F>(mut self, hook: F) -> Self
    where
        F: Fn(&AuthError) + Send + Sync + 'static,
    {
        self.on_refresh_failure = Some(Arc::new(hook));
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Execute a request with scheme credentials, refreshing and retrying on 401.
    ///
    /// Returns the transport result, the transport error that ended the
    /// final attempt, or the refresh error when a retry could not refresh.
    pub async fn fetch(&self, path: &str, options: RequestOptions) -> Result<T::Output> {
        let mut attempt: u32 = 0;

        loop {
            let (url, request) = self.prepare(path, &options).await;

            tracing::debug!(attempt = attempt, url = %url, "Sending authenticated request");

            let err = match self.transport.fetch(&url, request).await {
                Ok(output) => return Ok(output),
                Err(e) => e,
            };

            if !err.is_unauthorized() || attempt >= self.max_retries {
                if err.is_unauthorized() {
                    tracing::warn!(
                        attempt = attempt,
                        max_retries = self.max_retries,
                        "Still unauthorized after retries, giving up"
                    );
                }
                return Err(err.into());
            }

            attempt += 1;
            tracing::warn!(
                attempt = attempt,
                max_retries = self.max_retries,
                "Received 401, refreshing credentials"
            );

            if let Err(e) = self.coordinator.refresh().await {
                tracing::error!(error = %e, "Credential refresh failed, aborting request");
                if let Some(hook) = &self.on_refresh_failure {
                    hook(&e);
                }
                return Err(e.into());
            }
        }
    }

    /// Build the outgoing path and options for one attempt
    async fn prepare(&self, path: &str, options: &RequestOptions) -> (String, RequestOptions) {
        let mut headers = gather_headers(&self.schemes).await;

        let url = match headers.remove(QUERY_PARAMS_HEADER) {
            Some(fragment) => append_query(path, &fragment),
            None => path.to_string(),
        };

        // Per-call headers always win
        headers.extend(options.headers.iter().map(|(k, v)| (k.clone(), v.clone())));

        let request = RequestOptions {
            method: options.method.clone(),
            headers,
            body: options.body.clone(),
        };
        (url, request)
    }
}

/// Await every scheme's headers in order; later schemes override earlier ones
pub async fn gather_headers(schemes: &[Arc<dyn Scheme>]) -> Headers {
    let mut headers = Headers::new();
    for scheme in schemes {
        headers.extend(scheme.get_headers().await);
    }
    headers
}

/// Append a query fragment, using `&` when the path already has a query
pub fn append_query(path: &str, fragment: &str) -> String {
    let separator = if path.contains('?') { '&' } else { '?' };
    format!("{}{}{}", path, separator, fragment)
}
