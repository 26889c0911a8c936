// Bearer token scheme with optional proactive refresh

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;

use super::{single_header, Scheme};
use crate::auth::types::{expires_within, non_empty, persist_tokens, remove_tokens, stored_expiry};
use crate::auth::{CredentialStore, Headers, TokenRefresh, ACCESS_TOKEN_KEY};
use crate::error::AuthError;

/// Caller-supplied refresh function
pub type RefreshFn = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<TokenRefresh>> + Send + Sync>;

/// Where the bearer token comes from
#[derive(Clone)]
pub enum TokenSource {
    /// Fixed token
    Static(String),
    /// Live lookup on every request
    Dynamic(Arc<dyn Fn() -> Option<String> + Send + Sync>),
    /// The store's `access_token` entry
    Store,
}

struct RefreshConfig {
    refresh_fn: RefreshFn,
    /// Seconds before expiry at which `get_headers` refreshes proactively
    refresh_before_expiry: u64,
}

/// `Authorization: Bearer <token>`
pub struct BearerScheme {
    token: TokenSource,
    store: Arc<dyn CredentialStore>,
    refresh: Option<RefreshConfig>,
}

impl BearerScheme {
    /// Bearer scheme reading its token from the store
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self {
            token: TokenSource::Store,
            store,
            refresh: None,
        }
    }

    /// Use a fixed token instead of the store
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = TokenSource::Static(token.into());
        self
    }

    /// Resolve the token through a closure on every request
    pub fn with_token_fn<F>(mut self, token_fn: F) -> Self
    where
        F: Fn() -> Option<String> + Send + Sync + 'static,
    {
        self.token = TokenSource::Dynamic(Arc::new(token_fn));
        self
    }

    /// Enable refresh. `refresh_before_expiry` is in seconds.
    pub fn with_refresh<F, Fut>(mut self, refresh_fn: F, refresh_before_expiry: u64) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<TokenRefresh>> + Send + 'static,
    {
        self.refresh = Some(RefreshConfig {
            refresh_fn: Arc::new(move || refresh_fn().boxed()),
            refresh_before_expiry,
        });
        self
    }

    fn resolve_token(&self) -> Option<String> {
        let token = match &self.token {
            TokenSource::Static(token) => Some(token.clone()),
            TokenSource::Dynamic(token_fn) => token_fn(),
            TokenSource::Store => self.store.get(ACCESS_TOKEN_KEY),
        };
        non_empty(token)
    }

    async fn run_refresh(&self, config: &RefreshConfig) -> anyhow::Result<()> {
        let tokens = (config.refresh_fn)().await?;
        persist_tokens(self.store.as_ref(), &tokens);
        Ok(())
    }

    fn needs_proactive_refresh(&self, config: &RefreshConfig) -> bool {
        stored_expiry(self.store.as_ref())
            .map(|expires_at| expires_within(expires_at, config.refresh_before_expiry))
            .unwrap_or(false)
    }
}

#[async_trait]
impl Scheme for BearerScheme {
    fn name(&self) -> &str {
        "bearer"
    }

    async fn get_headers(&self) -> Headers {
        if let Some(config) = &self.refresh {
            if self.needs_proactive_refresh(config) {
                tracing::debug!("Access token expiring soon, refreshing proactively");
                // Fail open: the request goes out with the current token
                if let Err(e) = self.run_refresh(config).await {
                    tracing::warn!(error = %e, "Proactive token refresh failed, using existing token");
                }
            }
        }

        match self.resolve_token() {
            Some(token) => single_header("Authorization", format!("Bearer {}", token)),
            None => Headers::new(),
        }
    }

    fn is_authenticated(&self) -> bool {
        self.resolve_token().is_some()
    }

    fn clear(&self) {
        remove_tokens(self.store.as_ref());
    }

    fn supports_refresh(&self) -> bool {
        true
    }

    async fn refresh(&self) -> anyhow::Result<()> {
        let config = self.refresh.as_ref().ok_or_else(|| {
            AuthError::refresh_failed("Bearer scheme has no refresh function configured")
        })?;

        tracing::debug!("Refreshing bearer token...");
        self.run_refresh(config).await
    }
}
