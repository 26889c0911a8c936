// Custom scheme built from caller-supplied closures

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;

use super::Scheme;
use crate::auth::Headers;

type HeadersFn = Arc<dyn Fn() -> BoxFuture<'static, Headers> + Send + Sync>;
type AuthenticatedFn = Arc<dyn Fn() -> bool + Send + Sync>;
type ClearFn = Arc<dyn Fn() + Send + Sync>;
type CustomRefreshFn = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Escape hatch for strategies the built-in schemes do not cover
pub struct CustomScheme {
    name: String,
    get_headers: HeadersFn,
    is_authenticated: AuthenticatedFn,
    clear: Option<ClearFn>,
    refresh: Option<CustomRefreshFn>,
}

impl CustomScheme {
    pub fn new<H, HFut, A>(name: impl Into<String>, get_headers: H, is_authenticated: A) -> Self
    where
        H: Fn() -> HFut + Send + Sync + 'static,
        HFut: Future<Output = Headers> + Send + 'static,
        A: Fn() -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            get_headers: Arc::new(move || get_headers().boxed()),
            is_authenticated: Arc::new(is_authenticated),
            clear: None,
            refresh: None,
        }
    }

    pub fn with_clear<C>(mut self, clear: C) -> Self
    where
        C: Fn() + Send + Sync + 'static,
    {
        self.clear = Some(Arc::new(clear));
        self
    }

    /// Supplying a refresh closure makes the scheme refresh-capable
    pub fn with_refresh<R, RFut>(mut self, refresh: R) -> Self
    where
        R: Fn() -> RFut + Send + Sync + 'static,
        RFut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.refresh = Some(Arc::new(move || refresh().boxed()));
        self
    }
}

#[async_trait]
impl Scheme for CustomScheme {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_headers(&self) -> Headers {
        (self.get_headers)().await
    }

    fn is_authenticated(&self) -> bool {
        (self.is_authenticated)()
    }

    fn clear(&self) {
        if let Some(clear) = &self.clear {
            clear();
        }
    }

    fn supports_refresh(&self) -> bool {
        self.refresh.is_some()
    }

    async fn refresh(&self) -> anyhow::Result<()> {
        match &self.refresh {
            Some(refresh) => refresh().await,
            None => Err(crate::error::AuthError::refresh_failed(format!(
                "Scheme '{}' does not support token refresh",
                self.name
            ))
            .into()),
        }
    }
}
