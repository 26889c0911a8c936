// Authentication schemes
// Each scheme produces request headers and may know how to refresh credentials

use async_trait::async_trait;

use crate::auth::Headers;
use crate::error::AuthError;

mod api_key;
mod bearer;
mod composite;
mod custom;
mod oauth2;

pub use api_key::{ApiKeyPlacement, ApiKeyScheme, KeySource, QUERY_PARAMS_HEADER};
pub use bearer::{BearerScheme, RefreshFn, TokenSource};
pub use composite::CompositeScheme;
pub use custom::CustomScheme;
pub use oauth2::{OAuth2Config, OAuth2Scheme};

/// Capability set shared by every authentication strategy.
///
/// Refresh is optional: a scheme advertises it through
/// [`Scheme::supports_refresh`], and the refresh coordinator skips schemes
/// that do not.
#[async_trait]
pub trait Scheme: Send + Sync {
    /// Scheme identifier, used in logs and composite names
    fn name(&self) -> &str;

    /// Headers to attach to the next request
    async fn get_headers(&self) -> Headers;

    fn is_authenticated(&self) -> bool;

    /// Forget any credentials this scheme owns
    fn clear(&self);

    fn supports_refresh(&self) -> bool {
        false
    }

    /// Obtain fresh credentials
    async fn refresh(&self) -> anyhow::Result<()> {
        Err(AuthError::refresh_failed(format!(
            "Scheme '{}' does not support token refresh",
            self.name()
        ))
        .into())
    }
}

/// Build a single-entry header set
pub(crate) fn single_header(name: impl Into<String>, value: impl Into<String>) -> Headers {
    let mut headers = Headers::new();
    headers.insert(name.into(), value.into());
    headers
}
