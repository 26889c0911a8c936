// Authentication types

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Deserialize;

use super::credentials::{CredentialStore, ACCESS_TOKEN_KEY, EXPIRES_AT_KEY, REFRESH_TOKEN_KEY};

/// Header set produced by schemes and sent with a request.
/// Later inserts win on key collision.
pub type Headers = BTreeMap<String, String>;

/// Token pair written by a login flow
#[derive(Debug, Clone, PartialEq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Lifetime in seconds from now
    pub expires_in: Option<u64>,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_in: None,
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn with_expires_in(mut self, seconds: u64) -> Self {
        self.expires_in = Some(seconds);
        self
    }
}

/// Result of a caller-supplied refresh function
pub type TokenRefresh = TokenPair;

/// OAuth2 token endpoint response
#[derive(Debug, Deserialize)]
pub struct OAuth2TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
}

impl From<OAuth2TokenResponse> for TokenPair {
    fn from(data: OAuth2TokenResponse) -> Self {
        Self {
            access_token: data.access_token,
            refresh_token: data.refresh_token,
            expires_in: data.expires_in,
        }
    }
}

/// Write freshly issued tokens to the store.
///
/// `access_token` is always overwritten. `refresh_token` and `expires_at`
/// keep their previous values when the pair does not carry them.
pub fn persist_tokens(store: &dyn CredentialStore, tokens: &TokenPair) {
    store.set(ACCESS_TOKEN_KEY, &tokens.access_token);

    if let Some(ref refresh_token) = tokens.refresh_token {
        store.set(REFRESH_TOKEN_KEY, refresh_token);
    }

    if let Some(expires_in) = tokens.expires_in {
        match from_now(expires_in) {
            Some(expires_at) => store.set(EXPIRES_AT_KEY, &expires_at.to_rfc3339()),
            None => tracing::warn!(expires_in, "Token lifetime out of range, expiry not stored"),
        }
    }
}

/// Remove the conventional token keys
pub fn remove_tokens(store: &dyn CredentialStore) {
    store.remove(ACCESS_TOKEN_KEY);
    store.remove(REFRESH_TOKEN_KEY);
    store.remove(EXPIRES_AT_KEY);
}

/// Read the stored expiry, if any
pub fn stored_expiry(store: &dyn CredentialStore) -> Option<DateTime<Utc>> {
    store
        .get(EXPIRES_AT_KEY)
        .and_then(|raw| parse_expiry(&raw))
}

/// Parse an expiry written as RFC 3339 or as epoch milliseconds
pub fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    raw.parse::<i64>()
        .ok()
        .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
}

/// True when `expires_at` falls within `threshold_secs` of now (or is past)
pub fn expires_within(expires_at: DateTime<Utc>, threshold_secs: u64) -> bool {
    // A threshold past the representable range covers every expiry
    from_now(threshold_secs).map_or(true, |limit| expires_at <= limit)
}

/// `now + secs`, or `None` when it does not fit in a `DateTime`
fn from_now(secs: u64) -> Option<DateTime<Utc>> {
    let secs = i64::try_from(secs).ok()?;
    Utc::now().checked_add_signed(Duration::try_seconds(secs)?)
}

/// Treat empty strings as "no value"
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
