// OAuth2 refresh-token grant scheme

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;

use super::{single_header, Scheme};
use crate::auth::types::{non_empty, persist_tokens, remove_tokens};
use crate::auth::{CredentialStore, Headers, OAuth2TokenResponse, TokenPair, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
use crate::error::AuthError;

/// Token endpoint settings
#[derive(Debug, Clone)]
pub struct OAuth2Config {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub scopes: Vec<String>,
    /// Additional form fields sent with every refresh
    pub extra_body: BTreeMap<String, String>,
    /// Additional headers sent to the token endpoint
    pub extra_headers: BTreeMap<String, String>,
}

impl OAuth2Config {
    pub fn new(token_url: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: None,
            scopes: Vec::new(),
            extra_body: BTreeMap::new(),
            extra_headers: BTreeMap::new(),
        }
    }

    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_body_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_body.insert(name.into(), value.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(name.into(), value.into());
        self
    }

    /// Form body for a refresh-token grant
    fn refresh_form(&self, refresh_token: &str) -> Vec<(String, String)> {
        let mut form = vec![
            ("grant_type".to_string(), "refresh_token".to_string()),
            ("refresh_token".to_string(), refresh_token.to_string()),
            ("client_id".to_string(), self.client_id.clone()),
        ];

        if let Some(ref secret) = self.client_secret {
            form.push(("client_secret".to_string(), secret.clone()));
        }

        if !self.scopes.is_empty() {
            form.push(("scope".to_string(), self.scopes.join(" ")));
        }

        form.extend(
            self.extra_body
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        form
    }
}

/// Reads `access_token` as a bearer header and refreshes it with the
/// stored `refresh_token` against the configured token endpoint.
pub struct OAuth2Scheme {
    config: OAuth2Config,
    store: Arc<dyn CredentialStore>,
    client: Client,
}

impl OAuth2Scheme {
    pub fn new(config: OAuth2Config, store: Arc<dyn CredentialStore>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self::with_client(config, store, client))
    }

    /// Reuse an existing client (connection pool, proxy settings, ...)
    pub fn with_client(config: OAuth2Config, store: Arc<dyn CredentialStore>, client: Client) -> Self {
        Self {
            config,
            store,
            client,
        }
    }

    pub fn config(&self) -> &OAuth2Config {
        &self.config
    }

    async fn request_tokens(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        tracing::info!(token_url = %self.config.token_url, "Refreshing access token via OAuth2 refresh grant...");

        let form = self.config.refresh_form(refresh_token);

        let mut request = self
            .client
            .post(&self.config.token_url)
            .header("Content-Type", "application/x-www-form-urlencoded");
        for (name, value) in &self.config.extra_headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.form(&form).send().await.map_err(|e| {
            AuthError::refresh_failed("Failed to send OAuth2 refresh request").with_cause(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!(
                status = status.as_u16(),
                body = %error_text,
                "OAuth2 token refresh failed"
            );
            return Err(AuthError::refresh_failed(format!(
                "Token refresh failed: {}",
                status
            )));
        }

        let data: OAuth2TokenResponse = response.json().await.map_err(|e| {
            AuthError::refresh_failed("Failed to parse OAuth2 refresh response").with_cause(e)
        })?;

        tracing::info!(
            rotated_refresh_token = data.refresh_token.is_some(),
            expires_in = ?data.expires_in,
            "Token refreshed via OAuth2"
        );

        Ok(data.into())
    }
}

#[async_trait]
impl Scheme for OAuth2Scheme {
    fn name(&self) -> &str {
        "oauth2"
    }

    async fn get_headers(&self) -> Headers {
        match non_empty(self.store.get(ACCESS_TOKEN_KEY)) {
            Some(token) => single_header("Authorization", format!("Bearer {}", token)),
            None => Headers::new(),
        }
    }

    fn is_authenticated(&self) -> bool {
        non_empty(self.store.get(ACCESS_TOKEN_KEY)).is_some()
    }

    fn clear(&self) {
        remove_tokens(self.store.as_ref());
    }

    fn supports_refresh(&self) -> bool {
        true
    }

    async fn refresh(&self) -> anyhow::Result<()> {
        let refresh_token = non_empty(self.store.get(REFRESH_TOKEN_KEY))
            .ok_or_else(|| AuthError::refresh_failed("No refresh token available"))?;

        let tokens = self.request_tokens(&refresh_token).await?;
        persist_tokens(self.store.as_ref(), &tokens);
        Ok(())
    }
}
