use anyhow::{Context, Result};
use std::sync::Arc;

use authfetch::auth::{AuthEvent, AuthManager, CredentialStore, MemoryStore, SqliteStore, TokenPair};
use authfetch::config::Config;
use authfetch::http_client::{RequestOptions, ReqwestTransport};
use authfetch::schemes::{ApiKeyScheme, BearerScheme, KeySource, OAuth2Config, OAuth2Scheme, Scheme};
use authfetch::utils::redact;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (for log level)
    let config = Config::load()?;
    config.validate()?;

    // Initialize logging with a configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(method = %config.method, path = %config.path, base_url = %config.base_url, "Starting request");

    let store = open_store(&config)?;
    let schemes = build_schemes(&config, Arc::clone(&store))?;

    let transport = ReqwestTransport::new(
        config.base_url.clone(),
        config.http_max_connections,
        config.http_connect_timeout,
        config.http_request_timeout,
    )?;

    let auth = AuthManager::new(Arc::clone(&store), schemes, transport)
        .with_max_retries(config.max_retries)
        .on_refresh_failure(|e| {
            tracing::error!(code = %e.code(), "❌ Credential refresh failed: {}", e);
        });

    auth.subscribe(|event| match event {
        AuthEvent::TokensSet => tracing::debug!("Credential store updated"),
        AuthEvent::Cleared => tracing::debug!("Credential store cleared"),
    });

    if let Some(access_token) = config.access_token.clone() {
        let mut tokens = TokenPair::new(access_token);
        if let Some(refresh_token) = config.refresh_token.clone() {
            tokens = tokens.with_refresh_token(refresh_token);
        }
        auth.set_tokens(tokens);
    } else if let Some(refresh_token) = config.refresh_token.as_deref() {
        // Refresh token alone: the first 401 triggers the grant
        store.set(authfetch::auth::REFRESH_TOKEN_KEY, refresh_token);
    }

    match auth.get_access_token() {
        Some(token) => tracing::info!("Using access token {}", redact(&token)),
        None if auth.is_authenticated() => tracing::info!("Using API key credentials"),
        None => tracing::warn!("No credentials available, sending request unauthenticated"),
    }

    let mut options = RequestOptions::new(config.method.clone());
    options.headers = config.request_headers()?;
    options.body = config.body.clone();

    match auth.fetch(&config.path, options).await {
        Ok(response) => {
            tracing::info!(status = response.status, "✅ Request succeeded");
            println!("{}", response.body);
            Ok(())
        }
        Err(e) => {
            if let Some(status) = e.status() {
                tracing::error!(status = status, "Request failed");
            }
            Err::<(), _>(e).context("Request failed")
        }
    }
}

fn open_store(config: &Config) -> Result<Arc<dyn CredentialStore>> {
    match &config.store_file {
        Some(path) => {
            tracing::info!("Loading credentials from SQLite: {}", path.display());
            let store = SqliteStore::open(path, config.store_namespace.clone())?;
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(MemoryStore::new())),
    }
}

/// OAuth2 when a token URL is configured, otherwise a store-backed bearer.
/// The API key scheme, if any, comes after.
fn build_schemes(config: &Config, store: Arc<dyn CredentialStore>) -> Result<Vec<Arc<dyn Scheme>>> {
    let mut schemes: Vec<Arc<dyn Scheme>> = Vec::new();

    match (&config.token_url, &config.client_id) {
        (Some(token_url), Some(client_id)) => {
            let mut oauth = OAuth2Config::new(token_url.clone(), client_id.clone())
                .with_scopes(config.scopes.iter().cloned());
            if let Some(secret) = &config.client_secret {
                oauth = oauth.with_client_secret(secret.clone());
            }
            schemes.push(Arc::new(OAuth2Scheme::new(oauth, Arc::clone(&store))?));
        }
        _ => schemes.push(Arc::new(BearerScheme::new(Arc::clone(&store)))),
    }

    if let Some(key) = &config.api_key {
        let scheme = ApiKeyScheme::new(
            config.api_key_name.clone(),
            KeySource::Static(key.clone()),
            config.api_key_placement()?,
        );
        schemes.push(Arc::new(scheme));
    }

    tracing::debug!(
        schemes = ?schemes.iter().map(|s| s.name().to_string()).collect::<Vec<_>>(),
        "Schemes configured"
    );

    Ok(schemes)
}
