use anyhow::{Context, Result};
use clap::Parser;
use reqwest::Method;
use std::path::PathBuf;

use crate::auth::Headers;
use crate::schemes::ApiKeyPlacement;

/// authfetch - send an HTTP request with managed credentials
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Request path, joined onto the base URL (absolute URLs are used as-is)
    pub path: String,

    /// HTTP method
    #[arg(short = 'X', long, default_value = "GET")]
    pub method: String,

    /// Extra request header, `Name: value` (repeatable)
    #[arg(short = 'H', long = "header")]
    pub headers: Vec<String>,

    /// Request body
    #[arg(short = 'd', long)]
    pub data: Option<String>,

    /// Base URL of the API
    #[arg(short = 'b', long, env = "AUTHFETCH_BASE_URL")]
    pub base_url: String,

    /// Access token to seed the store with
    #[arg(long, env = "AUTHFETCH_ACCESS_TOKEN")]
    pub access_token: Option<String>,

    /// Refresh token to seed the store with
    #[arg(long, env = "AUTHFETCH_REFRESH_TOKEN")]
    pub refresh_token: Option<String>,

    /// API key (enables the API key scheme)
    #[arg(long, env = "AUTHFETCH_API_KEY")]
    pub api_key: Option<String>,

    /// Header or query parameter name for the API key
    #[arg(long, env = "AUTHFETCH_API_KEY_NAME", default_value = "X-API-Key")]
    pub api_key_name: String,

    /// Where to send the API key (header, query)
    #[arg(long, env = "AUTHFETCH_API_KEY_IN", default_value = "header")]
    pub api_key_in: String,

    /// OAuth2 token endpoint (enables the refresh-grant scheme)
    #[arg(long, env = "AUTHFETCH_TOKEN_URL")]
    pub token_url: Option<String>,

    /// OAuth2 client id
    #[arg(long, env = "AUTHFETCH_CLIENT_ID")]
    pub client_id: Option<String>,

    /// OAuth2 client secret
    #[arg(long, env = "AUTHFETCH_CLIENT_SECRET")]
    pub client_secret: Option<String>,

    /// OAuth2 scopes (repeatable or comma-separated)
    #[arg(long = "scope", env = "AUTHFETCH_SCOPES", value_delimiter = ',')]
    pub scopes: Vec<String>,

    /// SQLite file for persisted credentials (in-memory when omitted)
    #[arg(short = 's', long, env = "AUTHFETCH_STORE_FILE")]
    pub store_file: Option<String>,

    /// Namespace inside the SQLite store
    #[arg(long, env = "AUTHFETCH_STORE_NAMESPACE", default_value = "default")]
    pub store_namespace: String,

    /// Retries after a 401
    #[arg(long, env = "AUTHFETCH_MAX_RETRIES", default_value = "1")]
    pub max_retries: u32,

    /// HTTP request timeout in seconds
    #[arg(long, env = "AUTHFETCH_HTTP_TIMEOUT", default_value = "30")]
    pub http_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    // Request
    pub path: String,
    pub method: Method,
    pub raw_headers: Vec<String>,
    pub body: Option<String>,
    pub base_url: String,

    // Seed credentials
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,

    // API key scheme
    pub api_key: Option<String>,
    pub api_key_name: String,
    pub api_key_in: String,

    // OAuth2 scheme
    pub token_url: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub scopes: Vec<String>,

    // Credential store
    pub store_file: Option<PathBuf>,
    pub store_namespace: String,

    // HTTP client
    pub max_retries: u32,
    pub http_max_connections: usize,
    pub http_connect_timeout: u64,
    pub http_request_timeout: u64,

    pub log_level: String,
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        Self::from_args(CliArgs::parse())
    }

    pub fn from_args(args: CliArgs) -> Result<Self> {
        let method = args
            .method
            .to_uppercase()
            .parse::<Method>()
            .with_context(|| format!("Invalid HTTP method: {}", args.method))?;

        Ok(Config {
            path: args.path,
            method,
            raw_headers: args.headers,
            body: args.data,
            base_url: args.base_url,

            access_token: args.access_token,
            refresh_token: args.refresh_token,

            api_key: args.api_key,
            api_key_name: args.api_key_name,
            api_key_in: args.api_key_in,

            token_url: args.token_url,
            client_id: args.client_id,
            client_secret: args.client_secret,
            scopes: args
                .scopes
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),

            store_file: args.store_file.map(|s| expand_tilde(&s)),
            store_namespace: args.store_namespace,

            max_retries: args.max_retries,

            http_max_connections: std::env::var("AUTHFETCH_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(20),

            http_connect_timeout: std::env::var("AUTHFETCH_CONNECT_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),

            http_request_timeout: args.http_timeout,

            log_level: args.log_level,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            anyhow::bail!(
                "Base URL must start with http:// or https://: {}",
                self.base_url
            );
        }

        if self.token_url.is_some() && self.client_id.is_none() {
            anyhow::bail!("--client-id is required when --token-url is set");
        }

        self.api_key_placement()?;
        self.request_headers()?;

        Ok(())
    }

    pub fn api_key_placement(&self) -> Result<ApiKeyPlacement> {
        self.api_key_in.parse()
    }

    /// Per-call headers from `-H` flags
    pub fn request_headers(&self) -> Result<Headers> {
        self.raw_headers.iter().map(|raw| parse_header(raw)).collect()
    }
}

/// Parse `Name: value`
fn parse_header(raw: &str) -> Result<(String, String)> {
    let (name, value) = raw
        .split_once(':')
        .with_context(|| format!("Invalid header (expected 'Name: value'): {}", raw))?;

    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("Invalid header (empty name): {}", raw);
    }

    Ok((name.to_string(), value.trim().to_string()))
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
