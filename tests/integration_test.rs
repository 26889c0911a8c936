// Integration tests for authfetch
//
// These tests drive the public API over real HTTP against mockito servers:
// credential injection, 401 refresh-and-retry through the OAuth2 grant,
// query-mode API keys and persisted credentials.

use mockito::Matcher;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

use authfetch::{
    auth::{AuthManager, CredentialStore, MemoryStore, SqliteStore, TokenPair, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY},
    error::{AuthErrorCode, FetchError},
    http_client::{RequestOptions, ReqwestTransport},
    schemes::{ApiKeyScheme, BearerScheme, CompositeScheme, OAuth2Config, OAuth2Scheme, Scheme},
};

// ==================================================================================================
// Test Helpers
// ==================================================================================================

fn transport(server: &mockito::ServerGuard) -> ReqwestTransport {
    ReqwestTransport::new(server.url(), 4, 5, 5).expect("Failed to create transport")
}

fn oauth_scheme(server: &mockito::ServerGuard, store: Arc<dyn CredentialStore>) -> Arc<dyn Scheme> {
    let config = OAuth2Config::new(format!("{}/oauth/token", server.url()), "client-123")
        .with_client_secret("secret")
        .with_scopes(["read", "write"]);
    Arc::new(OAuth2Scheme::new(config, store).expect("Failed to create OAuth2 scheme"))
}

fn temp_db_path(name: &str) -> std::path::PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("authfetch-{}-{}-{}.db", name, std::process::id(), nanos))
}

// ==================================================================================================
// Refresh and retry
// ==================================================================================================

#[tokio::test]
async fn test_oauth2_refresh_on_401_then_retry() {
    let mut server = mockito::Server::new_async().await;

    let stale = server
        .mock("GET", "/api/data")
        .match_header("authorization", "Bearer old-token")
        .with_status(401)
        .with_body("token expired")
        .expect(1)
        .create_async()
        .await;

    let token = server
        .mock("POST", "/oauth/token")
        .match_header("content-type", "application/x-www-form-urlencoded")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
            Matcher::UrlEncoded("refresh_token".into(), "rt-1".into()),
            Matcher::UrlEncoded("client_id".into(), "client-123".into()),
            Matcher::UrlEncoded("scope".into(), "read write".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"new-token","expires_in":3600}"#)
        .expect(1)
        .create_async()
        .await;

    let fresh = server
        .mock("GET", "/api/data")
        .match_header("authorization", "Bearer new-token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"data":"success"}"#)
        .expect(1)
        .create_async()
        .await;

    let store: Arc<dyn CredentialStore> = Arc::new(MemoryStore::new());
    let auth = AuthManager::new(
        store.clone(),
        vec![oauth_scheme(&server, store.clone())],
        transport(&server),
    );
    auth.set_tokens(TokenPair::new("old-token").with_refresh_token("rt-1"));

    let response = assert_ok!(auth.fetch("/api/data", RequestOptions::default()).await);
    let body: Value = response.json().unwrap();

    assert_eq!(body, json!({"data": "success"}));
    assert_eq!(auth.get_access_token().as_deref(), Some("new-token"));
    // Not rotated by the endpoint, so the old refresh token stays
    assert_eq!(store.get(REFRESH_TOKEN_KEY).as_deref(), Some("rt-1"));

    stale.assert_async().await;
    token.assert_async().await;
    fresh.assert_async().await;
}

#[tokio::test]
async fn test_token_endpoint_rejection_surfaces_refresh_failed() {
    let mut server = mockito::Server::new_async().await;

    let api = server
        .mock("GET", "/api/data")
        .with_status(401)
        .expect(1)
        .create_async()
        .await;

    let _token = server
        .mock("POST", "/oauth/token")
        .with_status(400)
        .with_body(r#"{"error":"invalid_grant"}"#)
        .create_async()
        .await;

    let failures = Arc::new(AtomicUsize::new(0));
    let counter = failures.clone();

    let store: Arc<dyn CredentialStore> = Arc::new(MemoryStore::new());
    let auth = AuthManager::new(
        store.clone(),
        vec![oauth_scheme(&server, store.clone())],
        transport(&server),
    )
    .on_refresh_failure(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    auth.set_tokens(TokenPair::new("old-token").with_refresh_token("revoked"));

    let err = assert_err!(auth.fetch("/api/data", RequestOptions::default()).await);

    match err {
        FetchError::Auth(e) => {
            assert_eq!(e.code(), AuthErrorCode::RefreshFailed);
            assert_eq!(e.message(), "All refresh attempts failed");
            assert!(e.cause().unwrap().to_string().contains("400"));
        }
        other => panic!("expected auth error, got {:?}", other),
    }
    assert_eq!(failures.load(Ordering::SeqCst), 1);
    api.assert_async().await;
}

#[tokio::test]
async fn test_server_error_is_not_retried() {
    let mut server = mockito::Server::new_async().await;

    let api = server
        .mock("GET", "/api/data")
        .with_status(503)
        .with_body("maintenance")
        .expect(1)
        .create_async()
        .await;

    let store: Arc<dyn CredentialStore> = Arc::new(MemoryStore::new());
    let auth = AuthManager::new(
        store.clone(),
        vec![oauth_scheme(&server, store.clone())],
        transport(&server),
    )
    .with_max_retries(3);
    auth.set_tokens(TokenPair::new("token").with_refresh_token("rt"));

    let err = assert_err!(auth.fetch("/api/data", RequestOptions::default()).await);

    assert_eq!(err.status(), Some(503));
    api.assert_async().await;
}

// ==================================================================================================
// Header composition
// ==================================================================================================

#[tokio::test]
async fn test_query_mode_api_key_reaches_the_url() {
    let mut server = mockito::Server::new_async().await;

    let api = server
        .mock("GET", "/api/data")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("page".into(), "2".into()),
            Matcher::UrlEncoded("api_key".into(), "my key&more".into()),
        ]))
        .match_header("x-auth-query-params", Matcher::Missing)
        .with_status(200)
        .with_body("ok")
        .expect(1)
        .create_async()
        .await;

    let store: Arc<dyn CredentialStore> = Arc::new(MemoryStore::new());
    let auth = AuthManager::new(
        store,
        vec![Arc::new(ApiKeyScheme::query("api_key", "my key&more"))],
        transport(&server),
    );

    let response = assert_ok!(auth.fetch("/api/data?page=2", RequestOptions::default()).await);

    assert_eq!(response.body, "ok");
    api.assert_async().await;
}

#[tokio::test]
async fn test_composite_headers_and_explicit_override() {
    let mut server = mockito::Server::new_async().await;

    let api = server
        .mock("POST", "/api/items")
        .match_header("authorization", "Bearer explicit")
        .match_header("x-api-key", "k-1")
        .match_body(r#"{"name":"widget"}"#)
        .with_status(201)
        .with_body(r#"{"id":1}"#)
        .expect(1)
        .create_async()
        .await;

    let store: Arc<dyn CredentialStore> = Arc::new(MemoryStore::new());
    store.set(ACCESS_TOKEN_KEY, "stored");
    let composite = CompositeScheme::new(vec![
        Arc::new(BearerScheme::new(store.clone())),
        Arc::new(ApiKeyScheme::header("X-API-Key", "k-1")),
    ]);
    let auth = AuthManager::new(store, vec![Arc::new(composite)], transport(&server));

    let options = RequestOptions::new(reqwest::Method::POST)
        .header("Authorization", "Bearer explicit")
        .json(&json!({"name": "widget"}))
        .unwrap();
    let response = assert_ok!(auth.fetch("/api/items", options).await);

    assert_eq!(response.status, 201);
    api.assert_async().await;
}

// ==================================================================================================
// Persistence
// ==================================================================================================

#[tokio::test]
async fn test_sqlite_store_keeps_refreshed_tokens() {
    let mut server = mockito::Server::new_async().await;
    let path = temp_db_path("refresh");

    let _token = server
        .mock("POST", "/oauth/token")
        .with_status(200)
        .with_body(r#"{"access_token":"persisted-token","refresh_token":"rt-2","expires_in":600}"#)
        .create_async()
        .await;

    {
        let store: Arc<dyn CredentialStore> = Arc::new(SqliteStore::open(&path, "tenant-a").unwrap());
        let auth = AuthManager::new(
            store.clone(),
            vec![oauth_scheme(&server, store.clone())],
            transport(&server),
        );
        auth.set_tokens(TokenPair::new("initial").with_refresh_token("rt-1"));

        assert_ok!(auth.refresh().await);
    }

    let reopened = SqliteStore::open(&path, "tenant-a").unwrap();
    assert_eq!(reopened.get(ACCESS_TOKEN_KEY).as_deref(), Some("persisted-token"));
    assert_eq!(reopened.get(REFRESH_TOKEN_KEY).as_deref(), Some("rt-2"));

    let other_tenant = SqliteStore::open(&path, "tenant-b").unwrap();
    assert!(other_tenant.get(ACCESS_TOKEN_KEY).is_none());

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn test_clear_logs_out_every_scheme() {
    let server = mockito::Server::new_async().await;
    let store: Arc<dyn CredentialStore> = Arc::new(MemoryStore::new());
    let auth = AuthManager::new(
        store.clone(),
        vec![oauth_scheme(&server, store.clone())],
        transport(&server),
    );

    auth.set_tokens(TokenPair::new("a").with_refresh_token("r").with_expires_in(60));
    assert!(auth.is_authenticated());

    auth.clear();

    assert!(!auth.is_authenticated());
    assert!(auth.get_access_token().is_none());
    assert!(store.get(REFRESH_TOKEN_KEY).is_none());

    // Without a refresh token the grant cannot run
    let err = assert_err!(auth.refresh().await);
    assert_eq!(err.code(), AuthErrorCode::RefreshFailed);
}
