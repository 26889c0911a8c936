use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use super::credentials::{CredentialStore, ACCESS_TOKEN_KEY};
use super::refresh::RefreshCoordinator;
use super::types::{non_empty, persist_tokens, TokenPair};
use crate::error::{AuthError, Result};
use crate::fetch::AuthenticatedFetch;
use crate::http_client::{RequestOptions, Transport};
use crate::schemes::Scheme;

/// Credential change notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// New tokens were written through [`AuthManager::set_tokens`]
    TokensSet,
    /// Credentials were cleared through [`AuthManager::clear`]
    Cleared,
}

/// Handle returned by [`AuthManager::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&AuthEvent) + Send + Sync>;

/// Authentication manager
/// Binds a credential store, an ordered scheme list and the authenticated fetch
pub struct AuthManager<T: Transport> {
    store: Arc<dyn CredentialStore>,

    schemes: Vec<Arc<dyn Scheme>>,

    /// Shared with the fetch wrapper so explicit and 401-driven refreshes collapse
    coordinator: Arc<RefreshCoordinator>,

    fetch: AuthenticatedFetch<T>,

    listeners: DashMap<u64, Listener>,

    next_listener_id: AtomicU64,
}

impl<T: Transport> AuthManager<T> {
    pub fn new(store: Arc<dyn CredentialStore>, schemes: Vec<Arc<dyn Scheme>>, transport: T) -> Self {
        let coordinator = Arc::new(RefreshCoordinator::new(schemes.clone()));
        let fetch =
            AuthenticatedFetch::with_coordinator(transport, schemes.clone(), Arc::clone(&coordinator));

        tracing::debug!(
            schemes = ?schemes.iter().map(|s| s.name()).collect::<Vec<_>>(),
            "Auth manager created"
        );

        Self {
            store,
            schemes,
            coordinator,
            fetch,
            listeners: DashMap::new(),
            next_listener_id: AtomicU64::new(1),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.fetch = self.fetch.with_max_retries(max_retries);
        self
    }

    pub fn on_refresh_failure<F>(mut self, hook: F) -> Self
    where
        F: Fn(&AuthError) + Send + Sync + 'static,
    {
        self.fetch = self.fetch.on_refresh_failure(hook);
        self
    }

    /// Authenticated request through the owned fetch wrapper
    pub async fn fetch(&self, path: &str, options: RequestOptions) -> Result<T::Output> {
        self.fetch.fetch(path, options).await
    }

    /// Refresh credentials now, joining any refresh already in flight
    pub async fn refresh(&self) -> std::result::Result<(), AuthError> {
        self.coordinator.refresh().await
    }

    /// True if any scheme reports authenticated
    pub fn is_authenticated(&self) -> bool {
        self.schemes.iter().any(|s| s.is_authenticated())
    }

    /// Stored access token, if any
    pub fn get_access_token(&self) -> Option<String> {
        non_empty(self.store.get(ACCESS_TOKEN_KEY))
    }

    /// Persist a token pair and notify subscribers
    pub fn set_tokens(&self, tokens: TokenPair) {
        persist_tokens(self.store.as_ref(), &tokens);
        tracing::info!("Tokens updated");
        self.notify(AuthEvent::TokensSet);
    }

    /// Clear the store and every scheme, then notify subscribers
    pub fn clear(&self) {
        self.store.clear();
        for scheme in &self.schemes {
            scheme.clear();
        }
        tracing::info!("Credentials cleared");
        self.notify(AuthEvent::Cleared);
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&AuthEvent) + Send + Sync + 'static,
    {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.insert(id, Arc::new(listener));
        SubscriptionId(id)
    }

    /// Returns false if the subscription was already removed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.listeners.remove(&id.0).is_some()
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    pub fn schemes(&self) -> &[Arc<dyn Scheme>] {
        &self.schemes
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    fn notify(&self, event: AuthEvent) {
        // Snapshot first so listeners can (un)subscribe without deadlocking the map
        let listeners: Vec<Listener> = self
            .listeners
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        tracing::debug!(event = ?event, listeners = listeners.len(), "Notifying subscribers");

        for listener in listeners {
            listener(&event);
        }
    }
}
