// Authentication module
// Credential storage, token conventions, refresh coordination and the auth instance

mod credentials;
mod manager;
mod refresh;
pub mod types;

pub use credentials::{
    CredentialStore, MemoryStore, SqliteStore, ACCESS_TOKEN_KEY, EXPIRES_AT_KEY, REFRESH_TOKEN_KEY,
};
pub use manager::{AuthEvent, AuthManager, SubscriptionId};
pub use refresh::RefreshCoordinator;
pub use types::{Headers, OAuth2TokenResponse, TokenPair, TokenRefresh};
