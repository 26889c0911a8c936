// authfetch - Library root

pub mod auth;
pub mod config;
pub mod error;
pub mod fetch;
pub mod http_client;
pub mod schemes;
pub mod utils;

pub use auth::{AuthEvent, AuthManager, CredentialStore, MemoryStore, SqliteStore, TokenPair};
pub use error::{AuthError, AuthErrorCode, FetchError, TransportError};
pub use fetch::AuthenticatedFetch;
pub use http_client::{transport_fn, HttpResponse, RequestOptions, ReqwestTransport, Transport};
