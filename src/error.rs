// Error handling module
// Defines the refresh-path error, the transport error and what the authenticated fetch returns

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Shared, cloneable error used as the cause of an [`AuthError`]
pub type SharedError = Arc<dyn StdError + Send + Sync + 'static>;

/// Machine-readable auth error code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorCode {
    RefreshFailed,
}

impl AuthErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthErrorCode::RefreshFailed => "REFRESH_FAILED",
        }
    }
}

impl fmt::Display for AuthErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error raised on every refresh-path failure.
///
/// Cloning is cheap and keeps the cause behind the same `Arc`, so every
/// waiter of a shared refresh observes the identical error.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct AuthError {
    code: AuthErrorCode,
    message: String,
    #[source]
    cause: Option<SharedError>,
}

impl AuthError {
    pub fn new(code: AuthErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
        }
    }

    /// Shorthand for a `REFRESH_FAILED` error
    pub fn refresh_failed(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::RefreshFailed, message)
    }

    /// Attach the underlying failure
    pub fn with_cause(mut self, cause: impl Into<anyhow::Error>) -> Self {
        let boxed: Box<dyn StdError + Send + Sync + 'static> = cause.into().into();
        self.cause = Some(Arc::from(boxed));
        self
    }

    pub fn code(&self) -> AuthErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&SharedError> {
        self.cause.as_ref()
    }
}

/// Error produced by a base transport
#[derive(Error, Debug)]
pub enum TransportError {
    /// Non-success response
    #[error("request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    /// Anything that did not produce a response (connection, timeout, ...)
    #[error("request failed: {0}")]
    Other(#[from] anyhow::Error),
}

impl TransportError {
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            TransportError::Other(_) => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }
}

/// Error returned by the authenticated fetch
#[derive(Error, Debug)]
pub enum FetchError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl FetchError {
    /// Status of the final transport failure, if it carried one
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Transport(e) => e.status(),
            FetchError::Auth(_) => None,
        }
    }

    pub fn as_auth(&self) -> Option<&AuthError> {
        match self {
            FetchError::Auth(e) => Some(e),
            FetchError::Transport(_) => None,
        }
    }
}

/// Result type alias for fetch operations
pub type Result<T> = std::result::Result<T, FetchError>;
