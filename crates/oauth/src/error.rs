//! Error types for OAuth operations

/// Errors from OAuth and credential operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("credential parse error: {0}")]
    CredentialParse(String),

    #[error("missing credentials: {0}")]
    MissingCredentials(String),

    #[error("invalid redirect URI: {0}")]
    InvalidRedirectUri(String),

    #[error("invalid authorization URL: {0}")]
    AuthorizationUrl(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result alias for OAuth operations.
pub type Result<T> = std::result::Result<T, Error>;
