//! Error types for the session lifecycle

/// Errors from refresh, interactive login, and callback completion.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("credential error: {0}")]
    Credential(#[from] oauth::Error),

    #[error("no interactive login is pending")]
    NoPendingLogin,

    #[error("callback state does not match the pending login")]
    StateMismatch,

    #[error("authorization code exchange failed: {0}")]
    Exchange(String),

    #[error("granted scopes are missing required scopes: {}", .0.join(" "))]
    ScopeInsufficient(Vec<String>),

    #[error("interactive login did not complete before the deadline (exit code {exit_code})")]
    LoginTimeout { exit_code: i32 },

    #[error("session is terminated (exit code {exit_code})")]
    Terminated { exit_code: i32 },
}

/// Result alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;
