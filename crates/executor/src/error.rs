//! Error type surfaced to callers of the executor

use remote::{CallError, ErrorClassification};

/// Failure of a logical call (all attempts included).
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The remote rejected the request in a way no retry can fix
    #[error("request rejected: {0}")]
    Rejected(CallError),

    /// Every attempt in the budget failed
    #[error("request failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: CallError },

    /// A 401 could not be cured because the token refresh failed
    #[error("could not refresh access token: {0}")]
    Refresh(String),

    /// A page advertised a continuation the exhauster cannot follow
    #[error("unsupported pagination cursor: {0}")]
    UnsupportedCursor(String),
}

impl ApiError {
    /// Classification of the underlying remote failure, if there was one.
    pub fn classification(&self) -> Option<&ErrorClassification> {
        match self {
            ApiError::Rejected(e) | ApiError::Exhausted { last: e, .. } => Some(&e.classification),
            ApiError::Refresh(_) | ApiError::UnsupportedCursor(_) => None,
        }
    }

    /// Whether the remote reported the resource as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self.classification(), Some(ErrorClassification::NotFound))
    }
}
