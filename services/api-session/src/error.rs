//! Service-specific error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Why a login callback was refused.
///
/// Rendered as a plain-text HTTP response; the operator sees it in the
/// browser tab the authorization server redirected.
#[derive(Error, Debug)]
pub enum CallbackError {
    #[error("authorization server reported an error: {0}")]
    Denied(String),

    #[error("callback is missing the authorization code")]
    MissingCode,

    #[error(transparent)]
    Session(#[from] session::Error),
}

impl CallbackError {
    pub fn status(&self) -> StatusCode {
        match self {
            CallbackError::Denied(_) | CallbackError::MissingCode => StatusCode::BAD_REQUEST,
            CallbackError::Session(e) => match e {
                session::Error::NoPendingLogin | session::Error::StateMismatch => {
                    StatusCode::BAD_REQUEST
                }
                session::Error::ScopeInsufficient(_) => StatusCode::FORBIDDEN,
                session::Error::Exchange(_) | session::Error::Credential(_) => {
                    StatusCode::BAD_GATEWAY
                }
                session::Error::LoginTimeout { .. } | session::Error::Terminated { .. } => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
            },
        }
    }

    /// Label for the `auth_callbacks_total` metric.
    pub fn outcome(&self) -> &'static str {
        match self {
            CallbackError::Denied(_) => "denied",
            CallbackError::MissingCode => "missing_code",
            CallbackError::Session(session::Error::NoPendingLogin) => "no_pending_login",
            CallbackError::Session(session::Error::StateMismatch) => "state_mismatch",
            CallbackError::Session(session::Error::ScopeInsufficient(_)) => "scope_insufficient",
            CallbackError::Session(_) => "exchange_failed",
        }
    }
}

impl IntoResponse for CallbackError {
    fn into_response(self) -> Response {
        (self.status(), format!("Login failed: {self}")).into_response()
    }
}
