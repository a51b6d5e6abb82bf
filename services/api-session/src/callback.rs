//! Login callback endpoint
//!
//! The authorization server redirects the operator's browser here with
//! `?code=...&state=...` (or `?error=...`). A valid callback completes the
//! pending interactive login and wakes the caller parked in the auth manager.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Query, State};
use axum::routing::get;
use serde::Deserialize;
use session::AuthManager;
use tracing::{info, warn};

use crate::error::CallbackError;
use crate::metrics::record_callback;

/// Shared state for the callback handler.
#[derive(Clone)]
pub struct CallbackState {
    auth: Arc<AuthManager>,
}

impl CallbackState {
    pub fn new(auth: Arc<AuthManager>) -> Self {
        Self { auth }
    }
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// Build the router serving the callback at `callback_path`.
pub fn build_callback_router(state: CallbackState, callback_path: &str) -> Router {
    Router::new()
        .route(callback_path, get(callback_handler))
        .with_state(state)
}

/// GET {callback_path}: exchange the code and release the waiting login.
async fn callback_handler(
    State(state): State<CallbackState>,
    Query(params): Query<CallbackParams>,
) -> Result<&'static str, CallbackError> {
    match complete(&state.auth, params).await {
        Ok(()) => {
            record_callback("success");
            Ok("Successfully logged in! You can close this window.")
        }
        Err(e) => {
            warn!(error = %e, "login callback rejected");
            record_callback(e.outcome());
            Err(e)
        }
    }
}

async fn complete(auth: &AuthManager, params: CallbackParams) -> Result<(), CallbackError> {
    if let Some(error) = params.error {
        return Err(CallbackError::Denied(error));
    }
    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or(CallbackError::MissingCode)?;

    auth.complete_login(&code, params.state.as_deref()).await?;
    info!("login callback completed");
    Ok(())
}
