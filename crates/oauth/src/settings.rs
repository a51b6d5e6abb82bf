//! Registered OAuth client settings
//!
//! The redirect URI must match the one registered with the authorization
//! server byte for byte, so it is resolved once at startup and reused for
//! both the authorization URL and the code exchange.

use std::collections::BTreeSet;

use crate::error::{Error, Result};

/// Path the inbound callback handler is mounted on.
pub const DEFAULT_CALLBACK_PATH: &str = "/callback";

/// Authorization server endpoints, redirect URI, and the scopes every
/// credential must carry.
#[derive(Debug, Clone)]
pub struct OAuthSettings {
    pub authorize_endpoint: String,
    pub token_endpoint: String,
    pub redirect_uri: String,
    pub required_scopes: Vec<String>,
}

impl OAuthSettings {
    /// Required scopes as individual names, matching what `build_scopes`
    /// puts on the wire.
    pub fn required_scope_set(&self) -> BTreeSet<String> {
        self.required_scopes
            .iter()
            .flat_map(|s| s.split_whitespace())
            .map(String::from)
            .collect()
    }
}

/// Resolve the redirect URI registered with the authorization server.
///
/// An explicit override (the `REDIRECT_URI` environment variable) wins but
/// must end with the callback path, otherwise the callback would never reach
/// the handler. Without an override, the loopback listener address is used.
pub fn resolve_redirect_uri(
    override_uri: Option<&str>,
    port: u16,
    callback_path: &str,
) -> Result<String> {
    match override_uri {
        Some(uri) => {
            if !uri.starts_with("http://") && !uri.starts_with("https://") {
                return Err(Error::InvalidRedirectUri(format!(
                    "{uri} must start with http:// or https://"
                )));
            }
            if !uri.ends_with(callback_path) {
                return Err(Error::InvalidRedirectUri(format!(
                    "{uri} must end with {callback_path}"
                )));
            }
            Ok(uri.to_string())
        }
        None => Ok(format!("http://127.0.0.1:{port}{callback_path}")),
    }
}
