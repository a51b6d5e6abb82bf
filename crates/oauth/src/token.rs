//! OAuth token exchange and refresh
//!
//! Handles the two token endpoint interactions:
//! 1. Authorization code exchange (completing the interactive login)
//! 2. Token refresh (renewing an expired access token)
//!
//! Both POST a form body to the token endpoint with different grant types,
//! authenticating the client with HTTP Basic auth. Authorization servers may
//! omit `refresh_token` or `scope` from a refresh response, so every field of
//! [`TokenGrant`] is optional and the credential store falls back to the
//! previous values.

use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;

use common::Secret;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Response from the token endpoint for both exchange and refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct TokenGrant {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Space-separated granted scopes
    #[serde(default)]
    pub scope: Option<String>,
    /// Seconds until the access token expires (informational only)
    #[serde(default)]
    pub expires_in: Option<u64>,
}

impl TokenGrant {
    /// Granted scopes, or `None` if the server omitted the field.
    pub fn scopes(&self) -> Option<BTreeSet<String>> {
        self.scope.as_deref().map(parse_scopes)
    }
}

/// Split a space-separated scope string into a set.
pub fn parse_scopes(scope: &str) -> BTreeSet<String> {
    scope.split_whitespace().map(str::to_string).collect()
}

/// Boxed future returned by the dyn-compatible `TokenEndpoint`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The authorization server's token endpoint.
///
/// Dyn-compatible so the auth manager can hold an `Arc<dyn TokenEndpoint>`
/// and tests can substitute a scripted endpoint.
pub trait TokenEndpoint: Send + Sync {
    /// Exchange an authorization code from the login callback for tokens.
    fn exchange_code<'a>(&'a self, code: &'a str) -> BoxFuture<'a, Result<TokenGrant>>;

    /// Obtain a new access token from a refresh token.
    fn refresh<'a>(&'a self, refresh_token: &'a str) -> BoxFuture<'a, Result<TokenGrant>>;
}

/// Token endpoint backed by a real authorization server.
pub struct HttpTokenEndpoint {
    client: reqwest::Client,
    token_endpoint: String,
    redirect_uri: String,
    client_id: String,
    client_secret: Secret<String>,
}

impl HttpTokenEndpoint {
    pub fn new(
        client: reqwest::Client,
        token_endpoint: impl Into<String>,
        redirect_uri: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: Secret<String>,
    ) -> Self {
        Self {
            client,
            token_endpoint: token_endpoint.into(),
            redirect_uri: redirect_uri.into(),
            client_id: client_id.into(),
            client_secret,
        }
    }

    async fn post_form(&self, form: &[(&str, &str)], operation: &str) -> Result<TokenGrant> {
        let response = self
            .client
            .post(&self.token_endpoint)
            .basic_auth(&self.client_id, Some(self.client_secret.expose()))
            .form(form)
            .send()
            .await
            .map_err(|e| Error::Http(format!("{operation} request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));

            // 400 invalid_grant / 401 means the refresh token or code is no longer usable
            if status.as_u16() == 400 || status.as_u16() == 401 {
                return Err(Error::InvalidCredentials(format!(
                    "{operation} rejected ({status}): {body}"
                )));
            }

            return Err(Error::TokenExchange(format!(
                "{operation} returned {status}: {body}"
            )));
        }

        let grant = response
            .json::<TokenGrant>()
            .await
            .map_err(|e| Error::TokenExchange(format!("invalid {operation} response: {e}")))?;
        debug!(
            operation,
            has_refresh_token = grant.refresh_token.is_some(),
            scope = grant.scope.as_deref().unwrap_or(""),
            "token endpoint responded"
        );
        Ok(grant)
    }
}

impl TokenEndpoint for HttpTokenEndpoint {
    fn exchange_code<'a>(&'a self, code: &'a str) -> BoxFuture<'a, Result<TokenGrant>> {
        Box::pin(async move {
            self.post_form(
                &[
                    ("grant_type", "authorization_code"),
                    ("code", code),
                    ("redirect_uri", self.redirect_uri.as_str()),
                ],
                "code exchange",
            )
            .await
        })
    }

    fn refresh<'a>(&'a self, refresh_token: &'a str) -> BoxFuture<'a, Result<TokenGrant>> {
        Box::pin(async move {
            self.post_form(
                &[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh_token),
                ],
                "token refresh",
            )
            .await
        })
    }
}
