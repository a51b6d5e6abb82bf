//! OAuth2 authorization-code support for the API session
//!
//! Provides the pieces the auth lifecycle manager composes:
//! 1. `OAuthSettings` + `resolve_redirect_uri()` describe the registered client
//! 2. `authorize::build_authorization_url()` builds the interactive login URL
//! 3. `TokenEndpoint::exchange_code()` turns the callback's code into tokens
//! 4. `TokenEndpoint::refresh()` renews the access token non-interactively
//! 5. `CredentialStore::apply_grant()` merges and persists the new tokens

pub mod authorize;
pub mod credentials;
pub mod error;
pub mod settings;
pub mod token;

pub use authorize::{build_authorization_url, build_scopes, generate_state};
pub use credentials::{CLIENT_ID_ENV, CLIENT_SECRET_ENV, ClientEnv, Credential, CredentialStore};
pub use error::{Error, Result};
pub use settings::{DEFAULT_CALLBACK_PATH, OAuthSettings, resolve_redirect_uri};
pub use token::{BoxFuture, HttpTokenEndpoint, TokenEndpoint, TokenGrant, parse_scopes};
