//! Authorization URL construction for the interactive login
//!
//! The `state` parameter is an opaque random value the callback must echo
//! back; it ties an inbound callback to the login that is actually pending.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use url::Url;

use crate::error::{Error, Result};
use crate::settings::OAuthSettings;

/// Generate a random `state` value (32 bytes, URL-safe base64, no padding).
pub fn generate_state() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Join scopes into the space-separated form the `scope` parameter expects.
pub fn build_scopes(scopes: &[String]) -> String {
    scopes
        .iter()
        .flat_map(|s| s.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Build the full authorization URL.
///
/// The `scope` parameter is omitted when no scopes are required.
pub fn build_authorization_url(
    settings: &OAuthSettings,
    client_id: &str,
    state: &str,
) -> Result<String> {
    let mut params = vec![
        ("client_id", client_id.to_string()),
        ("response_type", "code".to_string()),
        ("redirect_uri", settings.redirect_uri.clone()),
        ("state", state.to_string()),
    ];
    let scopes = build_scopes(&settings.required_scopes);
    if !scopes.is_empty() {
        params.push(("scope", scopes));
    }

    let url = Url::parse_with_params(&settings.authorize_endpoint, &params)
        .map_err(|e| Error::AuthorizationUrl(format!("{}: {e}", settings.authorize_endpoint)))?;
    Ok(url.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(scopes: &[&str]) -> OAuthSettings {
        OAuthSettings {
            authorize_endpoint: "https://accounts.example.com/authorize".into(),
            token_endpoint: "https://accounts.example.com/api/token".into(),
            redirect_uri: "http://127.0.0.1:8080/callback".into(),
            required_scopes: scopes.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn state_is_url_safe_and_unique() {
        let a = generate_state();
        let b = generate_state();
        // 32 bytes -> 43 base64url chars without padding
        assert_eq!(a.len(), 43);
        assert!(
            a.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
            "state must be URL-safe: {a}"
        );
        assert_ne!(a, b);
    }

    #[test]
    fn scopes_are_space_joined() {
        let scopes = vec![
            "user-read-private".to_string(),
            " ".to_string(),
            "playlist-modify-private".to_string(),
        ];
        assert_eq!(build_scopes(&scopes), "user-read-private playlist-modify-private");
        assert_eq!(build_scopes(&[]), "");
    }

    #[test]
    fn multi_scope_entries_are_split_and_collapsed() {
        let scopes = vec![" user-read-private  playlist-read ".to_string(), "".to_string()];
        assert_eq!(build_scopes(&scopes), "user-read-private playlist-read");
    }

    #[test]
    fn url_contains_required_params() {
        let url = build_authorization_url(
            &settings(&["user-read-private", "user-follow-read"]),
            "client-123",
            "state-xyz",
        )
        .unwrap();
        let parsed = Url::parse(&url).unwrap();
        let pairs: std::collections::HashMap<_, _> = parsed.query_pairs().into_owned().collect();

        assert!(url.starts_with("https://accounts.example.com/authorize?"));
        assert_eq!(pairs["client_id"], "client-123");
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["redirect_uri"], "http://127.0.0.1:8080/callback");
        assert_eq!(pairs["state"], "state-xyz");
        assert_eq!(pairs["scope"], "user-read-private user-follow-read");
    }

    #[test]
    fn url_omits_scope_when_none_required() {
        let url = build_authorization_url(&settings(&[]), "client-123", "s").unwrap();
        assert!(!url.contains("scope="), "got: {url}");
    }

    #[test]
    fn invalid_endpoint_is_rejected() {
        let mut bad = settings(&[]);
        bad.authorize_endpoint = "not a url".into();
        assert!(build_authorization_url(&bad, "client-123", "s").is_err());
    }
}
