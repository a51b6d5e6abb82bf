//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The client identity and tokens live in the credential file (or the
//! CLIENT_ID / CLIENT_SECRET env vars), never in this TOML. REDIRECT_URI
//! overrides the redirect URI derived from the listen address.

use oauth::{DEFAULT_CALLBACK_PATH, OAuthSettings};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

pub const REDIRECT_URI_ENV: &str = "REDIRECT_URI";

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub api: ApiConfig,
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    /// Resolved at load time from REDIRECT_URI or the listen address
    #[serde(skip)]
    pub redirect_uri: String,
}

/// Callback / health listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_callback_path")]
    pub callback_path: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Remote API settings
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// GET this path once after login to verify the session end to end
    #[serde(default)]
    pub check_path: Option<String>,
}

/// Authorization server settings
#[derive(Debug, Deserialize)]
pub struct OAuthConfig {
    pub authorize_endpoint: String,
    pub token_endpoint: String,
    #[serde(default)]
    pub required_scopes: Vec<String>,
    #[serde(default = "default_credentials_file")]
    pub credentials_file: PathBuf,
    #[serde(default = "default_login_timeout")]
    pub login_timeout_secs: u64,
    #[serde(default = "default_refresh_timeout")]
    pub refresh_timeout_secs: u64,
    /// Try to open the authorization URL in a local browser
    #[serde(default = "default_open_browser")]
    pub open_browser: bool,
}

#[derive(Debug, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_callback_path() -> String {
    DEFAULT_CALLBACK_PATH.to_string()
}

fn default_max_connections() -> usize {
    64
}

fn default_timeout() -> u64 {
    30
}

fn default_credentials_file() -> PathBuf {
    PathBuf::from("credentials.toml")
}

fn default_login_timeout() -> u64 {
    600
}

fn default_refresh_timeout() -> u64 {
    10
}

fn default_open_browser() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    10
}

fn require_http(field: &str, value: &str) -> common::Result<()> {
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(common::Error::Config(format!(
            "{field} must start with http:// or https://, got: {value}"
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        require_http("api.base_url", &config.api.base_url)?;
        require_http("oauth.authorize_endpoint", &config.oauth.authorize_endpoint)?;
        require_http("oauth.token_endpoint", &config.oauth.token_endpoint)?;

        if !config.server.callback_path.starts_with('/') {
            return Err(common::Error::Config(format!(
                "callback_path must start with '/', got: {}",
                config.server.callback_path
            )));
        }

        if matches!(config.server.callback_path.as_str(), "/health" | "/metrics") {
            return Err(common::Error::Config(format!(
                "callback_path {} collides with a built-in endpoint",
                config.server.callback_path
            )));
        }

        if config.api.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if config.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        if config.oauth.login_timeout_secs == 0 || config.oauth.refresh_timeout_secs == 0 {
            return Err(common::Error::Config(
                "login_timeout_secs and refresh_timeout_secs must be greater than 0".into(),
            ));
        }

        if config.retry.max_attempts == 0 {
            return Err(common::Error::Config(
                "max_attempts must be greater than 0".into(),
            ));
        }

        let override_uri = std::env::var(REDIRECT_URI_ENV)
            .ok()
            .filter(|v| !v.is_empty());
        config.redirect_uri = oauth::resolve_redirect_uri(
            override_uri.as_deref(),
            config.server.listen_addr.port(),
            &config.server.callback_path,
        )
        .map_err(|e| common::Error::Config(e.to_string()))?;

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("api-session.toml")
    }

    pub fn oauth_settings(&self) -> OAuthSettings {
        OAuthSettings {
            authorize_endpoint: self.oauth.authorize_endpoint.clone(),
            token_endpoint: self.oauth.token_endpoint.clone(),
            redirect_uri: self.redirect_uri.clone(),
            required_scopes: self.oauth.required_scopes.clone(),
        }
    }
}
