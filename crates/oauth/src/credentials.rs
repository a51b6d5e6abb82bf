//! Credential storage for the OAuth client and its tokens
//!
//! A flat TOML file holds `client_id`, `client_secret`, `access_token`,
//! `refresh_token` and the granted `scope`. Client identity may instead come
//! from the `CLIENT_ID` / `CLIENT_SECRET` environment variables; values taken
//! from the environment are never written back to disk.
//!
//! All writes use atomic temp-file + rename to prevent corruption on crash.
//! A persistence failure is logged and the in-memory credential stays
//! authoritative, so a read-only filesystem costs a re-login after restart
//! rather than the running session.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use common::Secret;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::token::{TokenGrant, parse_scopes};

pub const CLIENT_ID_ENV: &str = "CLIENT_ID";
pub const CLIENT_SECRET_ENV: &str = "CLIENT_SECRET";

/// The client identity plus the current token pair.
#[derive(Clone)]
pub struct Credential {
    pub client_id: String,
    pub client_secret: Secret<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub granted_scopes: BTreeSet<String>,
}

impl Credential {
    pub fn has_token_pair(&self) -> bool {
        self.access_token.is_some() && self.refresh_token.is_some()
    }

    /// Required scopes the credential was not granted, in sorted order.
    pub fn missing_scopes(&self, required: &BTreeSet<String>) -> Vec<String> {
        required.difference(&self.granted_scopes).cloned().collect()
    }

    /// Merge a token grant into this credential.
    ///
    /// Fields the grant omits keep their previous values.
    pub fn merged_with(&self, grant: &TokenGrant) -> Credential {
        Credential {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            access_token: grant
                .access_token
                .clone()
                .or_else(|| self.access_token.clone()),
            refresh_token: grant
                .refresh_token
                .clone()
                .or_else(|| self.refresh_token.clone()),
            granted_scopes: grant
                .scopes()
                .unwrap_or_else(|| self.granted_scopes.clone()),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret)
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("granted_scopes", &self.granted_scopes)
            .finish()
    }
}

/// Client identity supplied through the environment.
#[derive(Debug, Clone, Default)]
pub struct ClientEnv {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl ClientEnv {
    pub fn from_env() -> Self {
        Self {
            client_id: std::env::var(CLIENT_ID_ENV).ok().filter(|v| !v.is_empty()),
            client_secret: std::env::var(CLIENT_SECRET_ENV).ok().filter(|v| !v.is_empty()),
        }
    }
}

/// On-disk layout. Every key is optional so a file holding only tokens
/// (client identity from the environment) is valid.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CredentialFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_secret: Option<Secret<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
}

/// Thread-safe credential file manager.
///
/// The RwLock write guard is held across the file write, which serializes
/// concurrent token updates and keeps the file in the same order as memory.
pub struct CredentialStore {
    path: PathBuf,
    /// Whether the client identity came from the file (and is written back)
    client_in_file: bool,
    state: RwLock<Credential>,
}

impl CredentialStore {
    /// Load credentials from `path`, falling back to `CLIENT_ID` /
    /// `CLIENT_SECRET` for the client identity.
    pub async fn load(path: PathBuf) -> Result<Self> {
        Self::load_with_env(path, ClientEnv::from_env()).await
    }

    /// Load credentials with an explicit environment fallback.
    ///
    /// A missing file is not an error as long as the environment provides
    /// the client identity; the store then starts without tokens.
    pub async fn load_with_env(path: PathBuf, env: ClientEnv) -> Result<Self> {
        let file = if tokio::fs::try_exists(&path)
            .await
            .map_err(|e| Error::Io(format!("checking credential file: {e}")))?
        {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading credential file: {e}")))?;
            toml::from_str::<CredentialFile>(&contents)
                .map_err(|e| Error::CredentialParse(format!("parsing credential file: {e}")))?
        } else {
            info!(path = %path.display(), "credential file not found, using environment");
            CredentialFile::default()
        };

        let client_in_file = file.client_id.is_some() && file.client_secret.is_some();
        let client_id = file
            .client_id
            .or(env.client_id)
            .ok_or_else(|| Error::MissingCredentials(format!("{CLIENT_ID_ENV} is not set")))?;
        let client_secret = file
            .client_secret
            .or_else(|| env.client_secret.map(Secret::new))
            .ok_or_else(|| Error::MissingCredentials(format!("{CLIENT_SECRET_ENV} is not set")))?;

        let credential = Credential {
            client_id,
            client_secret,
            access_token: file.access_token,
            refresh_token: file.refresh_token,
            granted_scopes: file.scope.as_deref().map(parse_scopes).unwrap_or_default(),
        };
        info!(
            path = %path.display(),
            has_tokens = credential.has_token_pair(),
            scopes = credential.granted_scopes.len(),
            "loaded credentials"
        );

        Ok(Self {
            path,
            client_in_file,
            state: RwLock::new(credential),
        })
    }

    /// Clone of the current credential.
    pub async fn snapshot(&self) -> Credential {
        self.state.read().await.clone()
    }

    pub async fn access_token(&self) -> Option<String> {
        self.state.read().await.access_token.clone()
    }

    /// Merge a token grant, persist it, and return the updated credential.
    ///
    /// Rejected without touching the stored state when the merged result
    /// would not hold both an access and a refresh token.
    pub async fn apply_grant(&self, grant: &TokenGrant) -> Result<Credential> {
        let mut state = self.state.write().await;
        let merged = state.merged_with(grant);
        if !merged.has_token_pair() {
            return Err(Error::TokenExchange(
                "grant left the credential without an access and refresh token".into(),
            ));
        }
        *state = merged.clone();

        if let Err(e) = write_atomic(&self.path, &self.to_file(&merged)).await {
            warn!(
                path = %self.path.display(),
                error = %e,
                "failed to persist credentials, tokens will be lost on restart"
            );
        }
        debug!("updated tokens");
        Ok(merged)
    }

    fn to_file(&self, credential: &Credential) -> CredentialFile {
        let (client_id, client_secret) = if self.client_in_file {
            (
                Some(credential.client_id.clone()),
                Some(credential.client_secret.clone()),
            )
        } else {
            (None, None)
        };
        let scope = (!credential.granted_scopes.is_empty()).then(|| {
            credential
                .granted_scopes
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(" ")
        });

        CredentialFile {
            client_id,
            client_secret,
            access_token: credential.access_token.clone(),
            refresh_token: credential.refresh_token.clone(),
            scope,
        }
    }
}

/// Write the credential file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. Sets file permissions to 0600 (owner read/write only) since
/// the file contains tokens and possibly the client secret.
async fn write_atomic(path: &Path, data: &CredentialFile) -> Result<()> {
    let contents = toml::to_string(data)
        .map_err(|e| Error::CredentialParse(format!("serializing credentials: {e}")))?;

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let tmp_path = dir.join(format!(".credentials.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, contents.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp credential file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting credential file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp credential file: {e}")))?;

    debug!(path = %path.display(), "persisted credentials");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    const FULL_FILE: &str = r#"
client_id = "client-1"
client_secret = "secret-1"
access_token = "at_1"
refresh_token = "rt_1"
scope = "user-read-private playlist-modify-private"
"#;

    fn grant(access: Option<&str>, refresh: Option<&str>, scope: Option<&str>) -> TokenGrant {
        TokenGrant {
            access_token: access.map(String::from),
            refresh_token: refresh.map(String::from),
            scope: scope.map(String::from),
            expires_in: Some(3600),
        }
    }

    async fn store_from(contents: &str) -> (tempfile::TempDir, PathBuf, CredentialStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.toml");
        tokio::fs::write(&path, contents).await.unwrap();
        let store = CredentialStore::load_with_env(path.clone(), ClientEnv::default())
            .await
            .unwrap();
        (dir, path, store)
    }

    #[tokio::test]
    async fn loads_full_file() {
        let (_dir, _path, store) = store_from(FULL_FILE).await;
        let cred = store.snapshot().await;
        assert_eq!(cred.client_id, "client-1");
        assert_eq!(cred.client_secret.expose(), "secret-1");
        assert_eq!(cred.access_token.as_deref(), Some("at_1"));
        assert!(cred.has_token_pair());
        assert!(cred.granted_scopes.contains("playlist-modify-private"));
    }

    #[tokio::test]
    async fn env_supplies_missing_client_identity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.toml");
        let env = ClientEnv {
            client_id: Some("env-client".into()),
            client_secret: Some("env-secret".into()),
        };

        let store = CredentialStore::load_with_env(path.clone(), env).await.unwrap();
        let cred = store.snapshot().await;
        assert_eq!(cred.client_id, "env-client");
        assert!(!cred.has_token_pair());
        assert!(store.access_token().await.is_none());
        // Nothing is written until tokens arrive
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn file_wins_over_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.toml");
        tokio::fs::write(&path, FULL_FILE).await.unwrap();
        let env = ClientEnv {
            client_id: Some("env-client".into()),
            client_secret: Some("env-secret".into()),
        };

        let store = CredentialStore::load_with_env(path, env).await.unwrap();
        assert_eq!(store.snapshot().await.client_id, "client-1");
    }

    #[tokio::test]
    async fn missing_client_identity_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.toml");
        let env = ClientEnv {
            client_id: Some("env-client".into()),
            client_secret: None,
        };

        let err = CredentialStore::load_with_env(path, env).await.err().unwrap();
        assert!(matches!(err, Error::MissingCredentials(_)), "got: {err:?}");
        assert!(err.to_string().contains(CLIENT_SECRET_ENV));
    }

    #[tokio::test]
    async fn malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.toml");
        tokio::fs::write(&path, "client_id = [").await.unwrap();

        let err = CredentialStore::load_with_env(path, ClientEnv::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::CredentialParse(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn grant_falls_back_to_previous_values() {
        let (_dir, _path, store) = store_from(FULL_FILE).await;

        let updated = store
            .apply_grant(&grant(Some("at_2"), None, None))
            .await
            .unwrap();
        assert_eq!(updated.access_token.as_deref(), Some("at_2"));
        assert_eq!(updated.refresh_token.as_deref(), Some("rt_1"));
        assert_eq!(updated.granted_scopes.len(), 2);
    }

    #[tokio::test]
    async fn grant_replaces_scopes_when_present() {
        let (_dir, _path, store) = store_from(FULL_FILE).await;

        let updated = store
            .apply_grant(&grant(Some("at_2"), Some("rt_2"), Some("user-read-private")))
            .await
            .unwrap();
        assert_eq!(updated.refresh_token.as_deref(), Some("rt_2"));
        assert_eq!(
            updated.missing_scopes(&["playlist-modify-private".to_string()].into()),
            vec!["playlist-modify-private".to_string()]
        );
    }

    #[tokio::test]
    async fn grant_without_token_pair_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.toml");
        let env = ClientEnv {
            client_id: Some("env-client".into()),
            client_secret: Some("env-secret".into()),
        };
        let store = CredentialStore::load_with_env(path, env).await.unwrap();

        // No previous refresh token to fall back to
        let err = store
            .apply_grant(&grant(Some("at_x"), None, None))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TokenExchange(_)), "got: {err:?}");
        assert!(store.access_token().await.is_none(), "state must be untouched");
    }

    #[tokio::test]
    async fn grant_is_persisted_and_reloads() {
        let (_dir, path, store) = store_from(FULL_FILE).await;
        store
            .apply_grant(&grant(Some("at_2"), Some("rt_2"), None))
            .await
            .unwrap();

        let reloaded = CredentialStore::load_with_env(path, ClientEnv::default())
            .await
            .unwrap();
        let cred = reloaded.snapshot().await;
        assert_eq!(cred.client_id, "client-1");
        assert_eq!(cred.access_token.as_deref(), Some("at_2"));
        assert_eq!(cred.refresh_token.as_deref(), Some("rt_2"));
        assert_eq!(cred.granted_scopes.len(), 2);
    }

    #[tokio::test]
    async fn env_client_identity_is_not_written_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.toml");
        let env = ClientEnv {
            client_id: Some("env-client".into()),
            client_secret: Some("env-secret".into()),
        };
        let store = CredentialStore::load_with_env(path.clone(), env).await.unwrap();
        store
            .apply_grant(&grant(Some("at_1"), Some("rt_1"), Some("a b")))
            .await
            .unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(contents.contains("at_1"));
        assert!(contents.contains("scope = \"a b\""));
        assert!(!contents.contains("env-secret"), "got: {contents}");
        assert!(!contents.contains("client_id"), "got: {contents}");
    }

    #[tokio::test]
    async fn persistence_failure_keeps_memory_state() {
        let dir = tempfile::tempdir().unwrap();
        // Parent directory does not exist, so the temp-file write fails
        let path = dir.path().join("missing").join("credentials.toml");
        let env = ClientEnv {
            client_id: Some("env-client".into()),
            client_secret: Some("env-secret".into()),
        };
        let store = CredentialStore::load_with_env(path, env).await.unwrap();

        let updated = store
            .apply_grant(&grant(Some("at_1"), Some("rt_1"), None))
            .await
            .unwrap();
        assert_eq!(updated.access_token.as_deref(), Some("at_1"));
        assert_eq!(store.access_token().await.as_deref(), Some("at_1"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_permissions_are_0600() {
        use std::os::unix::fs::PermissionsExt;

        let (_dir, path, store) = store_from(FULL_FILE).await;
        store
            .apply_grant(&grant(Some("at_2"), None, None))
            .await
            .unwrap();

        let metadata = tokio::fs::metadata(&path).await.unwrap();
        let mode = metadata.permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "credential file must be 0600, got {mode:o}");
    }

    #[test]
    fn debug_redacts_tokens_and_secret() {
        let cred = Credential {
            client_id: "client-1".into(),
            client_secret: Secret::new("secret-1".into()),
            access_token: Some("at_sensitive".into()),
            refresh_token: Some("rt_sensitive".into()),
            granted_scopes: BTreeSet::new(),
        };
        let debug = format!("{cred:?}");
        assert!(debug.contains("client-1"));
        assert!(!debug.contains("secret-1"));
        assert!(!debug.contains("at_sensitive"));
        assert!(!debug.contains("rt_sensitive"));
    }

    #[tokio::test]
    async fn concurrent_grants_leave_a_valid_file() {
        let (_dir, path, store) = store_from(FULL_FILE).await;
        let store = Arc::new(store);

        let mut handles = vec![];
        for i in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .apply_grant(&grant(Some(&format!("at_{i}")), None, None))
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: CredentialFile = toml::from_str(&contents).unwrap();
        assert_eq!(parsed.access_token, store.access_token().await);
        assert_eq!(parsed.refresh_token.as_deref(), Some("rt_1"));
    }
}
