//! Fakes shared by the service's router tests

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use oauth::{ClientEnv, CredentialStore, OAuthSettings, TokenEndpoint, TokenGrant};
use session::{AuthManager, BrowserLauncher, LoginTimeoutPolicy};

pub(crate) const SCOPED_FILE: &str = r#"
access_token = "at_old"
refresh_token = "rt_old"
scope = "a b"
"#;

/// Token endpoint that plays back scripted exchange results and accepts
/// every refresh with "at_refreshed".
#[derive(Default)]
pub(crate) struct FakeEndpoint {
    exchange_results: Mutex<VecDeque<oauth::Result<TokenGrant>>>,
}

impl FakeEndpoint {
    pub(crate) fn push_exchange(&self, result: oauth::Result<TokenGrant>) {
        self.exchange_results.lock().unwrap().push_back(result);
    }
}

impl TokenEndpoint for FakeEndpoint {
    fn exchange_code<'a>(
        &'a self,
        _code: &'a str,
    ) -> oauth::BoxFuture<'a, oauth::Result<TokenGrant>> {
        Box::pin(async move {
            self.exchange_results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(grant("at_login", Some("rt_login"), Some("a b"))))
        })
    }

    fn refresh<'a>(
        &'a self,
        _refresh_token: &'a str,
    ) -> oauth::BoxFuture<'a, oauth::Result<TokenGrant>> {
        Box::pin(async move { Ok(grant("at_refreshed", None, None)) })
    }
}

/// Records the authorization URLs instead of opening them.
#[derive(Default)]
pub(crate) struct RecordingBrowser {
    urls: Mutex<Vec<String>>,
}

impl RecordingBrowser {
    pub(crate) fn last_state(&self) -> Option<String> {
        let urls = self.urls.lock().unwrap();
        let url = urls.last()?;
        url.split(['?', '&'])
            .find_map(|pair| pair.strip_prefix("state="))
            .map(String::from)
    }
}

impl BrowserLauncher for RecordingBrowser {
    fn open(&self, url: &str) -> Result<(), String> {
        self.urls.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

pub(crate) fn grant(access: &str, refresh: Option<&str>, scope: Option<&str>) -> TokenGrant {
    TokenGrant {
        access_token: Some(access.into()),
        refresh_token: refresh.map(String::from),
        scope: scope.map(String::from),
        expires_in: Some(3600),
    }
}

/// Build an auth manager over a credential file in `dir`.
pub(crate) async fn test_auth(
    dir: &tempfile::TempDir,
    contents: Option<&str>,
    endpoint: Arc<FakeEndpoint>,
    browser: Arc<RecordingBrowser>,
) -> Arc<AuthManager> {
    let path = dir.path().join("credentials.toml");
    if let Some(contents) = contents {
        tokio::fs::write(&path, contents).await.unwrap();
    }
    let env = ClientEnv {
        client_id: Some("client-1".into()),
        client_secret: Some("secret-1".into()),
    };
    let store = Arc::new(CredentialStore::load_with_env(path, env).await.unwrap());
    let settings = OAuthSettings {
        authorize_endpoint: "https://auth.example.com/authorize".into(),
        token_endpoint: "https://auth.example.com/api/token".into(),
        redirect_uri: "http://127.0.0.1:8080/callback".into(),
        required_scopes: vec!["a".into(), "b".into()],
    };
    Arc::new(
        AuthManager::new(store, endpoint, browser, settings)
            .with_timeout_policy(LoginTimeoutPolicy::ReturnError),
    )
}

/// Wait until a login has been opened and return its state value.
pub(crate) async fn login_state(browser: &RecordingBrowser) -> String {
    for _ in 0..1000 {
        if let Some(state) = browser.last_state() {
            return state;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("interactive login was never started");
}
