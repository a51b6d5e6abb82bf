//! Auth lifecycle manager
//!
//! Keeps the stored credential usable. `refresh()` tries the token endpoint
//! first and falls back to `authenticate()`, which opens the authorization URL
//! and parks the caller on a single-use permit until the callback handler
//! calls `complete_login()` or the login deadline passes.
//!
//! Only one interactive login runs at a time. Callers that need a login while
//! one is already underway queue on the login guard; once the first login
//! completes they reuse its token instead of opening a second browser window.
//!
//! Refreshes are serialized the same way. A caller whose credential was
//! replaced while it queued takes the stored token instead of spending its
//! stale refresh token, which a rotating provider would reject.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use metrics::{counter, gauge};
use oauth::{
    Credential, CredentialStore, OAuthSettings, TokenEndpoint, TokenGrant, build_authorization_url,
    build_scopes, generate_state,
};
use remote::{BoxFuture, RefreshError, TokenSource};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::browser::BrowserLauncher;
use crate::error::{Error, Result};
use crate::lifecycle::{AuthAction, AuthEvent, AuthState, LOGIN_TIMEOUT_EXIT_CODE, handle_event};
use crate::login::{LoginOutcome, LoginSession, PendingLogin};

/// How long the operator has to finish the browser login.
pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(600);

/// Upper bound on a single refresh call to the token endpoint.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(10);

/// What happens when the interactive login deadline passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoginTimeoutPolicy {
    /// Terminate the process with the lifecycle's exit code
    #[default]
    Exit,
    /// Return `Error::LoginTimeout` to the caller
    ReturnError,
}

/// Where a usable token came from.
enum Refreshed {
    /// This caller's refresh call
    Fresh(String),
    /// Another caller replaced the credential first
    Superseded(String),
}

/// Why a non-interactive refresh could not produce a usable token.
enum RefreshFailure {
    Failed(String),
    ScopeInsufficient(Vec<String>),
}

pub struct AuthManager {
    store: Arc<CredentialStore>,
    endpoint: Arc<dyn TokenEndpoint>,
    browser: Arc<dyn BrowserLauncher>,
    settings: OAuthSettings,
    state: Mutex<AuthState>,
    /// Callback half of the login currently waiting for its permit
    pending: Mutex<Option<PendingLogin>>,
    /// Held for the whole interactive login
    login_guard: Mutex<()>,
    /// Held while the token endpoint is called
    refresh_guard: Mutex<()>,
    /// Bumped each time an interactive login completes
    logins_completed: AtomicU64,
    login_timeout: Duration,
    refresh_timeout: Duration,
    timeout_policy: LoginTimeoutPolicy,
}

impl AuthManager {
    pub fn new(
        store: Arc<CredentialStore>,
        endpoint: Arc<dyn TokenEndpoint>,
        browser: Arc<dyn BrowserLauncher>,
        settings: OAuthSettings,
    ) -> Self {
        Self {
            store,
            endpoint,
            browser,
            settings,
            state: Mutex::new(AuthState::Unauthenticated),
            pending: Mutex::new(None),
            login_guard: Mutex::new(()),
            refresh_guard: Mutex::new(()),
            logins_completed: AtomicU64::new(0),
            login_timeout: DEFAULT_LOGIN_TIMEOUT,
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
            timeout_policy: LoginTimeoutPolicy::default(),
        }
    }

    pub fn with_login_timeout(mut self, timeout: Duration) -> Self {
        self.login_timeout = timeout;
        self
    }

    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    pub fn with_timeout_policy(mut self, policy: LoginTimeoutPolicy) -> Self {
        self.timeout_policy = policy;
        self
    }

    pub async fn state(&self) -> AuthState {
        self.state.lock().await.clone()
    }

    pub fn credential_store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    /// Log in at startup and announce readiness.
    pub async fn initial_login(&self) -> Result<()> {
        info!("logging in");
        self.refresh().await?;
        gauge!("auth_logged_in").set(1.0);
        info!(scopes = %build_scopes(&self.settings.required_scopes), "logged in");
        Ok(())
    }

    /// Obtain a fresh access token, falling back to an interactive login.
    pub async fn refresh(&self) -> Result<String> {
        let generation = self.logins_completed.load(Ordering::SeqCst);
        let before = self.store.snapshot().await;

        match self.transition(AuthEvent::RefreshRequested).await {
            AuthAction::CallTokenEndpoint | AuthAction::None => {}
            AuthAction::StartInteractiveLogin => return self.login_after(generation).await,
            AuthAction::Terminate { exit_code } => return Err(Error::Terminated { exit_code }),
        }

        let event = match self.try_refresh(&before).await {
            Ok(refreshed) => {
                let token = match refreshed {
                    Refreshed::Fresh(token) => {
                        counter!("auth_refresh_total", "outcome" => "success").increment(1);
                        debug!("access token refreshed");
                        token
                    }
                    Refreshed::Superseded(token) => {
                        counter!("auth_refresh_total", "outcome" => "superseded").increment(1);
                        debug!("credential replaced by another caller, reusing its token");
                        token
                    }
                };
                self.transition(AuthEvent::RefreshSucceeded).await;
                return Ok(token);
            }
            Err(RefreshFailure::Failed(reason)) => {
                counter!("auth_refresh_total", "outcome" => "failure").increment(1);
                warn!(error = %reason, "token refresh failed, interactive login required");
                AuthEvent::RefreshFailed { reason }
            }
            Err(RefreshFailure::ScopeInsufficient(missing)) => {
                counter!("auth_refresh_total", "outcome" => "scope_insufficient").increment(1);
                warn!(
                    missing = %missing.join(" "),
                    "granted scopes are insufficient, interactive login required"
                );
                AuthEvent::ScopeInsufficient { missing }
            }
        };

        match self.transition(event).await {
            AuthAction::Terminate { exit_code } => Err(Error::Terminated { exit_code }),
            _ => self.login_after(generation).await,
        }
    }

    /// Run the interactive login and return the new access token.
    pub async fn authenticate(&self) -> Result<String> {
        let generation = self.logins_completed.load(Ordering::SeqCst);
        self.login_after(generation).await
    }

    /// Complete the pending login with the code delivered to the callback.
    ///
    /// The permit is released only after the code has been exchanged, the
    /// granted scopes checked, and the tokens stored. Any failure leaves the
    /// login pending so the operator can retry before the deadline.
    pub async fn complete_login(&self, code: &str, state: Option<&str>) -> Result<()> {
        let expected = self
            .pending
            .lock()
            .await
            .as_ref()
            .map(|p| p.state().to_string())
            .ok_or(Error::NoPendingLogin)?;
        if state != Some(expected.as_str()) {
            warn!("login callback state does not match the pending login");
            return Err(Error::StateMismatch);
        }

        let mut grant = self.endpoint.exchange_code(code).await.map_err(|e| {
            counter!("auth_interactive_logins_total", "outcome" => "exchange_failed").increment(1);
            Error::Exchange(e.to_string())
        })?;

        // An omitted scope means the requested scopes were granted as-is
        if grant.scope.is_none() {
            grant.scope = Some(build_scopes(&self.settings.required_scopes));
        }
        let missing = self
            .store
            .snapshot()
            .await
            .merged_with(&grant)
            .missing_scopes(&self.settings.required_scope_set());
        if !missing.is_empty() {
            warn!(missing = %missing.join(" "), "login granted insufficient scopes");
            return Err(Error::ScopeInsufficient(missing));
        }

        self.store.apply_grant(&grant).await?;

        let released = match self.pending.lock().await.take() {
            Some(pending) => pending.release(),
            None => false,
        };
        if released {
            info!("login callback accepted");
        } else {
            warn!("login callback arrived after the waiting caller gave up, tokens stored anyway");
        }
        Ok(())
    }

    async fn transition(&self, event: AuthEvent) -> AuthAction {
        let mut state = self.state.lock().await;
        let (next, action) = handle_event(state.clone(), event);
        if *state != next {
            debug!(from = state.label(), to = next.label(), "auth state transition");
        }
        match next {
            AuthState::Authenticated => gauge!("auth_logged_in").set(1.0),
            AuthState::AwaitingInteractiveLogin | AuthState::Fatal { .. } => {
                gauge!("auth_logged_in").set(0.0)
            }
            _ => {}
        }
        *state = next;
        action
    }

    async fn try_refresh(
        &self,
        before: &Credential,
    ) -> std::result::Result<Refreshed, RefreshFailure> {
        let _guard = self.refresh_guard.lock().await;
        if let Some(token) = self.superseded(before).await {
            return Ok(Refreshed::Superseded(token));
        }

        let credential = self.store.snapshot().await;
        let refresh_token = match (&credential.access_token, &credential.refresh_token) {
            (Some(_), Some(refresh_token)) => refresh_token.clone(),
            _ => return Err(RefreshFailure::Failed("no stored token pair".into())),
        };

        let failure = match tokio::time::timeout(
            self.refresh_timeout,
            self.endpoint.refresh(&refresh_token),
        )
        .await
        {
            Ok(Ok(grant)) => return self.accept_refresh(&credential, &grant).await,
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!(
                "token endpoint did not answer within {}s",
                self.refresh_timeout.as_secs()
            ),
        };

        // A login may have stored new tokens while the call was in flight
        match self.superseded(&credential).await {
            Some(token) => Ok(Refreshed::Superseded(token)),
            None => Err(RefreshFailure::Failed(failure)),
        }
    }

    async fn accept_refresh(
        &self,
        credential: &Credential,
        grant: &TokenGrant,
    ) -> std::result::Result<Refreshed, RefreshFailure> {
        let missing = credential
            .merged_with(grant)
            .missing_scopes(&self.settings.required_scope_set());
        if !missing.is_empty() {
            return Err(RefreshFailure::ScopeInsufficient(missing));
        }

        let updated = self
            .store
            .apply_grant(grant)
            .await
            .map_err(|e| RefreshFailure::Failed(e.to_string()))?;
        updated
            .access_token
            .map(Refreshed::Fresh)
            .ok_or_else(|| RefreshFailure::Failed("grant carried no access token".into()))
    }

    /// The stored access token, if the token pair changed since `seen`.
    async fn superseded(&self, seen: &Credential) -> Option<String> {
        let current = self.store.snapshot().await;
        let replaced = current.access_token != seen.access_token
            || current.refresh_token != seen.refresh_token;
        if replaced && current.has_token_pair() {
            current.access_token
        } else {
            None
        }
    }

    /// Run an interactive login unless one completed since `generation`.
    async fn login_after(&self, generation: u64) -> Result<String> {
        let _guard = self.login_guard.lock().await;

        if self.logins_completed.load(Ordering::SeqCst) != generation
            && let Some(token) = self.store.access_token().await
        {
            info!("interactive login completed by another caller, reusing its token");
            return Ok(token);
        }

        if let AuthAction::Terminate { exit_code } = self.transition(AuthEvent::LoginStarted).await
        {
            return Err(Error::Terminated { exit_code });
        }

        let client_id = self.store.snapshot().await.client_id;
        let state = generate_state();
        let url = build_authorization_url(&self.settings, &client_id, &state)?;
        let (session, pending) = LoginSession::open(state, url, self.login_timeout);
        *self.pending.lock().await = Some(pending);
        counter!("auth_interactive_logins_total", "outcome" => "started").increment(1);

        self.present(session.authorization_url());
        let outcome = session.wait().await;

        // Late callbacks must not find a stale login
        self.pending.lock().await.take();

        match outcome {
            LoginOutcome::Completed => {
                self.logins_completed.fetch_add(1, Ordering::SeqCst);
                self.transition(AuthEvent::LoginCompleted).await;
                counter!("auth_interactive_logins_total", "outcome" => "completed").increment(1);
                info!("interactive login completed");
                self.store.access_token().await.ok_or_else(|| {
                    Error::Exchange("login completed without an access token".into())
                })
            }
            LoginOutcome::TimedOut | LoginOutcome::Abandoned => {
                counter!("auth_interactive_logins_total", "outcome" => "timed_out").increment(1);
                let exit_code = match self.transition(AuthEvent::LoginTimedOut).await {
                    AuthAction::Terminate { exit_code } => exit_code,
                    _ => LOGIN_TIMEOUT_EXIT_CODE,
                };
                error!(
                    timeout_secs = self.login_timeout.as_secs(),
                    exit_code, "interactive login was not completed in time"
                );
                match self.timeout_policy {
                    LoginTimeoutPolicy::Exit => std::process::exit(exit_code),
                    LoginTimeoutPolicy::ReturnError => Err(Error::LoginTimeout { exit_code }),
                }
            }
        }
    }

    fn present(&self, url: &str) {
        info!(url, "authorization required, open the URL to log in");
        match self.browser.open(url) {
            Ok(()) => info!("opened authorization URL in browser"),
            Err(e) => {
                warn!(error = %e, "could not open a browser, open the URL manually");
                println!("Open this URL in a browser to log in:\n{url}");
            }
        }
    }
}

impl TokenSource for AuthManager {
    fn access_token(&self) -> BoxFuture<'_, Option<String>> {
        Box::pin(async move { self.store.access_token().await })
    }

    fn refresh(&self) -> BoxFuture<'_, std::result::Result<String, RefreshError>> {
        Box::pin(async move {
            AuthManager::refresh(self)
                .await
                .map_err(|e| RefreshError(e.to_string()))
        })
    }
}
