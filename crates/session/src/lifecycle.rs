//! Auth lifecycle state machine
//!
//! Pure state machine: receives events, returns (new_state, action).
//! The caller (`AuthManager`) executes the I/O implied by each action.
//!
//! ```text
//! Unauthenticated ──RefreshRequested──▶ Refreshing ──RefreshSucceeded──▶ Authenticated
//!                                         │    ▲                              │
//!                      RefreshFailed /    │    └──────RefreshRequested────────┘
//!                      ScopeInsufficient  ▼
//!                               AwaitingInteractiveLogin ──LoginCompleted──▶ Authenticated
//!                                         │
//!                                   LoginTimedOut
//!                                         ▼
//!                                  Fatal { exit_code }
//! ```
//!
//! The state is shared by every caller, while each refresh is driven by one
//! caller. A caller whose credential was replaced by someone else reports
//! `RefreshSucceeded` with the stored token; only a failure against the
//! current credential routes it to the interactive login.

/// Exit status used when the interactive login is never completed.
pub const LOGIN_TIMEOUT_EXIT_CODE: i32 = 182;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// No refresh attempted yet
    Unauthenticated,
    /// A refresh call to the token endpoint is in flight
    Refreshing,
    /// A valid credential is stored
    Authenticated,
    /// Waiting for the operator to finish the browser login
    AwaitingInteractiveLogin,
    /// The login deadline passed; the process must terminate
    Fatal { exit_code: i32 },
}

impl AuthState {
    pub fn label(&self) -> &'static str {
        match self {
            AuthState::Unauthenticated => "unauthenticated",
            AuthState::Refreshing => "refreshing",
            AuthState::Authenticated => "authenticated",
            AuthState::AwaitingInteractiveLogin => "awaiting_interactive_login",
            AuthState::Fatal { .. } => "fatal",
        }
    }
}

/// Events that drive state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// A caller needs a fresh access token
    RefreshRequested,
    /// The token endpoint returned a usable grant
    RefreshSucceeded,
    /// Refresh impossible: missing tokens, endpoint error, or timeout
    RefreshFailed { reason: String },
    /// Refresh worked but the granted scopes miss required ones
    ScopeInsufficient { missing: Vec<String> },
    /// An interactive login was opened directly
    LoginStarted,
    /// The callback delivered a valid code and tokens were stored
    LoginCompleted,
    /// The login deadline passed without a callback
    LoginTimedOut,
}

/// Actions the caller should execute after a state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthAction {
    /// Call the token endpoint with the stored refresh token
    CallTokenEndpoint,
    /// Run (or join) the interactive browser login
    StartInteractiveLogin,
    /// Terminate the process with the given status
    Terminate { exit_code: i32 },
    /// No-op
    None,
}

/// Handle a state transition. Pure function: no I/O.
pub fn handle_event(state: AuthState, event: AuthEvent) -> (AuthState, AuthAction) {
    match (state, event) {
        // --- Fatal is terminal ---
        (AuthState::Fatal { exit_code }, _) => (
            AuthState::Fatal { exit_code },
            AuthAction::Terminate { exit_code },
        ),

        // --- Timeout from anywhere ends the session ---
        (_, AuthEvent::LoginTimedOut) => (
            AuthState::Fatal {
                exit_code: LOGIN_TIMEOUT_EXIT_CODE,
            },
            AuthAction::Terminate {
                exit_code: LOGIN_TIMEOUT_EXIT_CODE,
            },
        ),

        // --- Refresh requests ---
        // A login is already underway: refreshing cannot help, join it
        (AuthState::AwaitingInteractiveLogin, AuthEvent::RefreshRequested) => (
            AuthState::AwaitingInteractiveLogin,
            AuthAction::StartInteractiveLogin,
        ),
        (_, AuthEvent::RefreshRequested) => (AuthState::Refreshing, AuthAction::CallTokenEndpoint),

        // --- Refresh results ---
        // Another caller's login is still pending; keep waiting for it
        (AuthState::AwaitingInteractiveLogin, AuthEvent::RefreshSucceeded) => {
            (AuthState::AwaitingInteractiveLogin, AuthAction::None)
        }
        (_, AuthEvent::RefreshSucceeded) => (AuthState::Authenticated, AuthAction::None),

        (_, AuthEvent::RefreshFailed { .. } | AuthEvent::ScopeInsufficient { .. }) => (
            AuthState::AwaitingInteractiveLogin,
            AuthAction::StartInteractiveLogin,
        ),

        // --- Interactive login ---
        (_, AuthEvent::LoginStarted) => (AuthState::AwaitingInteractiveLogin, AuthAction::None),
        (_, AuthEvent::LoginCompleted) => (AuthState::Authenticated, AuthAction::None),
    }
}
