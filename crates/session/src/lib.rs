//! Credential lifecycle for a single authenticated API session
//!
//! `AuthManager` keeps one OAuth credential valid: it refreshes on demand,
//! falls back to an interactive browser login when refresh is impossible,
//! and parks the login until the callback handler hands over the code.
//! `lifecycle` holds the pure state machine that decides each step.

pub mod browser;
pub mod error;
pub mod lifecycle;
pub mod login;
pub mod manager;

pub use browser::{BrowserLauncher, NoBrowser, SystemBrowser};
pub use error::{Error, Result};
pub use lifecycle::{AuthAction, AuthEvent, AuthState, LOGIN_TIMEOUT_EXIT_CODE, handle_event};
pub use login::{LoginOutcome, LoginSession};
pub use manager::{
    AuthManager, DEFAULT_LOGIN_TIMEOUT, DEFAULT_REFRESH_TIMEOUT, LoginTimeoutPolicy,
};
