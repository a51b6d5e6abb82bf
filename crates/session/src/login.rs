//! Rendezvous between a blocked `authenticate()` and the login callback
//!
//! Opening a login yields two halves. The `LoginSession` stays with the
//! caller, which waits on it with a deadline. The `PendingLogin` is parked
//! where the callback handler can find it; releasing it consumes it, so the
//! permit can be handed over at most once.

use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;

/// How a wait on the login permit ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    /// The callback released the permit
    Completed,
    /// The deadline elapsed first
    TimedOut,
    /// The pending half was dropped without being released
    Abandoned,
}

/// Caller side of an interactive login.
#[derive(Debug)]
pub struct LoginSession {
    authorization_url: String,
    deadline: Instant,
    permit: oneshot::Receiver<()>,
}

/// Callback side of an interactive login.
#[derive(Debug)]
pub struct PendingLogin {
    state: String,
    permit: oneshot::Sender<()>,
}

impl LoginSession {
    /// Open a login whose permit must arrive within `timeout`.
    pub fn open(
        state: String,
        authorization_url: String,
        timeout: Duration,
    ) -> (LoginSession, PendingLogin) {
        let (tx, rx) = oneshot::channel();
        (
            LoginSession {
                authorization_url,
                deadline: Instant::now() + timeout,
                permit: rx,
            },
            PendingLogin { state, permit: tx },
        )
    }

    pub fn authorization_url(&self) -> &str {
        &self.authorization_url
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Block until the permit is released or the deadline passes.
    pub async fn wait(self) -> LoginOutcome {
        match tokio::time::timeout_at(self.deadline, self.permit).await {
            Ok(Ok(())) => LoginOutcome::Completed,
            Ok(Err(_)) => LoginOutcome::Abandoned,
            Err(_) => LoginOutcome::TimedOut,
        }
    }
}

impl PendingLogin {
    /// The `state` value the callback must echo back.
    pub fn state(&self) -> &str {
        &self.state
    }

    /// Hand the permit to the waiting caller.
    ///
    /// Returns false if the caller stopped waiting (deadline passed).
    pub fn release(self) -> bool {
        self.permit.send(()).is_ok()
    }
}
