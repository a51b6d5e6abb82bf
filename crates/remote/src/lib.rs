//! Remote API abstraction for the resilient call executor
//!
//! Defines the seams the executor is written against:
//! - `Transport` issues one request carrying a bearer header and returns the
//!   JSON payload or a classified `CallError`
//! - `TokenSource` supplies the current access token and refreshes it on demand
//!
//! `HttpTransport` is the reqwest-backed transport used in production; tests
//! substitute scripted fakes.

pub mod classify;
pub mod http;
pub mod request;

pub use classify::{DEFAULT_RETRY_AFTER_SECS, classify_status, parse_retry_after};
pub use http::HttpTransport;
pub use request::RequestDescriptor;

use std::future::Future;
use std::pin::Pin;

/// Boxed future used by the dyn-compatible seams (`Arc<dyn Transport>`).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Classification of a failed remote call, driving the executor's retry strategy.
///
/// - RateLimited waits `retry_after_secs × attempt + 1s` and retries
/// - Unauthorized refreshes the token and retries
/// - NotFound, BadRequest, Forbidden and Fatal stop immediately
/// - Transient waits a fixed delay and retries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorClassification {
    /// 429 with the server-reported wait in seconds
    RateLimited { retry_after_secs: u64 },
    /// 401, the bearer token is expired or revoked
    Unauthorized,
    NotFound,
    BadRequest,
    Forbidden,
    /// Network failure, unparseable payload, 5xx and anything unrecognised
    Transient,
    /// Client-side failure that no retry can fix (e.g. unbuildable request)
    Fatal,
}

impl ErrorClassification {
    /// Label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorClassification::RateLimited { .. } => "rate_limited",
            ErrorClassification::Unauthorized => "unauthorized",
            ErrorClassification::NotFound => "not_found",
            ErrorClassification::BadRequest => "bad_request",
            ErrorClassification::Forbidden => "forbidden",
            ErrorClassification::Transient => "transient",
            ErrorClassification::Fatal => "fatal",
        }
    }

    /// Whether the executor may issue another attempt after this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorClassification::RateLimited { .. }
                | ErrorClassification::Unauthorized
                | ErrorClassification::Transient
        )
    }
}

/// A single failed attempt, as reported by a `Transport`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{} ({message})", classification.label())]
pub struct CallError {
    pub classification: ErrorClassification,
    pub message: String,
}

impl CallError {
    pub fn new(classification: ErrorClassification, message: impl Into<String>) -> Self {
        Self {
            classification,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorClassification::Transient, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ErrorClassification::Fatal, message)
    }
}

/// Failure to obtain a fresh access token.
#[derive(Debug, Clone, thiserror::Error)]
#[error("token refresh failed: {0}")]
pub struct RefreshError(pub String);

/// "Issue request with bearer header."
///
/// Implementations dispatch exactly one attempt; retries belong to the executor.
pub trait Transport: Send + Sync {
    fn send<'a>(
        &'a self,
        request: &'a RequestDescriptor,
    ) -> BoxFuture<'a, Result<serde_json::Value, CallError>>;
}

/// Source of bearer tokens for the executor.
///
/// `refresh` may be invoked concurrently by several in-flight calls that all
/// observed a 401; implementations must tolerate redundant refreshes.
pub trait TokenSource: Send + Sync {
    /// Current access token, if one has been obtained.
    fn access_token(&self) -> BoxFuture<'_, Option<String>>;

    /// Obtain a new access token, falling back to interactive login if needed.
    fn refresh(&self) -> BoxFuture<'_, Result<String, RefreshError>>;
}
