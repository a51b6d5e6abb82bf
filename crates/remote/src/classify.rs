//! HTTP status classification for remote API responses
//!
//! Maps an upstream status code (and the `Retry-After` header for 429s) onto
//! the `ErrorClassification` the executor retries on.

use crate::ErrorClassification;

/// Wait assumed when a 429 carries no usable `Retry-After` header.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 1;

/// Classify a non-success status code.
///
/// 429 is RateLimited, 401/403/404/400 map to their own variants, and
/// everything else (408, 5xx, unrecognised codes) is Transient.
pub fn classify_status(status: u16, retry_after_secs: Option<u64>) -> ErrorClassification {
    match status {
        429 => ErrorClassification::RateLimited {
            retry_after_secs: retry_after_secs.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        },
        401 => ErrorClassification::Unauthorized,
        403 => ErrorClassification::Forbidden,
        404 => ErrorClassification::NotFound,
        400 => ErrorClassification::BadRequest,
        _ => ErrorClassification::Transient,
    }
}

/// Parse a `Retry-After` header given in delta-seconds.
///
/// The HTTP-date form is not used by rate-limited APIs in practice and yields
/// `None`, which falls back to `DEFAULT_RETRY_AFTER_SECS`.
pub fn parse_retry_after(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}
