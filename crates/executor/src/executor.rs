//! Bounded retry loop around a single remote call
//!
//! Each attempt goes through the `Transport`; failures are handled by their
//! classification:
//! - RateLimited: wait `retry_after × attempt + margin`, retry unchanged
//! - Unauthorized: refresh the token, rewrite the bearer header, retry
//! - NotFound, BadRequest, Forbidden, Fatal: stop, surface `Rejected`
//! - Transient: wait the fixed delay, retry
//!
//! No wait is taken after the final attempt. Delivery is at-least-once: a
//! retried write may have been applied by an attempt whose response was lost.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use remote::{CallError, ErrorClassification, RequestDescriptor, TokenSource, Transport};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

use crate::error::ApiError;
use crate::policy::RetryPolicy;

pub struct Executor {
    transport: Arc<dyn Transport>,
    tokens: Arc<dyn TokenSource>,
    policy: RetryPolicy,
}

impl Executor {
    pub fn new(transport: Arc<dyn Transport>, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            transport,
            tokens,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `request` to completion and deserialize the payload into `T`.
    pub async fn execute<T: DeserializeOwned>(&self, request: RequestDescriptor) -> Result<T, ApiError> {
        let call_id = uuid::Uuid::new_v4().to_string();
        let start = Instant::now();
        let result = self.run(&call_id, request).await;
        histogram!("api_call_duration_seconds").record(start.elapsed().as_secs_f64());
        result
    }

    #[instrument(skip_all, fields(call_id = %call_id, method = %request.method(), path = %request.path()))]
    async fn run<T: DeserializeOwned>(
        &self,
        call_id: &str,
        mut request: RequestDescriptor,
    ) -> Result<T, ApiError> {
        if request.authorization().is_none()
            && let Some(token) = self.tokens.access_token().await
        {
            request.set_bearer(&token);
        }

        let max_attempts = self.policy.max_attempts;
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            let failure = match self.transport.send(&request).await {
                Ok(payload) => match serde_json::from_value::<T>(payload) {
                    Ok(value) => {
                        counter!("api_call_attempts_total", "outcome" => "success").increment(1);
                        debug!(attempt, "call succeeded");
                        return Ok(value);
                    }
                    Err(e) => CallError::transient(format!("unexpected payload: {e}")),
                },
                Err(e) => e,
            };
            counter!("api_call_attempts_total", "outcome" => failure.classification.label())
                .increment(1);
            let retries_left = attempt < max_attempts;

            match failure.classification {
                ErrorClassification::RateLimited { retry_after_secs } => {
                    let delay = self.policy.rate_limit_delay(retry_after_secs, attempt);
                    warn!(
                        attempt,
                        retry_after_secs,
                        delay_ms = delay.as_millis() as u64,
                        "rate limited"
                    );
                    if retries_left {
                        counter!("api_call_retries_total", "reason" => "rate_limited").increment(1);
                        tokio::time::sleep(delay).await;
                    }
                }
                ErrorClassification::Unauthorized => {
                    warn!(attempt, "access token rejected, refreshing");
                    // The refresh runs even on the last attempt so the next call starts current
                    if retries_left {
                        counter!("api_call_retries_total", "reason" => "unauthorized").increment(1);
                    }
                    let token = self
                        .tokens
                        .refresh()
                        .await
                        .map_err(|e| ApiError::Refresh(e.to_string()))?;
                    request.set_bearer(&token);
                }
                ErrorClassification::NotFound
                | ErrorClassification::BadRequest
                | ErrorClassification::Forbidden
                | ErrorClassification::Fatal => {
                    debug!(attempt, error = %failure, "call rejected");
                    return Err(ApiError::Rejected(failure));
                }
                ErrorClassification::Transient => {
                    warn!(attempt, error = %failure, "call failed");
                    if retries_left {
                        counter!("api_call_retries_total", "reason" => "transient").increment(1);
                        tokio::time::sleep(self.policy.transient_delay).await;
                    }
                }
            }
            last_error = Some(failure);
        }

        let last =
            last_error.unwrap_or_else(|| CallError::fatal("retry policy allows no attempts"));
        warn!(attempts = max_attempts, error = %last, "call failed after all attempts");
        Err(ApiError::Exhausted {
            attempts: max_attempts,
            last,
        })
    }
}
