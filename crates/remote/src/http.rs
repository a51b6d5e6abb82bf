//! reqwest-backed `Transport`
//!
//! Joins the descriptor path onto the configured base URL, sends one attempt
//! with the descriptor's Authorization header, and turns the response into
//! either a JSON payload or a classified `CallError`.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, RETRY_AFTER};
use tracing::debug;

use crate::classify::{classify_status, parse_retry_after};
use crate::{BoxFuture, CallError, RequestDescriptor, Transport};

pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            timeout,
        }
    }

    /// Absolute URLs (a `next` link) are only followed under `base_url`, so
    /// the bearer token is never sent to another origin.
    fn url_for(&self, request: &RequestDescriptor) -> Result<String, CallError> {
        let path = request.path();
        let base = self.base_url.trim_end_matches('/');
        if path.starts_with("http://") || path.starts_with("https://") {
            return match path.strip_prefix(base) {
                Some(rest) if rest.is_empty() || rest.starts_with(['/', '?']) => {
                    Ok(path.to_string())
                }
                _ => Err(CallError::fatal(format!(
                    "refusing to send credentials to {path}: outside {base}"
                ))),
            };
        }
        Ok(format!("{base}/{}", path.trim_start_matches('/')))
    }
}

impl Transport for HttpTransport {
    fn send<'a>(
        &'a self,
        request: &'a RequestDescriptor,
    ) -> BoxFuture<'a, Result<serde_json::Value, CallError>> {
        Box::pin(async move {
            let url = self.url_for(request)?;
            let mut builder = self
                .client
                .request(request.method().clone(), &url)
                .timeout(self.timeout)
                .query(request.query_pairs());
            if let Some(authorization) = request.authorization() {
                builder = builder.header(AUTHORIZATION, authorization);
            }
            if let Some(body) = request.body() {
                builder = builder.json(body);
            }

            let response = builder.send().await.map_err(|e| {
                if e.is_builder() {
                    CallError::fatal(format!("invalid request: {e}"))
                } else {
                    CallError::transient(format!("request failed: {e}"))
                }
            })?;

            let status = response.status();
            if status.is_success() {
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| CallError::transient(format!("reading response body: {e}")))?;
                if bytes.is_empty() {
                    return Ok(serde_json::Value::Null);
                }
                return serde_json::from_slice(&bytes)
                    .map_err(|e| CallError::transient(format!("invalid response body: {e}")));
            }

            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            let classification = classify_status(status.as_u16(), retry_after);
            debug!(%status, classification = classification.label(), "remote call failed");
            Err(CallError::new(classification, format!("{status}: {body}")))
        })
    }
}
