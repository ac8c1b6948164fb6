use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::{HttpBackend, ReqwestBackend, RequestDescriptor, Response, TransportError};

/// Delay before retry number `attempt + 1`: `base × 2^attempt`.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

/// Bounded retry with exponential backoff around an `HttpBackend`.
///
/// Success (2xx) returns at once. A 4xx other than 429 fails at once. A 429,
/// any other non-2xx status, or a network failure is retried until
/// `retries` extra attempts have been spent, after which the last failure is
/// returned.
#[derive(Clone)]
pub struct RetryingTransport {
    backend: Arc<dyn HttpBackend>,
}

impl RetryingTransport {
    pub fn new(backend: Arc<dyn HttpBackend>) -> Self {
        Self { backend }
    }

    pub fn reqwest() -> Self {
        Self::new(Arc::new(ReqwestBackend::new()))
    }

    pub async fn execute(&self, req: &RequestDescriptor) -> Result<Response, TransportError> {
        let mut last_error: Option<TransportError> = None;

        for attempt in 0..=req.retries {
            match self.backend.send(req).await {
                Ok(resp) if resp.status().is_success() => {
                    debug!(url = %req.target, attempt, "request succeeded");
                    return Ok(resp);
                }
                Ok(resp) => {
                    let status = resp.status();
                    // The body only feeds the error message.
                    let body = resp.text().await.unwrap_or_default();
                    let err = TransportError::from_status(status, &body);
                    if !err.is_retryable() {
                        return Err(err);
                    }
                    last_error = Some(err);
                }
                Err(err) => {
                    if !err.is_retryable() {
                        return Err(err);
                    }
                    last_error = Some(err);
                }
            }

            if attempt < req.retries {
                let delay = backoff_delay(req.backoff_base, attempt);
                warn!(
                    url = %req.target,
                    retry = attempt + 1,
                    retries = req.retries,
                    delay_ms = delay.as_millis() as u64,
                    error = ?last_error.as_ref().map(|e| e.cause.as_str()),
                    "retrying request"
                );
                tokio::time::sleep(delay).await;
            }
        }

        Err(last_error.unwrap_or_else(TransportError::exhausted))
    }
}
