//! Gateway event publisher.
//!
//! Delivers [`TurnEvent`]s to the gateway's internal endpoint with the
//! shared `x-internal-token` header. Transport failures and 5xx retry with
//! exponential backoff up to a small cap; 4xx is terminal and logged.
//!
//! Ordering: the engine awaits each publish before emitting the next event
//! of the same turn, so on-the-wire order per `(session_id, turn_id)` is
//! emission order. A slow gateway therefore backpressures the turn, never
//! reorders or drops its events.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, warn};

use codial_core::events::TurnEvent;
use codial_core::retry::RetryConfig;

/// A sink the turn engine emits events into.
///
/// The production sink is [`GatewayPublisher`]; tests substitute a
/// recording sink.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver one event. Implementations must preserve call order per
    /// caller task.
    async fn publish(&self, event: &TurnEvent) -> Result<(), PublishError>;
}

/// Why a publish ultimately failed.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// Transport failures exhausted the retry budget.
    #[error("gateway unreachable after {attempts} attempts: {message}")]
    Exhausted {
        /// Attempts made.
        attempts: u32,
        /// Last error description.
        message: String,
    },

    /// The gateway rejected the event (4xx); not retried.
    #[error("gateway rejected event (status {status})")]
    Rejected {
        /// HTTP status code.
        status: u16,
    },
}

/// HTTP publisher for the gateway's `/internal/stream-events` endpoint.
pub struct GatewayPublisher {
    endpoint: String,
    token: String,
    http: reqwest::Client,
    retry: RetryConfig,
}

impl GatewayPublisher {
    /// Create a publisher for `base_url` with the shared internal token.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Exhausted`] when the HTTP client cannot be
    /// constructed (misconfigured TLS, for instance).
    pub fn new(
        base_url: &str,
        token: impl Into<String>,
        timeout: Duration,
        retry: RetryConfig,
    ) -> Result<Self, PublishError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PublishError::Exhausted {
                attempts: 0,
                message: e.to_string(),
            })?;

        Ok(Self {
            endpoint: format!("{}/internal/stream-events", base_url.trim_end_matches('/')),
            token: token.into(),
            http,
            retry,
        })
    }
}

#[async_trait]
impl EventSink for GatewayPublisher {
    async fn publish(&self, event: &TurnEvent) -> Result<(), PublishError> {
        let max_attempts = self.retry.max_retries + 1;
        let mut last_error = String::new();

        for attempt in 0..max_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.retry.backoff_delay(attempt - 1)).await;
                metrics::counter!("gateway_publish_retries_total").increment(1);
            }

            let result = self
                .http
                .post(&self.endpoint)
                .header("x-internal-token", &self.token)
                .json(event)
                .send()
                .await;

            match result {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if (200..300).contains(&status) {
                        return Ok(());
                    }
                    if (400..500).contains(&status) {
                        // Terminal: the gateway will never accept this event.
                        error!(
                            status,
                            session_id = %event.session_id,
                            turn_id = %event.turn_id,
                            event_type = %event.event_type,
                            "gateway rejected stream event"
                        );
                        return Err(PublishError::Rejected { status });
                    }
                    last_error = format!("gateway returned {status}");
                    warn!(status, attempt, "gateway event push failed, will retry");
                }
                Err(e) => {
                    last_error = e.to_string();
                    warn!(error = %last_error, attempt, "gateway event push failed, will retry");
                }
            }
        }

        Err(PublishError::Exhausted {
            attempts: max_attempts,
            message: last_error,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
