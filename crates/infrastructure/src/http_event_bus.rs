//! Webhook publisher for grant lifecycle events.

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;
use warden_application::{EventBus, RetryError, RetryPolicy, retry, retryable};
use warden_core::{AppError, AppResult};
use warden_domain::GrantEvent;

/// Posts each grant event as JSON to one endpoint.
///
/// Transport errors, 5xx and 429 responses are retried under the policy;
/// the `Idempotency-Key` header lets receivers drop duplicate deliveries.
pub struct HttpEventBus {
    http_client: reqwest::Client,
    endpoint: String,
    policy: RetryPolicy,
}

impl HttpEventBus {
    /// Creates a webhook event bus.
    #[must_use]
    pub fn new(http_client: reqwest::Client, endpoint: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            http_client,
            endpoint: endpoint.into(),
            policy,
        }
    }
}

#[async_trait]
impl EventBus for HttpEventBus {
    async fn publish(&self, event: GrantEvent) -> AppResult<()> {
        let idempotency_key = event.deduplication_key();
        let event_type = event.kind.event_type();

        retry(&self.policy, || {
            let request = self
                .http_client
                .post(self.endpoint.as_str())
                .header("Idempotency-Key", idempotency_key.as_str())
                .header("X-Warden-Event", event_type)
                .json(&event);

            async move {
                let response = request.send().await.map_err(|error| {
                    retryable(AppError::External(format!(
                        "grant event webhook transport error: {error}"
                    )))
                })?;

                let status = response.status();
                if status.is_success() {
                    return Ok(());
                }

                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "<response body unavailable>".to_owned());
                Err(classify_failure(status, body))
            }
        })
        .await?;

        debug!(
            grant_id = %event.grant.id(),
            event_type,
            idempotency_key = %idempotency_key,
            "grant event delivered"
        );
        Ok(())
    }
}

fn classify_failure(status: StatusCode, body: String) -> RetryError {
    let error = AppError::External(format!(
        "grant event webhook failed with status {status}: {body}"
    ));

    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        retryable(error)
    } else {
        RetryError::Fatal(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_and_throttling_are_retried() {
        assert!(matches!(
            classify_failure(StatusCode::BAD_GATEWAY, String::new()),
            RetryError::Retryable(_)
        ));
        assert!(matches!(
            classify_failure(StatusCode::TOO_MANY_REQUESTS, String::new()),
            RetryError::Retryable(_)
        ));
    }

    #[test]
    fn client_errors_are_fatal_and_keep_the_body() {
        let failure = classify_failure(StatusCode::UNPROCESSABLE_ENTITY, "bad payload".to_owned());
        assert!(matches!(
            failure,
            RetryError::Fatal(AppError::External(message)) if message.contains("bad payload")
        ));
    }
}
