//! Redis stream publisher for grant lifecycle events.

use async_trait::async_trait;
use tracing::debug;
use warden_application::EventBus;
use warden_core::{AppError, AppResult};
use warden_domain::GrantEvent;

/// Appends grant events to the stream `<prefix>:grant-events`.
#[derive(Clone)]
pub struct RedisStreamEventBus {
    client: redis::Client,
    key_prefix: String,
}

impl RedisStreamEventBus {
    /// Creates one event bus adapter.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn stream_key(&self) -> String {
        format!("{}:grant-events", self.key_prefix)
    }
}

#[async_trait]
impl EventBus for RedisStreamEventBus {
    async fn publish(&self, event: GrantEvent) -> AppResult<()> {
        let payload = serde_json::to_string(&event).map_err(|error| {
            AppError::Internal(format!("failed to serialize grant event: {error}"))
        })?;

        let mut connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::External(format!("failed to connect to redis: {error}")))?;

        let entry_id: String = redis::cmd("XADD")
            .arg(self.stream_key())
            .arg("*")
            .arg("type")
            .arg(event.kind.event_type())
            .arg("grant_id")
            .arg(event.grant.id())
            .arg("dedup_key")
            .arg(event.deduplication_key())
            .arg("payload")
            .arg(payload)
            .query_async(&mut connection)
            .await
            .map_err(|error| {
                AppError::External(format!("failed to append grant event: {error}"))
            })?;

        debug!(
            grant_id = %event.grant.id(),
            event_type = event.kind.event_type(),
            entry_id = %entry_id,
            "grant event published"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_key_uses_prefix() {
        let client = redis::Client::open("redis://127.0.0.1/").unwrap_or_else(|_| unreachable!());
        let bus = RedisStreamEventBus::new(client, "warden");
        assert_eq!(bus.stream_key(), "warden:grant-events");
    }
}
