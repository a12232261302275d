//! Fire-and-forget publishing of experience events.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use house_common::{ActionKind, ExperienceEvent, UserId};
use tokio::time;

use crate::error::PublishError;

/// Where encoded experience events go: the AMQP exchange in production, an
/// in-memory queue in tests.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn send(&self, body: Vec<u8>) -> Result<(), PublishError>;
}

/// Publishes experience credits on behalf of business actions.
///
/// A failed publish is logged and returned, never retried. The action that
/// earned the credit has already committed, so losing the credit is the
/// accepted outcome.
#[derive(Clone)]
pub struct ExperiencePublisher {
    sink: Arc<dyn EventSink>,
    timeout: Duration,
}

impl ExperiencePublisher {
    pub fn new(sink: Arc<dyn EventSink>, timeout: Duration) -> Self {
        Self { sink, timeout }
    }

    pub async fn publish(
        &self,
        user_id: UserId,
        action: ActionKind,
        amount: i64,
    ) -> Result<(), PublishError> {
        if amount <= 0 {
            tracing::warn!(user_id, %action, amount, "refusing to publish non-positive experience");
            return Err(PublishError::InvalidAmount(amount));
        }

        let event = ExperienceEvent::new(user_id, action, amount);
        let body = event.encode().map_err(|e| {
            tracing::error!(%e, user_id, %action, "failed to encode exp message");
            PublishError::from(e)
        })?;

        let result = match time::timeout(self.timeout, self.sink.send(body)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(PublishError::Timeout(self.timeout)),
        };

        match &result {
            Ok(()) => tracing::info!(user_id, %action, exp = amount, "published exp message"),
            Err(err) => tracing::warn!(%err, user_id, %action, exp = amount, "failed to publish exp message"),
        }
        result
    }

    /// Publish the action's standard experience amount.
    pub async fn award(&self, user_id: UserId, action: ActionKind) -> Result<(), PublishError> {
        self.publish(user_id, action, action.default_amount()).await
    }
}
