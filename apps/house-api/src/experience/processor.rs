//! The leveling consumer: applies experience events to user storage.

use std::fmt::Display;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use house_common::{ExperienceEvent, LevelTable};

use crate::db::levels::LevelStore;
use crate::error::StoreError;
use crate::gateway::HubHandle;
use crate::models::user::LevelChange;

/// How a delivery is settled with the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Processed; remove from the queue.
    Ack,
    /// Poison or permanently unprocessable; drop without requeue.
    Reject,
    /// Transient failure; put back for redelivery.
    Requeue,
}

#[derive(Debug, thiserror::Error)]
#[error("failed to settle delivery: {0}")]
pub struct SettleError(pub String);

/// One manually-acknowledged message from the experience queue.
#[async_trait]
pub trait Delivery: Send + Sized {
    fn body(&self) -> &[u8];
    async fn settle(self, disposition: Disposition) -> Result<(), SettleError>;
}

/// Consumes experience events and credits them transactionally.
///
/// Events carry no idempotency key: a redelivered event is credited again.
#[derive(Clone)]
pub struct LevelingProcessor {
    store: Arc<dyn LevelStore>,
    notifier: Option<(HubHandle, Arc<LevelTable>)>,
}

impl LevelingProcessor {
    pub fn new(store: Arc<dyn LevelStore>) -> Self {
        Self {
            store,
            notifier: None,
        }
    }

    /// Push a notification frame to users who level up while online.
    pub fn with_notifications(mut self, hub: HubHandle, table: Arc<LevelTable>) -> Self {
        self.notifier = Some((hub, table));
        self
    }

    /// Drain `deliveries` until the stream ends, settling each one.
    ///
    /// No single event, however broken, stops the loop.
    pub async fn run<S, D, E>(&self, deliveries: S)
    where
        S: Stream<Item = Result<D, E>> + Send,
        D: Delivery,
        E: Display,
    {
        let mut deliveries = std::pin::pin!(deliveries);
        tracing::info!("exp consumer started, waiting for messages");

        while let Some(item) = deliveries.next().await {
            let delivery = match item {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!(%e, "exp consumer stream error");
                    continue;
                }
            };

            let disposition = self.handle(delivery.body()).await;
            if let Err(e) = delivery.settle(disposition).await {
                tracing::warn!(%e, ?disposition, "failed to settle exp message");
            }
        }

        tracing::info!("exp consumer stopped");
    }

    /// Decide the fate of one message body.
    pub async fn handle(&self, body: &[u8]) -> Disposition {
        let event = match ExperienceEvent::decode(body) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(%e, "dropping undecodable exp message");
                return Disposition::Reject;
            }
        };

        match self.store.apply_experience(event.user_id, event.exp_amount).await {
            Ok(change) => {
                tracing::info!(
                    user_id = event.user_id,
                    action = %event.action,
                    exp = event.exp_amount,
                    total = change.exp,
                    "processed exp message"
                );
                if change.new_level != change.old_level {
                    self.on_level_change(&change).await;
                }
                Disposition::Ack
            }
            Err(StoreError::UserNotFound(user_id)) => {
                tracing::warn!(user_id, action = %event.action, "exp message for unknown user dropped");
                Disposition::Reject
            }
            Err(e) => {
                tracing::warn!(%e, user_id = event.user_id, "failed to process exp message, requeueing");
                Disposition::Requeue
            }
        }
    }

    async fn on_level_change(&self, change: &LevelChange) {
        tracing::info!(
            user_id = change.user_id,
            from = change.old_level,
            to = change.new_level,
            "user level changed"
        );

        let Some((hub, table)) = &self.notifier else {
            return;
        };
        if !change.leveled_up() {
            return;
        }
        let content = format!(
            "Level up! You are now level {} ({})",
            change.new_level,
            table.name_of(change.new_level)
        );
        if let Err(e) = hub.notify(change.user_id, content).await {
            tracing::debug!(%e, user_id = change.user_id, "level-up notification not sent");
        }
    }
}
