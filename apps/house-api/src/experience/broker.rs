//! AMQP wiring for the experience queue.

use async_trait::async_trait;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::{FieldTable, ShortString};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer, ExchangeKind};

use crate::config::QueueConfig;
use crate::error::PublishError;

use super::processor::{Delivery, Disposition, SettleError};
use super::publisher::EventSink;

/// Persistent delivery mode: messages survive a broker restart.
const PERSISTENT: u8 = 2;

/// A broker connection with the experience topology declared.
pub struct Broker {
    connection: Connection,
    config: QueueConfig,
}

impl Broker {
    /// Connect and declare the durable direct exchange, the durable queue and
    /// the binding between them. Declarations are idempotent.
    pub async fn connect(config: &QueueConfig) -> Result<Self, lapin::Error> {
        let connection = Connection::connect(&config.url, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;

        channel
            .exchange_declare(
                &config.exchange,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        channel
            .queue_declare(
                &config.queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        channel
            .queue_bind(
                &config.queue,
                &config.exchange,
                &config.routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;

        tracing::info!(
            exchange = %config.exchange,
            queue = %config.queue,
            routing_key = %config.routing_key,
            "experience queue declared"
        );

        Ok(Self {
            connection,
            config: config.clone(),
        })
    }

    /// A publishing channel in confirm mode.
    pub async fn publisher_sink(&self) -> Result<AmqpSink, lapin::Error> {
        let channel = self.connection.create_channel().await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;
        Ok(AmqpSink {
            channel,
            exchange: self.config.exchange.clone(),
            routing_key: self.config.routing_key.clone(),
        })
    }

    /// A manual-ack consumer on its own channel, limited to `prefetch`
    /// unsettled deliveries.
    pub async fn consumer(&self, tag: &str) -> Result<Consumer, lapin::Error> {
        let channel = self.connection.create_channel().await?;
        channel
            .basic_qos(self.config.prefetch, BasicQosOptions::default())
            .await?;
        channel
            .basic_consume(
                &self.config.queue,
                tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
    }

    pub async fn close(&self) {
        if let Err(e) = self.connection.close(200, "shutdown").await {
            tracing::debug!(%e, "broker connection close failed");
        }
    }
}

/// Publishes experience events to the configured exchange.
pub struct AmqpSink {
    channel: Channel,
    exchange: String,
    routing_key: String,
}

#[async_trait]
impl EventSink for AmqpSink {
    async fn send(&self, body: Vec<u8>) -> Result<(), PublishError> {
        let properties = BasicProperties::default()
            .with_content_type(ShortString::from("application/json"))
            .with_delivery_mode(PERSISTENT);

        let confirm = self
            .channel
            .basic_publish(
                &self.exchange,
                &self.routing_key,
                BasicPublishOptions::default(),
                &body,
                properties,
            )
            .await?
            .await?;

        if confirm.is_nack() {
            return Err(PublishError::Broker("publish nacked by broker".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Delivery for lapin::message::Delivery {
    fn body(&self) -> &[u8] {
        &self.data
    }

    async fn settle(self, disposition: Disposition) -> Result<(), SettleError> {
        let result = match disposition {
            Disposition::Ack => self.acker.ack(BasicAckOptions::default()).await,
            Disposition::Reject => {
                self.acker
                    .nack(BasicNackOptions {
                        requeue: false,
                        ..Default::default()
                    })
                    .await
            }
            Disposition::Requeue => {
                self.acker
                    .nack(BasicNackOptions {
                        requeue: true,
                        ..Default::default()
                    })
                    .await
            }
        };
        result.map_err(|e| SettleError(e.to_string()))
    }
}
