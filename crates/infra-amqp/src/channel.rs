// AMQP Channel: queue declaration and auto-ack subscription

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{BasicConsumeOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::Channel;
use tracing::debug;
use uuid::Uuid;

use event_consumer_core::port::{BrokerError, DeliveryStream, QueueChannel, QueueOptions};

use crate::{CLOSE_REPLY_CODE, CLOSE_REPLY_TEXT};

/// lapin channel bound to one consumer loop
pub struct AmqpChannel {
    inner: Channel,
}

impl AmqpChannel {
    pub fn new(inner: Channel) -> Self {
        Self { inner }
    }
}

fn declare_options(options: QueueOptions) -> QueueDeclareOptions {
    QueueDeclareOptions {
        passive: false,
        durable: options.durable,
        exclusive: options.exclusive,
        auto_delete: options.auto_delete,
        nowait: false,
    }
}

/// Auto-acknowledge: the broker forgets each message once it is delivered
fn consume_options() -> BasicConsumeOptions {
    BasicConsumeOptions {
        no_ack: true,
        ..Default::default()
    }
}

fn consumer_tag(queue: &str) -> String {
    format!("event-consumer.{}.{}", queue, Uuid::new_v4())
}

#[async_trait]
impl QueueChannel for AmqpChannel {
    async fn declare_queue(&self, queue: &str, options: QueueOptions) -> Result<(), BrokerError> {
        let declared = self
            .inner
            .queue_declare(queue, declare_options(options), FieldTable::default())
            .await
            .map_err(|e| BrokerError::Declaration {
                queue: queue.to_string(),
                reason: e.to_string(),
            })?;
        debug!(
            queue,
            messages = declared.message_count(),
            consumers = declared.consumer_count(),
            "Queue declare-ok"
        );
        Ok(())
    }

    async fn subscribe(&self, queue: &str) -> Result<DeliveryStream, BrokerError> {
        let tag = consumer_tag(queue);
        let consumer = self
            .inner
            .basic_consume(queue, &tag, consume_options(), FieldTable::default())
            .await
            .map_err(|e| BrokerError::Subscription {
                queue: queue.to_string(),
                reason: e.to_string(),
            })?;
        debug!(queue, consumer_tag = %tag, "Consumer registered");

        let deliveries = consumer.map(|delivery| {
            delivery
                .map(|d| d.data)
                .map_err(|e| BrokerError::Delivery(e.to_string()))
        });
        Ok(deliveries.boxed())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        if !self.inner.status().connected() {
            debug!(channel_id = self.inner.id(), "AMQP channel already closed");
            return Ok(());
        }
        self.inner
            .close(CLOSE_REPLY_CODE, CLOSE_REPLY_TEXT)
            .await
            .map_err(|e| BrokerError::Channel(e.to_string()))
    }
}
