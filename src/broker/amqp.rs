//! RabbitMQ-backed broker via lapin.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{BasicConsumeOptions, BasicPublishOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};

use crate::broker::{Acker, Broker, Delivery, DeliveryStream};
use crate::error::BrokerError;

/// AMQP delivery mode 2: messages are persisted by the broker and survive a
/// broker restart while unacknowledged.
const PERSISTENT: u8 = 2;

/// Broker implementation over a single AMQP connection and channel.
///
/// Queues are declared durable once each; a connection failure is fatal to
/// the calling role (no retry).
pub struct AmqpBroker {
    // Held so the channel is not closed out from under us.
    _connection: Connection,
    channel: Channel,
    declared: Mutex<HashSet<String>>,
}

impl AmqpBroker {
    /// Connect to the broker at the given AMQP URL.
    pub async fn connect(url: &str) -> Result<Self, BrokerError> {
        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(|e| BrokerError::Connect {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| BrokerError::Connect {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        tracing::info!(url = %url, "Connected to broker");
        Ok(Self {
            _connection: connection,
            channel,
            declared: Mutex::new(HashSet::new()),
        })
    }

    /// Declare the queue durable, once per queue name.
    async fn declare_durable(&self, queue: &str) -> Result<(), BrokerError> {
        {
            let declared = self.declared.lock().expect("declared set poisoned");
            if declared.contains(queue) {
                return Ok(());
            }
        }
        self.channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Declare {
                queue: queue.to_string(),
                reason: e.to_string(),
            })?;
        self.declared
            .lock()
            .expect("declared set poisoned")
            .insert(queue.to_string());
        Ok(())
    }
}

#[async_trait]
impl Broker for AmqpBroker {
    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), BrokerError> {
        self.declare_durable(queue).await?;
        let confirm = self
            .channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default().with_delivery_mode(PERSISTENT),
            )
            .await
            .map_err(|e| BrokerError::Publish {
                queue: queue.to_string(),
                reason: e.to_string(),
            })?;
        confirm.await.map_err(|e| BrokerError::Publish {
            queue: queue.to_string(),
            reason: e.to_string(),
        })?;
        Ok(())
    }

    async fn subscribe(&self, queue: &str) -> Result<DeliveryStream, BrokerError> {
        self.declare_durable(queue).await?;
        let consumer = self
            .channel
            .basic_consume(
                queue,
                &format!("regionfan-{queue}"),
                // Manual ack: no_ack stays false so unacked deliveries
                // are redelivered after a crash.
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Subscribe {
                queue: queue.to_string(),
                reason: e.to_string(),
            })?;

        let queue = queue.to_string();
        let stream = consumer.map(move |item| match item {
            Ok(delivery) => Ok(Delivery {
                payload: delivery.data,
                acker: Acker::Amqp(delivery.acker),
            }),
            Err(e) => Err(BrokerError::Stream {
                queue: queue.clone(),
                reason: e.to_string(),
            }),
        });
        Ok(Box::pin(stream))
    }
}
