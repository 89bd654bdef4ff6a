//! Broker abstraction for durable-queue publish/subscribe.
//!
//! The pipeline talks to the broker through the [`Broker`] trait so that the
//! producer and the region workers can run against RabbitMQ in production
//! ([`AmqpBroker`]) and against an in-process queue in tests
//! ([`MemoryBroker`]).

pub mod amqp;
pub mod memory;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use lapin::options::BasicAckOptions;

use crate::error::BrokerError;

pub use amqp::AmqpBroker;
pub use memory::MemoryBroker;

/// A single message delivered from a queue.
///
/// Acknowledgement is manual: workers ack only after the output write has
/// succeeded, so a crash between receipt and write leaves the message
/// unacked for redelivery.
pub struct Delivery {
    pub payload: Vec<u8>,
    pub acker: Acker,
}

/// Acknowledgement handle for a delivery.
pub enum Acker {
    /// AMQP ack tied to the originating channel.
    Amqp(lapin::acker::Acker),
    /// No-op ack (in-memory broker removes messages on receive).
    Noop,
}

impl Acker {
    /// Acknowledge the delivery, consuming the handle.
    pub async fn ack(self) -> Result<(), BrokerError> {
        match self {
            Acker::Amqp(acker) => acker
                .ack(BasicAckOptions::default())
                .await
                .map_err(|e| BrokerError::Ack {
                    reason: e.to_string(),
                }),
            Acker::Noop => Ok(()),
        }
    }
}

/// Stream of deliveries from one queue subscription.
pub type DeliveryStream = Pin<Box<dyn Stream<Item = Result<Delivery, BrokerError>> + Send>>;

/// Durable-queue publish/subscribe.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Publish a message to the named queue with persistent delivery.
    /// The queue is declared durable before the first publish.
    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), BrokerError>;

    /// Subscribe to the named queue. Delivery order within the queue matches
    /// publish order; cross-queue ordering is unspecified.
    async fn subscribe(&self, queue: &str) -> Result<DeliveryStream, BrokerError>;
}
