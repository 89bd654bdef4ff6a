//! In-process broker for tests: FIFO queues over unbounded channels.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::broker::{Acker, Broker, Delivery, DeliveryStream};
use crate::error::BrokerError;

struct MemoryQueue {
    sender: Option<mpsc::UnboundedSender<Vec<u8>>>,
    receiver: Option<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl MemoryQueue {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            sender: Some(tx),
            receiver: Some(rx),
        }
    }
}

/// In-memory [`Broker`]: one FIFO queue per name, a single subscriber per
/// queue, messages buffered until subscribed.
///
/// [`close_all`](MemoryBroker::close_all) drops the publish side of every
/// queue so subscribers drain whatever is buffered and then see end of
/// stream — this is how tests shut the pipeline down deterministically.
#[derive(Default)]
pub struct MemoryBroker {
    queues: Mutex<HashMap<String, MemoryQueue>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Close every queue for publishing; subscribers drain and finish.
    pub fn close_all(&self) {
        let mut queues = self.queues.lock().expect("queue map poisoned");
        for queue in queues.values_mut() {
            queue.sender = None;
        }
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), BrokerError> {
        let mut queues = self.queues.lock().expect("queue map poisoned");
        let entry = queues
            .entry(queue.to_string())
            .or_insert_with(MemoryQueue::new);
        let sender = entry.sender.as_ref().ok_or_else(|| BrokerError::Publish {
            queue: queue.to_string(),
            reason: "queue is closed".to_string(),
        })?;
        sender
            .send(payload.to_vec())
            .map_err(|_| BrokerError::Publish {
                queue: queue.to_string(),
                reason: "subscriber dropped".to_string(),
            })
    }

    async fn subscribe(&self, queue: &str) -> Result<DeliveryStream, BrokerError> {
        let mut queues = self.queues.lock().expect("queue map poisoned");
        let entry = queues
            .entry(queue.to_string())
            .or_insert_with(MemoryQueue::new);
        let receiver = entry.receiver.take().ok_or_else(|| BrokerError::Subscribe {
            queue: queue.to_string(),
            reason: "queue already has a subscriber".to_string(),
        })?;
        let stream = UnboundedReceiverStream::new(receiver).map(|payload| {
            Ok(Delivery {
                payload,
                acker: Acker::Noop,
            })
        });
        Ok(Box::pin(stream))
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_in_publish_order() {
        let broker = MemoryBroker::new();
        broker.publish("q", b"first").await.unwrap();
        broker.publish("q", b"second").await.unwrap();

        let mut stream = broker.subscribe("q").await.unwrap();
        let a = stream.next().await.unwrap().unwrap();
        let b = stream.next().await.unwrap().unwrap();
        assert_eq!(a.payload, b"first");
        assert_eq!(b.payload, b"second");
    }

    #[tokio::test]
    async fn queues_are_independent() {
        let broker = MemoryBroker::new();
        broker.publish("queue_Africa", b"a").await.unwrap();
        broker.publish("queue_Asia", b"b").await.unwrap();

        let mut asia = broker.subscribe("queue_Asia").await.unwrap();
        assert_eq!(asia.next().await.unwrap().unwrap().payload, b"b");
    }

    #[tokio::test]
    async fn second_subscriber_is_rejected() {
        let broker = MemoryBroker::new();
        let _first = broker.subscribe("q").await.unwrap();
        let err = broker.subscribe("q").await.err().unwrap();
        assert!(matches!(err, BrokerError::Subscribe { .. }));
    }

    #[tokio::test]
    async fn close_all_drains_then_ends_stream() {
        let broker = MemoryBroker::new();
        broker.publish("q", b"last").await.unwrap();
        broker.close_all();

        let mut stream = broker.subscribe("q").await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap().payload, b"last");
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn publish_after_close_fails() {
        let broker = MemoryBroker::new();
        broker.publish("q", b"x").await.unwrap();
        broker.close_all();
        let err = broker.publish("q", b"y").await.unwrap_err();
        assert!(matches!(err, BrokerError::Publish { .. }));
    }
}
