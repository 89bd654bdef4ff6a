//! Per-region filter-and-dispatch worker.
//!
//! One worker per region, each owning its queue subscription and its
//! region sink. Lifecycle: RUNNING → (shutdown observed) DRAINING →
//! CLOSED. Shutdown is cooperative — a watch channel is observed between
//! deliveries, so the in-flight message always completes.

use std::path::Path;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::watch;

use crate::broker::{Broker, Delivery};
use crate::config::Thresholds;
use crate::error::Error;
use crate::record::{Record, queue_name};
use crate::sink::{AppendOutcome, RegionSink};

/// Counters for one worker's run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSummary {
    pub region: String,
    /// Deliveries received, including malformed ones.
    pub received: usize,
    /// Records written to the output file.
    pub matched: usize,
    /// Malformed messages logged and dropped.
    pub dropped: usize,
}

/// Drains one region queue, filtering records into the region's output file.
pub struct RegionWorker {
    broker: Arc<dyn Broker>,
    region: String,
    queue: String,
    sink: RegionSink,
    thresholds: Thresholds,
    shutdown: watch::Receiver<bool>,
}

impl RegionWorker {
    pub fn new(
        broker: Arc<dyn Broker>,
        region: &str,
        output_dir: &Path,
        thresholds: Thresholds,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            broker,
            region: region.to_string(),
            queue: queue_name(region),
            sink: RegionSink::new(output_dir, region),
            thresholds,
            shutdown,
        }
    }

    /// Consume until shutdown is observed or the delivery stream ends.
    pub async fn run(mut self) -> Result<WorkerSummary, Error> {
        let mut stream = self.broker.subscribe(&self.queue).await?;
        let mut shutdown = self.shutdown.clone();
        tracing::info!(queue = %self.queue, "Waiting for messages");

        let mut summary = WorkerSummary {
            region: self.region.clone(),
            received: 0,
            matched: 0,
            dropped: 0,
        };

        loop {
            if *shutdown.borrow_and_update() {
                tracing::info!(queue = %self.queue, "Shutdown observed, draining");
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    // A dropped sender counts as shutdown.
                    if changed.is_err() {
                        break;
                    }
                }
                next = stream.next() => match next {
                    Some(Ok(delivery)) => self.handle(delivery, &mut summary).await,
                    Some(Err(e)) => {
                        tracing::error!(queue = %self.queue, error = %e, "Delivery stream failed");
                        return Err(e.into());
                    }
                    None => {
                        tracing::info!(queue = %self.queue, "Delivery stream ended");
                        break;
                    }
                },
            }
        }

        tracing::info!(
            queue = %self.queue,
            received = summary.received,
            matched = summary.matched,
            "Closing connection"
        );
        Ok(summary)
    }

    /// Handle one delivery.
    ///
    /// Malformed messages are logged, acked, and dropped — never retried,
    /// never dead-lettered. Matching records are acked only after the
    /// output write succeeds, so a crash in between redelivers the message;
    /// the sink's dedup key makes that redelivery a no-op.
    async fn handle(&mut self, delivery: Delivery, summary: &mut WorkerSummary) {
        summary.received += 1;

        let record = match Record::decode(&delivery.payload) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(queue = %self.queue, error = %e, "Dropping malformed message");
                summary.dropped += 1;
                self.ack(delivery).await;
                return;
            }
        };

        if !record.passes(&self.thresholds) {
            self.ack(delivery).await;
            return;
        }

        match self.sink.append(&record) {
            Ok(AppendOutcome::Written) => {
                summary.matched += 1;
                tracing::info!(
                    country = %record.country,
                    region = %record.region,
                    "Data written"
                );
                self.ack(delivery).await;
            }
            Ok(AppendOutcome::Duplicate) => {
                tracing::debug!(
                    country = %record.country,
                    region = %record.region,
                    "Redelivered record already written"
                );
                self.ack(delivery).await;
            }
            Err(e) => {
                // Leave the delivery unacked so the broker redelivers it.
                tracing::error!(
                    queue = %self.queue,
                    error = %e,
                    "Output write failed; delivery left unacked"
                );
            }
        }
    }

    async fn ack(&self, delivery: Delivery) {
        if let Err(e) = delivery.acker.ack().await {
            tracing::warn!(queue = %self.queue, error = %e, "Failed to ack delivery");
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::broker::MemoryBroker;

    fn worker(
        broker: Arc<MemoryBroker>,
        region: &str,
        dir: &Path,
    ) -> (RegionWorker, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let w = RegionWorker::new(broker, region, dir, Thresholds::default(), rx);
        (w, tx)
    }

    #[tokio::test]
    async fn drains_queue_and_writes_matches() {
        let dir = tempfile::tempdir().unwrap();
        let broker = Arc::new(MemoryBroker::new());
        broker
            .publish("queue_Europe", b"France,Europe,2019,82.5,40000.0")
            .await
            .unwrap();
        broker
            .publish("queue_Europe", b"Ukraine,Europe,2019,71.8,3700.0")
            .await
            .unwrap();
        broker.close_all();

        let (worker, _tx) = worker(broker, "Europe", dir.path());
        let summary = worker.run().await.unwrap();

        assert_eq!(summary.received, 2);
        assert_eq!(summary.matched, 1);
        assert_eq!(summary.dropped, 0);

        let contents =
            std::fs::read_to_string(dir.path().join("Europe.csv")).unwrap();
        assert!(contents.contains("France,Europe,2019,40000.0,82.5"));
        assert!(!contents.contains("Ukraine"));
    }

    #[tokio::test]
    async fn malformed_messages_are_dropped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let broker = Arc::new(MemoryBroker::new());
        broker.publish("queue_Europe", b"not,enough").await.unwrap();
        broker
            .publish("queue_Europe", b"France,Europe,2019,82.5,40000.0")
            .await
            .unwrap();
        broker.close_all();

        let (worker, _tx) = worker(broker, "Europe", dir.path());
        let summary = worker.run().await.unwrap();

        assert_eq!(summary.received, 2);
        assert_eq!(summary.dropped, 1);
        assert_eq!(summary.matched, 1);
    }

    #[tokio::test]
    async fn no_output_file_when_nothing_matches() {
        let dir = tempfile::tempdir().unwrap();
        let broker = Arc::new(MemoryBroker::new());
        broker
            .publish("queue_Africa", b"Chad,Africa,2019,54.1,700.0")
            .await
            .unwrap();
        broker.close_all();

        let (worker, _tx) = worker(broker, "Africa", dir.path());
        let summary = worker.run().await.unwrap();

        assert_eq!(summary.received, 1);
        assert_eq!(summary.matched, 0);
        assert!(!dir.path().join("Africa.csv").exists());
    }

    #[tokio::test]
    async fn shutdown_signal_stops_an_idle_worker() {
        let dir = tempfile::tempdir().unwrap();
        let broker = Arc::new(MemoryBroker::new());

        let (worker, tx) = worker(broker, "Europe", dir.path());
        let handle = tokio::spawn(worker.run());

        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();

        let summary = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker did not observe shutdown")
            .unwrap()
            .unwrap();
        assert_eq!(summary.received, 0);
    }

    #[tokio::test]
    async fn redelivered_duplicate_is_not_written_twice() {
        let dir = tempfile::tempdir().unwrap();
        let broker = Arc::new(MemoryBroker::new());
        let body: &[u8] = b"France,Europe,2019,82.5,40000.0";
        broker.publish("queue_Europe", body).await.unwrap();
        broker.publish("queue_Europe", body).await.unwrap();
        broker.close_all();

        let (worker, _tx) = worker(broker, "Europe", dir.path());
        let summary = worker.run().await.unwrap();

        assert_eq!(summary.received, 2);
        assert_eq!(summary.matched, 1);
        let contents =
            std::fs::read_to_string(dir.path().join("Europe.csv")).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
