use std::sync::Arc;
use std::time::Duration;

use super::stream::{MessageStream, StreamError, StreamMessage};
use crate::metrics::{MessageOutcome, PipelineObserver};
use crate::models::Order;
use crate::service::OrderService;
use crate::utils::Shutdown;

// ============================================================================
// Order Consumer
// ============================================================================
//
// Reading → Decoding → Persisting → Committing → Reading
//
// - Undecodable messages are committed and skipped so they never block the
//   partition.
// - A message is committed only after the store accepted it. When the store
//   rejects it the partition is rewound to that offset and the loop backs off
//   before reading again, so the same message comes back in this session.
// - A rewind that fails stops the consumer with an error. Reading on would
//   commit a later offset past the message the store never accepted.
// - Commit failures are logged and the loop moves on; a re-delivery after a
//   restart lands on an idempotent upsert.
// - Every wait (read, persist, backoff) races the shutdown signal.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    #[error("stream read failed: {0}")]
    Read(#[from] StreamError),

    #[error("rewind to offset {offset} failed: {source}")]
    Rewind { offset: i64, source: StreamError },
}

enum Flow {
    Continue,
    Stop,
}

pub struct OrderConsumer {
    service: Arc<OrderService>,
    observer: Arc<dyn PipelineObserver>,
    retry_backoff: Duration,
}

impl OrderConsumer {
    pub fn new(
        service: Arc<OrderService>,
        observer: Arc<dyn PipelineObserver>,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            service,
            observer,
            retry_backoff,
        }
    }

    /// Consume until `shutdown` fires or the stream fails. A read error that
    /// races a pending shutdown counts as a clean stop.
    pub async fn run<S: MessageStream>(&self, mut stream: S, shutdown: Shutdown) -> Result<(), ConsumerError> {
        tracing::info!("Order consumer started");

        loop {
            let message = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                next = stream.next() => match next {
                    Ok(message) => message,
                    Err(e) if shutdown.is_cancelled() => {
                        tracing::debug!(error = %e, "Read interrupted by shutdown");
                        break;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Stream read failed, stopping consumer");
                        return Err(e.into());
                    }
                },
            };

            if let Flow::Stop = self.handle(&mut stream, message, &shutdown).await? {
                break;
            }
        }

        tracing::info!("Order consumer stopped");
        Ok(())
    }

    async fn handle<S: MessageStream>(
        &self,
        stream: &mut S,
        message: StreamMessage,
        shutdown: &Shutdown,
    ) -> Result<Flow, ConsumerError> {
        let payload = message.payload.as_deref().unwrap_or_default();

        let order = match Order::from_json(payload) {
            Ok(order) => order,
            Err(e) => {
                tracing::warn!(
                    partition = message.partition,
                    offset = message.offset,
                    key = %message.key_str(),
                    error = %e,
                    "Skipping undecodable message"
                );
                self.commit(stream, &message).await;
                self.observer.message_processed(MessageOutcome::Skipped);
                return Ok(Flow::Continue);
            }
        };

        let saved = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                tracing::info!(offset = message.offset, "Shutdown during persist, offset left uncommitted");
                return Ok(Flow::Stop);
            }
            result = self.service.set(&order) => result,
        };

        if let Err(e) = saved {
            tracing::warn!(
                order_uid = %order.order_uid,
                partition = message.partition,
                offset = message.offset,
                error = %e,
                backoff_ms = self.retry_backoff.as_millis() as u64,
                "Persist failed, message will be re-delivered"
            );
            self.observer.message_processed(MessageOutcome::Failed);

            if let Err(e) = stream.rewind(&message).await {
                tracing::error!(
                    partition = message.partition,
                    offset = message.offset,
                    error = %e,
                    "Rewind failed, stopping consumer with offset left uncommitted"
                );
                return Err(ConsumerError::Rewind {
                    offset: message.offset,
                    source: e,
                });
            }

            return Ok(tokio::select! {
                biased;
                _ = shutdown.cancelled() => Flow::Stop,
                _ = tokio::time::sleep(self.retry_backoff) => Flow::Continue,
            });
        }

        if self.commit(stream, &message).await {
            tracing::debug!(
                order_uid = %order.order_uid,
                partition = message.partition,
                offset = message.offset,
                "Message persisted and committed"
            );
            self.observer.message_processed(MessageOutcome::Persisted);
        } else {
            self.observer.message_processed(MessageOutcome::CommitFailed);
        }
        Ok(Flow::Continue)
    }

    async fn commit<S: MessageStream>(&self, stream: &mut S, message: &StreamMessage) -> bool {
        match stream.commit(message).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "Offset commit failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryOrderCache;
    use crate::messaging::stream::fake::FakeStream;
    use crate::metrics::Metrics;
    use crate::models::fixtures;
    use crate::storage::memory::InMemoryOrderStore;
    use uuid::Uuid;

    struct Harness {
        store: Arc<InMemoryOrderStore>,
        metrics: Arc<Metrics>,
        consumer: Arc<OrderConsumer>,
    }

    fn harness(backoff: Duration) -> Harness {
        let store = Arc::new(InMemoryOrderStore::new());
        let metrics = Arc::new(Metrics::new().unwrap());
        let service = Arc::new(OrderService::new(
            store.clone(),
            Arc::new(MemoryOrderCache::new("orders:", None)),
            metrics.clone(),
        ));
        let consumer = Arc::new(OrderConsumer::new(service, metrics.clone(), backoff));
        Harness { store, metrics, consumer }
    }

    fn payload(order: &Order) -> Vec<u8> {
        order.to_json().unwrap()
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_redelivered_message_leaves_same_state() {
        let h = harness(Duration::from_millis(10));
        let order = fixtures::order(Uuid::new_v4(), 2, 1500);
        let bytes = payload(&order);

        let stream = FakeStream::new(&[&bytes, &bytes]);
        let shutdown = Shutdown::new();
        let task = tokio::spawn({
            let consumer = h.consumer.clone();
            let stream = stream.clone();
            let shutdown = shutdown.clone();
            async move { consumer.run(stream, shutdown).await }
        });

        wait_until(|| stream.committed().len() == 2).await;
        shutdown.trigger();
        task.await.unwrap().unwrap();

        let snapshot = h.store.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get(&order.order_uid), Some(&order));
        assert_eq!(h.store.save_count(), 2);
    }

    #[tokio::test]
    async fn test_poison_message_is_skipped_and_committed() {
        let h = harness(Duration::from_millis(10));
        let order = fixtures::order(Uuid::new_v4(), 1, 400);
        let bytes = payload(&order);

        let stream = FakeStream::new(&[b"{not json", &bytes]);
        let shutdown = Shutdown::new();
        let task = tokio::spawn({
            let consumer = h.consumer.clone();
            let stream = stream.clone();
            let shutdown = shutdown.clone();
            async move { consumer.run(stream, shutdown).await }
        });

        wait_until(|| stream.committed().len() == 2).await;
        shutdown.trigger();
        task.await.unwrap().unwrap();

        assert_eq!(stream.committed(), vec![0, 1]);
        assert!(h.store.snapshot().contains_key(&order.order_uid));

        let messages = &h.metrics.messages_total;
        assert_eq!(messages.with_label_values(&["skipped"]).get(), 1);
        assert_eq!(messages.with_label_values(&["persisted"]).get(), 1);
    }

    #[tokio::test]
    async fn test_message_without_payload_is_skipped() {
        let h = harness(Duration::from_millis(10));
        let stream = FakeStream::new(&[]);
        stream.state.lock().unwrap().queue.push_back(StreamMessage {
            topic: "orders-topic".to_string(),
            partition: 0,
            offset: 7,
            key: Some(b"k".to_vec()),
            payload: None,
        });

        let shutdown = Shutdown::new();
        let task = tokio::spawn({
            let consumer = h.consumer.clone();
            let stream = stream.clone();
            let shutdown = shutdown.clone();
            async move { consumer.run(stream, shutdown).await }
        });

        wait_until(|| stream.committed() == vec![7]).await;
        shutdown.trigger();
        task.await.unwrap().unwrap();
        assert!(h.store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_persist_failure_is_not_committed_and_redelivered() {
        let h = harness(Duration::from_millis(10));
        let order = fixtures::order(Uuid::new_v4(), 1, 2000);
        let bytes = payload(&order);

        h.store.fail_saves(true);
        let stream = FakeStream::new(&[&bytes]);
        let shutdown = Shutdown::new();
        let task = tokio::spawn({
            let consumer = h.consumer.clone();
            let stream = stream.clone();
            let shutdown = shutdown.clone();
            async move { consumer.run(stream, shutdown).await }
        });

        wait_until(|| stream.rewinds().len() >= 2).await;
        assert!(stream.committed().is_empty());
        assert!(h.store.snapshot().is_empty());

        h.store.fail_saves(false);
        wait_until(|| stream.committed() == vec![0]).await;
        shutdown.trigger();
        task.await.unwrap().unwrap();

        assert!(stream.is_drained());
        assert_eq!(h.store.snapshot().get(&order.order_uid), Some(&order));
        assert!(h.metrics.messages_total.with_label_values(&["failed"]).get() >= 2);
    }

    #[tokio::test]
    async fn test_shutdown_during_backoff_stops_promptly() {
        let h = harness(Duration::from_secs(60));
        let order = fixtures::order(Uuid::new_v4(), 1, 10);
        let bytes = payload(&order);

        h.store.fail_saves(true);
        let stream = FakeStream::new(&[&bytes]);
        let shutdown = Shutdown::new();
        let task = tokio::spawn({
            let consumer = h.consumer.clone();
            let stream = stream.clone();
            let shutdown = shutdown.clone();
            async move { consumer.run(stream, shutdown).await }
        });

        wait_until(|| stream.rewinds().len() == 1).await;
        shutdown.trigger();

        let result = tokio::time::timeout(Duration::from_secs(1), task).await;
        assert!(result.unwrap().unwrap().is_ok());
        assert!(stream.committed().is_empty());
    }

    #[tokio::test]
    async fn test_rewind_failure_stops_before_later_commits() {
        let h = harness(Duration::from_millis(10));
        let first = fixtures::order(Uuid::new_v4(), 1, 100);
        let second = fixtures::order(Uuid::new_v4(), 1, 200);

        h.store.fail_saves(true);
        let stream = FakeStream::new(&[&payload(&first), &payload(&second)]).fail_rewinds();

        let result = tokio::time::timeout(Duration::from_secs(1), h.consumer.run(stream.clone(), Shutdown::new()))
            .await
            .unwrap();

        assert!(matches!(result, Err(ConsumerError::Rewind { offset: 0, .. })));
        assert!(stream.committed().is_empty());
        assert!(h.store.snapshot().is_empty());
        let pending: Vec<i64> = stream.state.lock().unwrap().queue.iter().map(|m| m.offset).collect();
        assert_eq!(pending, vec![1], "second message was never read");
    }

    #[tokio::test]
    async fn test_idle_consumer_stops_on_shutdown() {
        let h = harness(Duration::from_millis(10));
        let shutdown = Shutdown::new();
        let task = tokio::spawn({
            let consumer = h.consumer.clone();
            let shutdown = shutdown.clone();
            async move { consumer.run(FakeStream::new(&[]), shutdown).await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.trigger();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_transport_error_is_fatal() {
        let h = harness(Duration::from_millis(10));
        let stream = FakeStream::new(&[]).fail_when_empty();

        let result = h.consumer.run(stream, Shutdown::new()).await;
        assert!(matches!(result, Err(ConsumerError::Read(StreamError::Transport(_)))));
    }

    #[tokio::test]
    async fn test_transport_error_after_shutdown_is_clean() {
        let h = harness(Duration::from_millis(10));
        let stream = FakeStream::new(&[]).fail_when_empty();
        let shutdown = Shutdown::new();
        shutdown.trigger();

        assert!(h.consumer.run(stream, shutdown).await.is_ok());
    }
}
