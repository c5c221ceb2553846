use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::sync::Arc;
use std::time::Duration;

use crate::metrics::PipelineObserver;
use crate::models::Order;
use crate::utils::{retry_with_backoff, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState, RetryConfig};

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("circuit breaker open for order producer")]
    CircuitOpen,

    #[error("failed to encode order: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("kafka send error: {0}")]
    Send(#[from] KafkaError),
}

/// Anything the load generator can hand synthetic orders to.
#[async_trait]
pub trait OrderPublisher: Send + Sync {
    async fn publish(&self, order: &Order) -> Result<(), PublishError>;
}

#[derive(Clone, Debug)]
pub struct OrderProducerConfig {
    pub brokers: Vec<String>,
    pub topic: String,
    pub message_timeout: Duration,
    pub retry: RetryConfig,
    pub breaker: CircuitBreakerConfig,
}

impl OrderProducerConfig {
    pub fn new(brokers: Vec<String>, topic: impl Into<String>) -> Self {
        Self {
            brokers,
            topic: topic.into(),
            message_timeout: Duration::from_secs(5),
            retry: RetryConfig::publish(),
            breaker: CircuitBreakerConfig::default(),
        }
    }
}

/// Publishes orders keyed by `order_uid`, so every version of an order lands
/// on the same partition. Each publish is retried with backoff; the retried
/// publish as a whole runs behind a circuit breaker.
pub struct OrderProducer {
    producer: FutureProducer,
    topic: String,
    message_timeout: Duration,
    retry: RetryConfig,
    circuit_breaker: CircuitBreaker,
    observer: Arc<dyn PipelineObserver>,
}

impl OrderProducer {
    pub fn new(config: OrderProducerConfig, observer: Arc<dyn PipelineObserver>) -> Result<Self, KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", config.brokers.join(","))
            .set("message.timeout.ms", config.message_timeout.as_millis().to_string())
            .set("acks", "all")
            .create()?;

        let hook_observer = observer.clone();
        let circuit_breaker = CircuitBreaker::new("order_producer", config.breaker).with_transition_hook(Arc::new(
            move |from: CircuitState, to: CircuitState| hook_observer.circuit_transition(from.as_str(), to.as_str()),
        ));

        Ok(Self {
            producer,
            topic: config.topic,
            message_timeout: config.message_timeout,
            retry: config.retry,
            circuit_breaker,
            observer,
        })
    }

    async fn send(&self, key: &str, payload: &[u8]) -> Result<(), KafkaError> {
        let record = FutureRecord::to(&self.topic).key(key).payload(payload);
        self.producer
            .send(record, Timeout::After(self.message_timeout))
            .await
            .map(|_| ())
            .map_err(|(e, _)| e)
    }
}

#[async_trait]
impl OrderPublisher for OrderProducer {
    async fn publish(&self, order: &Order) -> Result<(), PublishError> {
        let key = order.id();
        let payload = order.to_json()?;

        let result = self
            .circuit_breaker
            .call(async {
                retry_with_backoff("publish_order", self.retry.clone(), |_| self.send(&key, &payload))
                    .await
                    .into_result()
            })
            .await;

        match result {
            Ok(()) => {
                self.observer.order_published(true);
                tracing::info!(topic = %self.topic, order_uid = %key, "Published order");
                Ok(())
            }
            Err(CircuitBreakerError::CircuitOpen) => {
                self.observer.order_published(false);
                tracing::error!(topic = %self.topic, order_uid = %key, "Circuit breaker open, broker unavailable");
                Err(PublishError::CircuitOpen)
            }
            Err(CircuitBreakerError::OperationFailed(e)) => {
                self.observer.order_published(false);
                let breaker = self.circuit_breaker.get_state().await;
                tracing::error!(
                    topic = %self.topic,
                    order_uid = %key,
                    breaker = breaker.as_str(),
                    error = %e,
                    "Failed to publish order"
                );
                Err(e.into())
            }
        }
    }
}
