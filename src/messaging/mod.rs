mod consumer;
mod generator;
mod producer;
pub(crate) mod stream;

pub use consumer::OrderConsumer;
pub use generator::run_generator;
pub use producer::{OrderProducer, OrderProducerConfig, OrderPublisher, PublishError};
pub use stream::{KafkaMessageStream, KafkaStreamConfig, MessageStream};
