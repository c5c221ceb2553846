use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::api::AppState;
use crate::cache::{MemoryOrderCache, NoopOrderCache, OrderCache, RedisOrderCache};
use crate::config::{CacheBackend, Config};
use crate::messaging::{run_generator, KafkaMessageStream, MessageStream, OrderConsumer, OrderProducer, OrderPublisher};
use crate::metrics::Metrics;
use crate::service::OrderService;
use crate::storage::{OrderStore, PostgresOrderStore};
use crate::utils::{retry_with_backoff, RetryConfig, Shutdown};

// ============================================================================
// Coordinator - wires and supervises the pipeline
// ============================================================================
//
// Construction order:
//   store → cache → service → consumer (→ producer)
//
// Supervised tasks, all sharing one shutdown signal:
//   ├── consumer loop
//   ├── cache warm-up (one shot)
//   └── load generator (optional)
//
// `stop()` fires the signal and waits for every task before closing the pool.
//
// ============================================================================

pub struct Coordinator {
    config: Config,
    metrics: Arc<Metrics>,
    service: Arc<OrderService>,
    consumer: Arc<OrderConsumer>,
    postgres: Option<Arc<PostgresOrderStore>>,
    shutdown: Shutdown,
    tasks: Vec<JoinHandle<()>>,
}

impl Coordinator {
    /// Connect to Postgres (with retries) and the configured cache backend.
    pub async fn connect(config: Config) -> anyhow::Result<Self> {
        let metrics = Arc::new(Metrics::new()?);

        let store_config = config.store();
        let postgres = retry_with_backoff("postgres_connect", RetryConfig::startup(), |_| {
            PostgresOrderStore::connect(&store_config)
        })
        .await
        .into_result()
        .context("connecting to Postgres")?;
        let postgres = Arc::new(postgres);

        let cache = build_cache(&config).await;

        let mut coordinator = Self::assemble(config, postgres.clone(), cache, metrics);
        coordinator.postgres = Some(postgres);
        Ok(coordinator)
    }

    fn assemble(
        config: Config,
        store: Arc<dyn OrderStore>,
        cache: Arc<dyn OrderCache>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let service = Arc::new(OrderService::new(store, cache, metrics.clone()));
        let consumer = Arc::new(OrderConsumer::new(
            service.clone(),
            metrics.clone(),
            config.persist_retry_backoff(),
        ));

        Self {
            config,
            metrics,
            service,
            consumer,
            postgres: None,
            shutdown: Shutdown::new(),
            tasks: Vec::new(),
        }
    }

    /// Subscribe to the topic and spawn the supervised tasks.
    pub fn start(&mut self) -> anyhow::Result<()> {
        let stream = KafkaMessageStream::subscribe(&self.config.stream()).context("subscribing to order stream")?;

        let publisher: Option<Arc<dyn OrderPublisher>> = if self.config.producer_enabled {
            let producer = OrderProducer::new(self.config.producer(), self.metrics.clone())
                .context("creating order producer")?;
            Some(Arc::new(producer))
        } else {
            None
        };

        self.start_with(stream, publisher);
        Ok(())
    }

    fn start_with<S>(&mut self, stream: S, publisher: Option<Arc<dyn OrderPublisher>>)
    where
        S: MessageStream + 'static,
    {
        tracing::info!("Starting supervised tasks");

        let consumer = self.consumer.clone();
        let shutdown = self.shutdown.clone();
        self.tasks.push(tokio::spawn(async move {
            if let Err(e) = consumer.run(stream, shutdown).await {
                tracing::error!(error = %e, "Consumer terminated");
            }
        }));

        let service = self.service.clone();
        let shutdown = self.shutdown.clone();
        let limit = self.config.warm_cache_limit;
        self.tasks.push(tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => tracing::info!("Cache warm-up cancelled"),
                result = service.warm_cache(limit) => {
                    if let Err(e) = result {
                        tracing::warn!(error = %e, "Serving without a warm cache");
                    }
                }
            }
        }));

        if let Some(publisher) = publisher {
            let interval = self.config.producer_interval();
            self.tasks.push(tokio::spawn(run_generator(publisher, interval, self.shutdown.clone())));
        }

        tracing::info!(tasks = self.tasks.len(), "All supervised tasks started");
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            service: self.service.clone(),
            registry: self.metrics.registry().clone(),
        }
    }

    /// Signal every task and wait for them to finish.
    pub async fn stop(mut self) {
        tracing::info!("Stopping coordinator");
        self.shutdown.trigger();

        let results = futures_util::future::join_all(self.tasks.drain(..)).await;
        for result in results {
            if let Err(e) = result {
                tracing::error!(error = %e, "Supervised task panicked");
            }
        }

        if let Some(postgres) = &self.postgres {
            postgres.close().await;
        }
        tracing::info!("Coordinator stopped");
    }
}

async fn build_cache(config: &Config) -> Arc<dyn OrderCache> {
    match config.cache_backend {
        CacheBackend::Redis => {
            let redis_config = config.redis();
            // Unreachable Redis still yields a cache that connects later;
            // only an unusable URL disables caching.
            match RedisOrderCache::connect(&redis_config).await {
                Ok(cache) => Arc::new(cache),
                Err(e) => {
                    tracing::warn!(addr = %redis_config.addr, error = %e, "Invalid Redis configuration, caching disabled");
                    Arc::new(NoopOrderCache)
                }
            }
        }
        CacheBackend::Memory => {
            tracing::info!("Using in-process cache");
            Arc::new(MemoryOrderCache::new(config.redis_key_prefix.clone(), config.cache_ttl()))
        }
        CacheBackend::None => {
            tracing::info!("Caching disabled");
            Arc::new(NoopOrderCache)
        }
    }
}
