use clap::{Parser, ValueEnum};
use std::time::Duration;

use crate::cache::RedisCacheConfig;
use crate::messaging::{KafkaStreamConfig, OrderProducerConfig};
use crate::storage::PostgresStoreConfig;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum CacheBackend {
    /// Shared Redis instance
    Redis,
    /// Process-local map, single instance only
    Memory,
    /// No caching; every read hits the store
    None,
}

/// Order ingestion and serving pipeline.
#[derive(Parser, Clone, Debug)]
#[command(name = "order_pipeline", version, about)]
pub struct Config {
    /// HTTP listen address
    #[arg(long, env = "HTTP_ADDR", default_value = "0.0.0.0:8081")]
    pub http_addr: String,

    #[arg(
        long,
        env = "PG_DSN",
        default_value = "postgres://wb_user:wb@localhost:5432/wb_orders?sslmode=disable"
    )]
    pub pg_dsn: String,

    #[arg(long, env = "PG_MAX_CONNECTIONS", default_value_t = 10)]
    pub pg_max_connections: u32,

    #[arg(long, env = "PG_ACQUIRE_TIMEOUT_MS", default_value_t = 5000)]
    pub pg_acquire_timeout_ms: u64,

    /// Comma separated broker list
    #[arg(long, env = "KAFKA_BROKERS", default_value = "localhost:29092", value_delimiter = ',')]
    pub kafka_brokers: Vec<String>,

    #[arg(long, env = "KAFKA_TOPIC", default_value = "orders-topic")]
    pub kafka_topic: String,

    #[arg(long, env = "KAFKA_GROUP_ID", default_value = "orders-group")]
    pub kafka_group_id: String,

    /// Pause before re-reading a message the store rejected
    #[arg(long, env = "PERSIST_RETRY_BACKOFF_MS", default_value_t = 1000)]
    pub persist_retry_backoff_ms: u64,

    #[arg(long, value_enum, env = "CACHE_BACKEND", default_value_t = CacheBackend::Redis)]
    pub cache_backend: CacheBackend,

    #[arg(long, env = "REDIS_ADDR", default_value = "localhost:6379")]
    pub redis_addr: String,

    /// URL-encoded if it contains reserved characters
    #[arg(long, env = "REDIS_PASSWORD", hide_env_values = true)]
    pub redis_password: Option<String>,

    #[arg(long, env = "REDIS_DB", default_value_t = 0)]
    pub redis_db: i64,

    /// 0 stores entries without expiry
    #[arg(long, env = "REDIS_TTL_SECONDS", default_value_t = 0)]
    pub redis_ttl_seconds: u64,

    #[arg(long, env = "REDIS_KEY_PREFIX", default_value = crate::cache::DEFAULT_KEY_PREFIX)]
    pub redis_key_prefix: String,

    /// Recent orders loaded into the cache at startup
    #[arg(long, env = "WARM_CACHE_LIMIT", default_value_t = 10)]
    pub warm_cache_limit: i64,

    /// Publish synthetic orders to the topic
    #[arg(long, env = "PRODUCER_ENABLED")]
    pub producer_enabled: bool,

    #[arg(long, env = "PRODUCER_INTERVAL_MS", default_value_t = 1000)]
    pub producer_interval_ms: u64,
}

impl Config {
    pub fn brokers(&self) -> Vec<String> {
        self.kafka_brokers
            .iter()
            .map(|b| b.trim().to_string())
            .filter(|b| !b.is_empty())
            .collect()
    }

    pub fn store(&self) -> PostgresStoreConfig {
        PostgresStoreConfig {
            dsn: self.pg_dsn.clone(),
            max_connections: self.pg_max_connections,
            acquire_timeout: Duration::from_millis(self.pg_acquire_timeout_ms),
        }
    }

    pub fn redis(&self) -> RedisCacheConfig {
        RedisCacheConfig {
            addr: self.redis_addr.clone(),
            password: self.redis_password.clone().filter(|p| !p.is_empty()),
            db: self.redis_db,
            ttl: (self.redis_ttl_seconds > 0).then(|| Duration::from_secs(self.redis_ttl_seconds)),
            key_prefix: self.redis_key_prefix.clone(),
        }
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        self.redis().ttl
    }

    pub fn stream(&self) -> KafkaStreamConfig {
        KafkaStreamConfig {
            brokers: self.brokers(),
            topic: self.kafka_topic.clone(),
            group_id: self.kafka_group_id.clone(),
        }
    }

    pub fn producer(&self) -> OrderProducerConfig {
        OrderProducerConfig::new(self.brokers(), self.kafka_topic.clone())
    }

    pub fn persist_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.persist_retry_backoff_ms)
    }

    pub fn producer_interval(&self) -> Duration {
        Duration::from_millis(self.producer_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_debug_assert() {
        Config::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let config = Config::try_parse_from(["order_pipeline"]).unwrap();

        assert_eq!(config.http_addr, "0.0.0.0:8081");
        assert_eq!(config.brokers(), vec!["localhost:29092"]);
        assert_eq!(config.kafka_topic, "orders-topic");
        assert_eq!(config.kafka_group_id, "orders-group");
        assert_eq!(config.cache_backend, CacheBackend::Redis);
        assert_eq!(config.redis_key_prefix, "orders:");
        assert_eq!(config.warm_cache_limit, 10);
        assert_eq!(config.persist_retry_backoff(), Duration::from_secs(1));
        assert!(!config.producer_enabled);
        assert_eq!(config.cache_ttl(), None);
        assert_eq!(config.redis().password, None);
    }

    #[test]
    fn test_broker_list_is_split_and_trimmed() {
        let config = Config::try_parse_from([
            "order_pipeline",
            "--kafka-brokers",
            " kafka-1:9092, kafka-2:9092 ,,kafka-3:9092",
        ])
        .unwrap();

        assert_eq!(config.brokers(), vec!["kafka-1:9092", "kafka-2:9092", "kafka-3:9092"]);
        assert_eq!(config.stream().brokers.len(), 3);
    }

    #[test]
    fn test_explicit_values() {
        let config = Config::try_parse_from([
            "order_pipeline",
            "--cache-backend",
            "memory",
            "--redis-ttl-seconds",
            "30",
            "--pg-acquire-timeout-ms",
            "250",
            "--producer-enabled",
        ])
        .unwrap();

        assert_eq!(config.cache_backend, CacheBackend::Memory);
        assert_eq!(config.cache_ttl(), Some(Duration::from_secs(30)));
        assert_eq!(config.store().acquire_timeout, Duration::from_millis(250));
        assert!(config.producer_enabled);
    }

    #[test]
    fn test_unknown_cache_backend_rejected() {
        assert!(Config::try_parse_from(["order_pipeline", "--cache-backend", "memcached"]).is_err());
    }
}
