use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;

use super::{cache_key, decode_entry, OrderCache};
use crate::models::Order;

/// Minimum pause between connection attempts while Redis is unreachable.
const RECONNECT_INTERVAL: Duration = Duration::from_secs(5);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone, Debug)]
pub struct RedisCacheConfig {
    /// `host:port`
    pub addr: String,
    /// Must already be URL-encoded if it contains reserved characters.
    pub password: Option<String>,
    pub db: i64,
    /// `None` stores entries without expiry.
    pub ttl: Option<Duration>,
    pub key_prefix: String,
}

impl RedisCacheConfig {
    fn url(&self) -> String {
        match self.password.as_deref().filter(|p| !p.is_empty()) {
            Some(password) => format!("redis://:{}@{}/{}", password, self.addr, self.db),
            None => format!("redis://{}/{}", self.addr, self.db),
        }
    }
}

/// Redis-backed cache. The connection is established lazily: if Redis is
/// down at startup every call is a miss until a later attempt succeeds. Once
/// connected, `ConnectionManager` reconnects on its own after a Redis
/// restart; calls made while it is down fail and are swallowed here.
pub struct RedisOrderCache {
    client: redis::Client,
    conn: OnceCell<ConnectionManager>,
    last_attempt: Mutex<Option<Instant>>,
    addr: String,
    ttl_secs: u64,
    prefix: String,
}

impl RedisOrderCache {
    /// Fails only on an invalid URL. An unreachable server is logged and
    /// retried on later calls.
    pub async fn connect(config: &RedisCacheConfig) -> redis::RedisResult<Self> {
        let client = redis::Client::open(config.url())?;

        let cache = Self {
            client,
            conn: OnceCell::new(),
            last_attempt: Mutex::new(None),
            addr: config.addr.clone(),
            ttl_secs: config.ttl.map(|ttl| ttl.as_secs()).unwrap_or(0),
            prefix: config.key_prefix.clone(),
        };

        match cache.ping().await {
            Ok(()) => tracing::info!(addr = %config.addr, db = config.db, "Redis connected"),
            Err(e) => tracing::warn!(addr = %config.addr, error = %e, "Redis unavailable, serving from store until it is reachable"),
        }
        Ok(cache)
    }

    fn key(&self, id: &str) -> String {
        cache_key(&self.prefix, id)
    }

    async fn connection(&self) -> Option<ConnectionManager> {
        if let Some(conn) = self.conn.get() {
            return Some(conn.clone());
        }

        {
            let mut last = self.last_attempt.lock().ok()?;
            if last.is_some_and(|at| at.elapsed() < RECONNECT_INTERVAL) {
                return None;
            }
            *last = Some(Instant::now());
        }

        let result = self
            .conn
            .get_or_try_init(|| async {
                match tokio::time::timeout(CONNECT_TIMEOUT, ConnectionManager::new(self.client.clone())).await {
                    Ok(result) => result,
                    Err(_) => Err(redis::RedisError::from((redis::ErrorKind::IoError, "connect timed out"))),
                }
            })
            .await;

        match result {
            Ok(conn) => {
                tracing::info!(addr = %self.addr, "Redis connection established");
                Some(conn.clone())
            }
            Err(e) => {
                tracing::warn!(addr = %self.addr, error = %e, "Redis connect failed");
                None
            }
        }
    }

    fn encode(&self, id: &str, order: &Order) -> Option<Vec<u8>> {
        match order.to_json() {
            Ok(payload) => Some(payload),
            Err(e) => {
                tracing::error!(order_uid = %id, error = %e, "Failed to encode order for cache");
                None
            }
        }
    }
}

#[async_trait]
impl OrderCache for RedisOrderCache {
    async fn get(&self, id: &str) -> Option<Order> {
        let key = self.key(id);
        let mut conn = self.connection().await?;

        let bytes = match conn.get::<_, Option<Vec<u8>>>(&key).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(order_uid = %id, error = %e, "Redis GET failed, treating as miss");
                return None;
            }
        };

        match bytes {
            Some(bytes) => decode_entry(&key, &bytes),
            None => {
                tracing::debug!(order_uid = %id, "Cache miss");
                None
            }
        }
    }

    async fn set(&self, id: &str, order: &Order) {
        let Some(payload) = self.encode(id, order) else {
            return;
        };
        let Some(mut conn) = self.connection().await else {
            return;
        };

        let key = self.key(id);
        let result: redis::RedisResult<()> = if self.ttl_secs > 0 {
            conn.set_ex(&key, payload, self.ttl_secs).await
        } else {
            conn.set(&key, payload).await
        };

        match result {
            Ok(()) => tracing::debug!(order_uid = %id, "Cache set"),
            Err(e) => tracing::error!(order_uid = %id, error = %e, "Redis SET failed"),
        }
    }

    async fn populate(&self, id: &str, order: &Order) {
        let Some(payload) = self.encode(id, order) else {
            return;
        };
        let Some(mut conn) = self.connection().await else {
            return;
        };

        let mut cmd = redis::cmd("SET");
        cmd.arg(self.key(id)).arg(payload).arg("NX");
        if self.ttl_secs > 0 {
            cmd.arg("EX").arg(self.ttl_secs);
        }

        // Reply is OK when written, nil when the key already existed
        match cmd.query_async::<Option<String>>(&mut conn).await {
            Ok(Some(_)) => tracing::debug!(order_uid = %id, "Cache populated"),
            Ok(None) => tracing::debug!(order_uid = %id, "Cache already holds a newer entry"),
            Err(e) => tracing::error!(order_uid = %id, error = %e, "Redis SET NX failed"),
        }
    }

    async fn ping(&self) -> Result<(), String> {
        let Some(mut conn) = self.connection().await else {
            return Err(format!("redis at {} not connected", self.addr));
        };
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}
