// ============================================================================
// Lookaside Cache
// ============================================================================
//
// Pure accelerator for point lookups by order id. Entries are the JSON
// encoding of `Order` stored under `<prefix><order_uid>`.
//
// Neither operation returns an error: `get` degrades to a miss and `set` is
// best-effort. Both log what they swallow. The durable store stays the
// source of truth.
//
// ============================================================================

mod memory;
mod redis_cache;

use async_trait::async_trait;

use crate::models::Order;

pub use memory::MemoryOrderCache;
pub use redis_cache::{RedisCacheConfig, RedisOrderCache};

pub const DEFAULT_KEY_PREFIX: &str = "orders:";

#[async_trait]
pub trait OrderCache: Send + Sync {
    async fn get(&self, id: &str) -> Option<Order>;

    /// Unconditional write, used after a store commit.
    async fn set(&self, id: &str, order: &Order);

    /// Write only if no entry exists, used by read-through and warm-up.
    async fn populate(&self, id: &str, order: &Order);

    /// Liveness check for health reporting.
    async fn ping(&self) -> Result<(), String>;
}

/// Always misses, always accepts. Used when caching is disabled.
pub struct NoopOrderCache;

#[async_trait]
impl OrderCache for NoopOrderCache {
    async fn get(&self, _id: &str) -> Option<Order> {
        None
    }

    async fn set(&self, _id: &str, _order: &Order) {}

    async fn populate(&self, _id: &str, _order: &Order) {}

    async fn ping(&self) -> Result<(), String> {
        Ok(())
    }
}

pub(crate) fn cache_key(prefix: &str, id: &str) -> String {
    let prefix = if prefix.is_empty() { DEFAULT_KEY_PREFIX } else { prefix };
    format!("{}{}", prefix, id)
}

/// Decode a cached entry; corrupt entries count as a miss.
pub(crate) fn decode_entry(key: &str, bytes: &[u8]) -> Option<Order> {
    match Order::from_json(bytes) {
        Ok(order) => Some(order),
        Err(e) => {
            tracing::error!(key = %key, error = %e, "Corrupt cache entry, treating as miss");
            None
        }
    }
}
