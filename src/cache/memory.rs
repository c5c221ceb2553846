use async_trait::async_trait;
use std::collections::hash_map::Entry as MapEntry;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::{cache_key, decode_entry, OrderCache};
use crate::models::Order;

struct Entry {
    bytes: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-process cache for single-instance development runs. Stores the same
/// JSON bytes Redis would, so decoding behaves identically.
pub struct MemoryOrderCache {
    entries: Mutex<HashMap<String, Entry>>,
    ttl: Option<Duration>,
    prefix: String,
}

impl MemoryOrderCache {
    pub fn new(prefix: impl Into<String>, ttl: Option<Duration>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            prefix: prefix.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    /// Store `order` under `id`. Without `overwrite` a live entry wins.
    /// Expired entries are swept on every write so keys that are never read
    /// again do not accumulate.
    fn write(&self, id: &str, order: &Order, overwrite: bool) {
        let bytes = match order.to_json() {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(order_uid = %id, error = %e, "Failed to encode order for cache");
                return;
            }
        };

        let Ok(mut entries) = self.entries.lock() else {
            tracing::error!(order_uid = %id, "Memory cache lock poisoned");
            return;
        };

        let now = Instant::now();
        if self.ttl.is_some() {
            entries.retain(|_, entry| !entry.is_expired(now));
        }

        let entry = Entry {
            bytes,
            expires_at: self.ttl.map(|ttl| now + ttl),
        };
        match entries.entry(cache_key(&self.prefix, id)) {
            MapEntry::Occupied(mut slot) => {
                if overwrite {
                    slot.insert(entry);
                }
            }
            MapEntry::Vacant(slot) => {
                slot.insert(entry);
            }
        }
    }

    #[cfg(test)]
    fn insert_raw(&self, id: &str, bytes: &[u8]) {
        self.entries.lock().unwrap().insert(
            cache_key(&self.prefix, id),
            Entry { bytes: bytes.to_vec(), expires_at: None },
        );
    }
}

#[async_trait]
impl OrderCache for MemoryOrderCache {
    async fn get(&self, id: &str) -> Option<Order> {
        let key = cache_key(&self.prefix, id);
        let bytes = {
            let mut entries = self.entries.lock().ok()?;
            let now = Instant::now();
            let expired = entries.get(&key).map(|entry| entry.is_expired(now));
            match expired {
                Some(true) => {
                    entries.remove(&key);
                    None
                }
                Some(false) => entries.get(&key).map(|entry| entry.bytes.clone()),
                None => None,
            }
        };
        decode_entry(&key, &bytes?)
    }

    async fn set(&self, id: &str, order: &Order) {
        self.write(id, order, true);
    }

    async fn populate(&self, id: &str, order: &Order) {
        self.write(id, order, false);
    }

    async fn ping(&self) -> Result<(), String> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_set_then_get() {
        let cache = MemoryOrderCache::new("orders:", None);
        let order = fixtures::order(Uuid::new_v4(), 2, 1500);

        cache.set(&order.id(), &order).await;
        assert_eq!(cache.get(&order.id()).await, Some(order));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let cache = MemoryOrderCache::new("orders:", Some(Duration::from_millis(20)));
        let order = fixtures::order(Uuid::new_v4(), 1, 10);

        cache.set(&order.id(), &order).await;
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(cache.get(&order.id()).await.is_none());
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test]
    async fn test_populate_keeps_existing_entry() {
        let cache = MemoryOrderCache::new("orders:", None);
        let id = Uuid::new_v4();
        let newer = fixtures::order(id, 1, 2000);

        cache.set(&newer.id(), &newer).await;
        cache.populate(&newer.id(), &fixtures::order(id, 2, 1500)).await;
        assert_eq!(cache.get(&newer.id()).await, Some(newer));

        let other = fixtures::order(Uuid::new_v4(), 1, 10);
        cache.populate(&other.id(), &other).await;
        assert_eq!(cache.get(&other.id()).await, Some(other));
    }

    #[tokio::test]
    async fn test_expired_entries_swept_on_write() {
        let cache = MemoryOrderCache::new("orders:", Some(Duration::from_millis(20)));
        for amount in 0..5 {
            let order = fixtures::order(Uuid::new_v4(), 1, amount);
            cache.set(&order.id(), &order).await;
        }
        assert_eq!(cache.len(), 5);

        tokio::time::sleep(Duration::from_millis(40)).await;
        let fresh = fixtures::order(Uuid::new_v4(), 1, 99);
        cache.set(&fresh.id(), &fresh).await;

        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_populate_replaces_expired_entry() {
        let cache = MemoryOrderCache::new("orders:", Some(Duration::from_millis(20)));
        let id = Uuid::new_v4();
        cache.set(&id.to_string(), &fixtures::order(id, 1, 1)).await;
        tokio::time::sleep(Duration::from_millis(40)).await;

        let reloaded = fixtures::order(id, 1, 2);
        cache.populate(&id.to_string(), &reloaded).await;
        assert_eq!(cache.get(&id.to_string()).await, Some(reloaded));
    }

    #[tokio::test]
    async fn test_corrupt_entry_degrades_to_miss() {
        let cache = MemoryOrderCache::new("orders:", None);
        cache.insert_raw("abc", b"\x00\x01");
        assert!(cache.get("abc").await.is_none());
    }
}
