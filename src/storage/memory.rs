use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use super::{effective_limit, validate_id, OrderStore};
use crate::errors::{StoreError, StoreResult};
use crate::models::Order;

/// Test double with the same upsert semantics as Postgres: one entry per
/// `order_uid`, whole aggregate replaced on save.
#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: Mutex<HashMap<Uuid, Order>>,
    fail_saves: AtomicBool,
    fail_reads: AtomicBool,
    saves: AtomicUsize,
    finds: AtomicUsize,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// `find` calls that got past id validation.
    pub fn find_count(&self) -> usize {
        self.finds.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> HashMap<Uuid, Order> {
        self.orders.lock().unwrap().clone()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn save(&self, order: &Order) -> StoreResult<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        self.orders.lock().unwrap().insert(order.order_uid, order.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn find(&self, id: &str) -> StoreResult<Option<Order>> {
        let order_uid = validate_id(id)?;
        self.finds.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(self.orders.lock().unwrap().get(&order_uid).cloned())
    }

    async fn recent_ids(&self, limit: i64) -> StoreResult<Vec<Uuid>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        let orders = self.orders.lock().unwrap();
        let mut entries: Vec<_> = orders.values().map(|o| (o.date_created, o.order_uid)).collect();
        entries.sort_by(|a, b| b.cmp(a));
        Ok(entries
            .into_iter()
            .take(effective_limit(limit) as usize)
            .map(|(_, id)| id)
            .collect())
    }

    async fn ping(&self) -> StoreResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures;
    use chrono::Duration;

    #[tokio::test]
    async fn test_update_replaces_items_and_amount() {
        let store = InMemoryOrderStore::new();
        let id = Uuid::new_v4();

        store.save(&fixtures::order(id, 2, 1500)).await.unwrap();
        let found = store.find(&id.to_string()).await.unwrap().unwrap();
        assert_eq!(found.items.len(), 2);
        assert_eq!(found.payment.amount, 1500);

        store.save(&fixtures::order(id, 1, 2000)).await.unwrap();
        let found = store.find(&id.to_string()).await.unwrap().unwrap();
        assert_eq!(found.items.len(), 1);
        assert_eq!(found.payment.amount, 2000);
        assert_eq!(store.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_recent_orders_newest_first_with_default_limit() {
        let store = InMemoryOrderStore::new();
        let base = fixtures::order(Uuid::nil(), 0, 1).date_created;

        let mut ids = Vec::new();
        for i in 0..12 {
            let mut order = fixtures::order(Uuid::new_v4(), 1, i);
            order.date_created = base + Duration::minutes(i);
            ids.push(order.order_uid);
            store.save(&order).await.unwrap();
        }

        let recent = store.recent_orders(0).await.unwrap();
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].order_uid, ids[11]);
        assert_eq!(recent[9].order_uid, ids[2]);
    }

    #[tokio::test]
    async fn test_invalid_id_never_reaches_storage() {
        let store = InMemoryOrderStore::new();
        let err = store.find("xyz").await.unwrap_err();

        assert!(err.is_validation());
        assert_eq!(store.find_count(), 0);
    }
}
