// ============================================================================
// Durable Store - Order aggregate persistence
// ============================================================================
//
// `OrderStore` is the capability the orchestrator depends on. Postgres is the
// production backend; the in-memory store backs the orchestrator and
// consumer tests.
//
// Contract shared by all implementations:
// - `save` is all-or-nothing and idempotent per `order_uid` (upsert; items
//   replaced as a set)
// - `find` rejects malformed ids before touching storage and returns
//   `Ok(None)` for absent orders
// - `recent_*` order by `date_created` descending, default limit 10
//
// ============================================================================

mod postgres;
mod schema;
#[cfg(test)]
pub(crate) mod memory;

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::{StoreError, StoreResult};
use crate::models::{parse_order_id, Order};

pub use postgres::{PostgresOrderStore, PostgresStoreConfig};

pub const DEFAULT_RECENT_LIMIT: i64 = 10;

pub(crate) fn effective_limit(limit: i64) -> i64 {
    if limit <= 0 {
        DEFAULT_RECENT_LIMIT
    } else {
        limit
    }
}

pub(crate) fn validate_id(id: &str) -> StoreResult<Uuid> {
    parse_order_id(id).map_err(|source| StoreError::InvalidId {
        id: id.to_string(),
        source,
    })
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Upsert the whole aggregate in one transaction.
    async fn save(&self, order: &Order) -> StoreResult<()>;

    /// Load one aggregate; `Ok(None)` when the order does not exist.
    async fn find(&self, id: &str) -> StoreResult<Option<Order>>;

    /// Most recently created order ids, newest first.
    async fn recent_ids(&self, limit: i64) -> StoreResult<Vec<Uuid>>;

    /// `recent_ids` hydrated into full orders. Ids deleted between the two
    /// reads are skipped.
    async fn recent_orders(&self, limit: i64) -> StoreResult<Vec<Order>> {
        let ids = self.recent_ids(limit).await?;
        let mut orders = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(order) = self.find(&id.to_string()).await? {
                orders.push(order);
            }
        }
        Ok(orders)
    }

    async fn ping(&self) -> StoreResult<()>;
}
