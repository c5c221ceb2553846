use std::sync::Arc;
use std::time::Instant;

use crate::cache::OrderCache;
use crate::errors::ServiceError;
use crate::metrics::{Operation, PipelineObserver, RequestOutcome};
use crate::models::{parse_order_id, Order};
use crate::storage::{OrderStore, DEFAULT_RECENT_LIMIT};

// ============================================================================
// Cache-Aside Orchestrator
// ============================================================================
//
// Read:  validate id → cache (hit returns) → store → populate cache on found
// Write: store → cache, and the cache only after the store commit succeeded
//
// Reads and warm-up only fill absent entries; writes overwrite. A slow
// reader can therefore never replace a version written after its store read.
//
// Not-found results are never cached. Cache calls are infallible by contract
// so they can never fail a read or a write. The service holds no state of its
// own; every request is one-shot.
//
// ============================================================================

pub struct OrderService {
    store: Arc<dyn OrderStore>,
    cache: Arc<dyn OrderCache>,
    observer: Arc<dyn PipelineObserver>,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        cache: Arc<dyn OrderCache>,
        observer: Arc<dyn PipelineObserver>,
    ) -> Self {
        Self { store, cache, observer }
    }

    pub async fn get(&self, id: &str) -> Result<Option<Order>, ServiceError> {
        let started = self.begin(Operation::Get);
        let result = self.get_inner(id).await;
        let outcome = match &result {
            Ok(Some(_)) => RequestOutcome::Ok,
            Ok(None) => RequestOutcome::NotFound,
            Err(ServiceError::Validation { .. }) => RequestOutcome::Invalid,
            Err(_) => RequestOutcome::Error,
        };
        self.finish(Operation::Get, outcome, started);
        result
    }

    async fn get_inner(&self, raw_id: &str) -> Result<Option<Order>, ServiceError> {
        // Cache keys and store lookups always use the canonical hyphenated
        // lowercase form, whatever spelling the caller used.
        let id = match parse_order_id(raw_id) {
            Ok(uid) => uid.to_string(),
            Err(e) => {
                tracing::warn!(order_uid = %raw_id, error = %e, "Rejected malformed order id");
                return Err(ServiceError::Validation {
                    id: raw_id.to_string(),
                    reason: e.to_string(),
                });
            }
        };
        let id = id.as_str();

        if let Some(order) = self.cache.get(id).await {
            self.observer.cache_lookup(true);
            tracing::debug!(order_uid = %id, "Served from cache");
            return Ok(Some(order));
        }
        self.observer.cache_lookup(false);

        let order = match self.store.find(id).await {
            Ok(order) => order,
            Err(e) if e.is_validation() => {
                tracing::warn!(order_uid = %id, error = %e, "Store rejected order id");
                return Err(e.into());
            }
            Err(e) => {
                tracing::error!(order_uid = %id, error = %e, "Store lookup failed");
                return Err(e.into());
            }
        };

        match order {
            Some(order) => {
                self.cache.populate(id, &order).await;
                tracing::debug!(order_uid = %id, "Cached after store read");
                Ok(Some(order))
            }
            None => {
                tracing::info!(order_uid = %id, "Order not found");
                Ok(None)
            }
        }
    }

    pub async fn set(&self, order: &Order) -> Result<(), ServiceError> {
        let started = self.begin(Operation::Set);
        let id = order.id();

        let result = self.store.save(order).await;
        self.observer.persisted(result.is_ok());

        let outcome = match result {
            Ok(()) => {
                self.cache.set(&id, order).await;
                tracing::info!(order_uid = %id, items = order.items.len(), "Order saved");
                RequestOutcome::Ok
            }
            Err(ref e) => {
                tracing::error!(order_uid = %id, error = %e, "Store save failed, cache untouched");
                RequestOutcome::Error
            }
        };
        self.finish(Operation::Set, outcome, started);
        result.map_err(ServiceError::from)
    }

    /// Load the `limit` most recent orders into the cache. Returns how many
    /// were cached.
    pub async fn warm_cache(&self, limit: i64) -> Result<usize, ServiceError> {
        let started = self.begin(Operation::WarmCache);

        let orders = match self.store.recent_orders(limit).await {
            Ok(orders) => orders,
            Err(e) => {
                tracing::error!(error = %e, "Cache warm-up failed");
                self.finish(Operation::WarmCache, RequestOutcome::Error, started);
                return Err(e.into());
            }
        };

        // Only fills gaps: a write that committed while the snapshot was
        // loading has already put a newer version in the cache.
        for order in &orders {
            self.cache.populate(&order.id(), order).await;
        }

        tracing::info!(count = orders.len(), "Cache warmed");
        self.finish(Operation::WarmCache, RequestOutcome::Ok, started);
        Ok(orders.len())
    }

    pub async fn recent_ids(&self, limit: i64) -> Result<Vec<String>, ServiceError> {
        let started = self.begin(Operation::RecentIds);
        let limit = if limit <= 0 { DEFAULT_RECENT_LIMIT } else { limit };

        match self.store.recent_ids(limit).await {
            Ok(ids) => {
                tracing::debug!(count = ids.len(), "Recent ids");
                self.finish(Operation::RecentIds, RequestOutcome::Ok, started);
                Ok(ids.into_iter().map(|id| id.to_string()).collect())
            }
            Err(e) => {
                tracing::error!(error = %e, "Recent ids lookup failed");
                self.finish(Operation::RecentIds, RequestOutcome::Error, started);
                Err(e.into())
            }
        }
    }

    /// Component checks for the health endpoint.
    pub async fn check_components(&self) -> (Result<(), String>, Result<(), String>) {
        let store = self.store.ping().await.map_err(|e| e.to_string());
        let cache = self.cache.ping().await;
        (store, cache)
    }

    fn begin(&self, operation: Operation) -> Instant {
        self.observer.request_started(operation);
        Instant::now()
    }

    fn finish(&self, operation: Operation, outcome: RequestOutcome, started: Instant) {
        self.observer.request_finished(operation, outcome, started.elapsed());
    }
}
