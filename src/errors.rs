// ============================================================================
// Error Taxonomy
// ============================================================================
//
// - Validation: malformed identifier, rejected before any I/O
// - Store:      durable store unreachable or a write/read failed
//
// Not-found is not an error: lookups return `Ok(None)`. Cache failures never
// surface here; the cache degrades to a miss and logs.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid order id {id:?}: {source}")]
    InvalidId {
        id: String,
        #[source]
        source: uuid::Error,
    },

    #[error("order {order_uid} has no {relation} row")]
    MissingRow {
        order_uid: uuid::Uuid,
        relation: &'static str,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub fn is_validation(&self) -> bool {
        matches!(self, StoreError::InvalidId { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("invalid order id {id:?}: {reason}")]
    Validation { id: String, reason: String },

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidId { id, source } => ServiceError::Validation {
                id,
                reason: source.to_string(),
            },
            other => ServiceError::Store(other),
        }
    }
}
