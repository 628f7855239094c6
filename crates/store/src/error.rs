use common::{ErrorKind, ProductId};
use thiserror::Error;

/// Errors that can occur when interacting with a store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The targeted row does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A row with the same key already exists.
    #[error("duplicate {entity}: {id}")]
    Duplicate { entity: &'static str, id: String },

    /// A write would have driven on-hand stock below zero.
    #[error("negative quantity {quantity} for product {product_id}")]
    NegativeQuantity { product_id: ProductId, quantity: i32 },

    /// A stored row could not be converted into a record.
    #[error("corrupt {table} row: {reason}")]
    CorruptRow { table: &'static str, reason: String },

    /// A write was rejected by an injected fault (in-memory store only).
    #[error("{op}: injected failure")]
    Injected { op: &'static str },

    /// A database error occurred, annotated with the failing operation.
    #[error("{op}: {source}")]
    Database {
        op: &'static str,
        #[source]
        source: sqlx::Error,
    },

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// Maps this error onto the shared taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound { .. } => ErrorKind::NotFound,
            StoreError::Duplicate { .. } => ErrorKind::Conflict,
            StoreError::NegativeQuantity { .. } => ErrorKind::InsufficientStock,
            StoreError::CorruptRow { .. }
            | StoreError::Injected { .. }
            | StoreError::Database { .. }
            | StoreError::Migration(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn duplicate(entity: &'static str, id: impl ToString) -> Self {
        StoreError::Duplicate {
            entity,
            id: id.to_string(),
        }
    }
}

/// Returns a closure wrapping a sqlx error with the failing operation name.
pub(crate) fn db(op: &'static str) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |source| StoreError::Database { op, source }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
