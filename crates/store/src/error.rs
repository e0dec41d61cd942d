use common::{OrderId, VendorId};
use thiserror::Error;

/// Errors that can occur when reading or writing the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A shipment record was changed by someone else since it was read.
    #[error(
        "Concurrency conflict for shipment {order_id}/{vendor_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        order_id: OrderId,
        vendor_id: VendorId,
        expected: i64,
        actual: i64,
    },

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("Order already exists: {0}")]
    DuplicateOrder(OrderId),

    /// A persisted value could not be mapped back onto the domain model.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
