//! Order lifecycle: reservation, building, status transitions and queries.

mod builder;
mod inventory;
mod policy;
mod service;
mod state;

pub use builder::{LineItem, build_order};
pub use inventory::{Snapshots, reserve, restock, validate_line_items};
pub use policy::{DeletePolicy, NoPayments, OrderPolicy, ParseDeletePolicyError, PaymentLedger};
pub use service::OrderService;
pub use state::{check_deletable, check_transition, transition};

use common::{ErrorKind, OrderId, OrderStatus, ProductId};
use store::StoreError;
use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The order has no line items.
    #[error("order has no items")]
    NoItems,

    /// A line item asks for less than one unit.
    #[error("invalid quantity {quantity} for product {product_id} (must be at least 1)")]
    InvalidQuantity { product_id: ProductId, quantity: i32 },

    /// The same product appears on more than one line.
    #[error("product {product_id} appears more than once")]
    DuplicateLineItem { product_id: ProductId },

    /// A referenced product does not exist.
    #[error("product {product_id} does not exist")]
    MissingProduct { product_id: ProductId },

    /// A line asks for more than is on hand.
    #[error("insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: i32,
        available: i32,
    },

    /// Putting stock back would exceed the largest storable quantity.
    #[error("restocking {quantity} units of product {product_id} overflows its stock of {on_hand}")]
    StockOverflow {
        product_id: ProductId,
        quantity: i32,
        on_hand: i32,
    },

    /// The order total does not fit in the amount type.
    #[error("order amount overflows")]
    AmountOverflow,

    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    /// The order is finished; no further change is allowed.
    #[error("order {0} is already finished")]
    OrderAlreadyFinished(OrderId),

    /// The order is cancelled; no further change is allowed.
    #[error("order {0} is already cancelled")]
    OrderAlreadyCancelled(OrderId),

    /// Another request changed the status between read and write.
    #[error("order {order_id} changed status concurrently (expected {expected})")]
    ConcurrentStatusChange {
        order_id: OrderId,
        expected: OrderStatus,
    },

    /// The delete policy forbids deleting an order with a completed payment.
    #[error("order {0} has completed payments")]
    OrderHasPayments(OrderId),

    /// The payment ledger could not be consulted.
    #[error("payment ledger: {0}")]
    PaymentLedger(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl OrderError {
    /// Maps this error onto the shared taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderError::NoItems
            | OrderError::InvalidQuantity { .. }
            | OrderError::MissingProduct { .. }
            | OrderError::AmountOverflow => ErrorKind::InvalidArgument,
            OrderError::DuplicateLineItem { .. }
            | OrderError::OrderAlreadyFinished(_)
            | OrderError::OrderAlreadyCancelled(_)
            | OrderError::ConcurrentStatusChange { .. }
            | OrderError::OrderHasPayments(_)
            | OrderError::StockOverflow { .. } => ErrorKind::Conflict,
            OrderError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            OrderError::OrderNotFound(_) => ErrorKind::NotFound,
            OrderError::PaymentLedger(_) => ErrorKind::Internal,
            OrderError::Store(e) => e.kind(),
        }
    }
}
