//! Order core for the ecommerce backend.
//!
//! This crate provides:
//! - Inventory reservation against the catalog store
//! - Order building with price/name/image snapshots
//! - The order status state machine with compare-and-swap persistence
//! - `OrderService`, the facade the HTTP layer calls, with configurable policies

pub mod order;

pub use order::{
    DeletePolicy, LineItem, NoPayments, OrderError, OrderPolicy, OrderService,
    ParseDeletePolicyError, PaymentLedger, Snapshots, build_order, check_deletable,
    check_transition, reserve, restock, transition, validate_line_items,
};
