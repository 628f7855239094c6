//! Order status state machine.
//!
//! ```text
//! Created ──┬──► Finished
//!           │
//!           └──► Cancelled
//! ```
//!
//! `Finished` and `Cancelled` are terminal. Transitions are persisted with a
//! compare-and-swap on the status observed when the order was read.

use chrono::{DateTime, Utc};
use common::OrderStatus;
use store::{Order, OrderStore};

use super::OrderError;

/// Decides whether moving `order` to `target` needs a write.
///
/// Returns `Ok(false)` when the order already has the target status and
/// `Ok(true)` for a legal transition.
pub fn check_transition(order: &Order, target: OrderStatus) -> Result<bool, OrderError> {
    if order.status == target {
        return Ok(false);
    }
    match order.status {
        OrderStatus::Finished => Err(OrderError::OrderAlreadyFinished(order.id)),
        OrderStatus::Cancelled => Err(OrderError::OrderAlreadyCancelled(order.id)),
        OrderStatus::Created => Ok(true),
    }
}

/// Moves `order` to `target` and returns the resulting order.
///
/// A zero-row conditional write means another request moved the order
/// first and fails with `ConcurrentStatusChange`.
pub async fn transition<S: OrderStore>(
    store: &mut S,
    order: Order,
    target: OrderStatus,
    now: DateTime<Utc>,
) -> Result<Order, OrderError> {
    if !check_transition(&order, target)? {
        return Ok(order);
    }

    let swapped = store
        .update_status(order.id, order.status, target, now)
        .await?;
    if !swapped {
        return Err(OrderError::ConcurrentStatusChange {
            order_id: order.id,
            expected: order.status,
        });
    }

    Ok(Order {
        status: target,
        date_updated: now,
        ..order
    })
}

/// Orders may be deleted unless they are finished.
pub fn check_deletable(order: &Order) -> Result<(), OrderError> {
    if order.status == OrderStatus::Finished {
        return Err(OrderError::OrderAlreadyFinished(order.id));
    }
    Ok(())
}
