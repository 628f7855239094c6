//! Pure assembly of an order and its item snapshots.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, OrderItemId, OrderStatus, ProductId, UserId};
use serde::{Deserialize, Serialize};
use store::{Order, OrderItem, OrderWithItems};

use super::{OrderError, inventory::Snapshots};

/// One requested line of a new order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: ProductId,
    pub quantity: i32,
}

impl LineItem {
    pub fn new(product_id: ProductId, quantity: i32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// Builds a `Created` order for `user_id` from reserved line items.
///
/// Name, image and price are copied from `snapshots`. The order and every
/// item share the `now` timestamp. The amount is the exact integer sum of
/// `price * quantity`; overflow fails with `AmountOverflow`.
pub fn build_order(
    user_id: UserId,
    items: &[LineItem],
    snapshots: &Snapshots,
    now: DateTime<Utc>,
) -> Result<OrderWithItems, OrderError> {
    let order_id = OrderId::new();
    let mut amount = Money::zero();
    let mut order_items = Vec::with_capacity(items.len());

    for line in items {
        let product = snapshots
            .get(&line.product_id)
            .ok_or(OrderError::MissingProduct {
                product_id: line.product_id,
            })?;

        let item = OrderItem {
            id: OrderItemId::new(),
            order_id,
            product_id: product.id,
            product_name: product.name.clone(),
            product_image_url: product.image_url.clone(),
            price: product.price,
            quantity: line.quantity,
            date_created: now,
            date_updated: now,
        };

        amount = item
            .line_total()
            .and_then(|total| amount.checked_add(total))
            .ok_or(OrderError::AmountOverflow)?;
        order_items.push(item);
    }

    let order = Order {
        id: order_id,
        user_id,
        amount,
        status: OrderStatus::Created,
        date_created: now,
        date_updated: now,
    };

    Ok(OrderWithItems {
        order,
        items: order_items,
    })
}
