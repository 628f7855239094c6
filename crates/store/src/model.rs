//! Persisted records.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, OrderItemId, OrderStatus, ProductId, Role, UserId};
use serde::{Deserialize, Serialize};

/// A catalog product as stored.
///
/// `quantity` is the on-hand stock and never goes negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub image_url: String,
    /// Unit price in minor currency units.
    pub price: Money,
    pub quantity: i32,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
}

/// An order header.
///
/// Only `status` and `date_updated` change after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    /// Sum of `price * quantity` over the order's items.
    pub amount: Money,
    pub status: OrderStatus,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
}

/// One line of an order.
///
/// Name, image and price are copied from the product when the order is
/// placed, so later catalog edits never alter historical orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub product_name: String,
    pub product_image_url: String,
    pub price: Money,
    pub quantity: i32,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
}

impl OrderItem {
    /// Returns `price * quantity`, or `None` on overflow.
    pub fn line_total(&self) -> Option<Money> {
        self.price.checked_mul(i64::from(self.quantity))
    }
}

/// An order together with its line items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// A user account, as far as authentication needs to see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub roles: Vec<Role>,
    pub enabled: bool,
    /// Set while the account's email address is still unconfirmed.
    pub email_confirm_token: Option<String>,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
}

impl User {
    /// Returns true once the email confirmation token has been cleared.
    pub fn email_confirmed(&self) -> bool {
        self.email_confirm_token
            .as_deref()
            .is_none_or(|token| token.is_empty())
    }
}
