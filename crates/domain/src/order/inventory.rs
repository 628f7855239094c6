//! Stock reservation against the catalog.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use common::ProductId;
use store::{CatalogStore, OrderItem, Product};

use super::{LineItem, OrderError};

/// Products as read at reservation time, keyed by id.
pub type Snapshots = HashMap<ProductId, Product>;

/// Checks the shape of a request before touching the store.
pub fn validate_line_items(items: &[LineItem]) -> Result<(), OrderError> {
    if items.is_empty() {
        return Err(OrderError::NoItems);
    }

    let mut seen = HashSet::with_capacity(items.len());
    for line in items {
        if line.quantity < 1 {
            return Err(OrderError::InvalidQuantity {
                product_id: line.product_id,
                quantity: line.quantity,
            });
        }
        if !seen.insert(line.product_id) {
            return Err(OrderError::DuplicateLineItem {
                product_id: line.product_id,
            });
        }
    }
    Ok(())
}

/// Reserves stock for every line and returns the products as read.
///
/// All products are fetched (and, inside a transaction, locked) in one
/// batch. Every line is checked before the first decrement is written, so
/// a rejected request leaves the catalog untouched even without a
/// transaction. The decrements themselves must run inside the caller's
/// transaction to roll back with a later failure.
pub async fn reserve<S: CatalogStore>(
    store: &mut S,
    items: &[LineItem],
    now: DateTime<Utc>,
) -> Result<Snapshots, OrderError> {
    validate_line_items(items)?;

    let ids: Vec<ProductId> = items.iter().map(|line| line.product_id).collect();
    let snapshots: Snapshots = store
        .fetch_by_ids(&ids)
        .await?
        .into_iter()
        .map(|product| (product.id, product))
        .collect();

    let mut remaining = Vec::with_capacity(items.len());
    for line in items {
        let product = snapshots
            .get(&line.product_id)
            .ok_or(OrderError::MissingProduct {
                product_id: line.product_id,
            })?;

        if line.quantity > product.quantity {
            return Err(OrderError::InsufficientStock {
                product_id: product.id,
                requested: line.quantity,
                available: product.quantity,
            });
        }
        remaining.push((product.id, product.quantity - line.quantity));
    }

    for (product_id, quantity) in remaining {
        store.update_quantity(product_id, quantity, now).await?;
    }

    tracing::debug!(lines = items.len(), "stock reserved");
    Ok(snapshots)
}

/// Puts the quantities of `items` back on their products.
///
/// Products that no longer exist are skipped. Nothing is written when any
/// product's stock would overflow.
pub async fn restock<S: CatalogStore>(
    store: &mut S,
    items: &[OrderItem],
    now: DateTime<Utc>,
) -> Result<(), OrderError> {
    let ids: Vec<ProductId> = items.iter().map(|item| item.product_id).collect();
    let products: HashMap<ProductId, i32> = store
        .fetch_by_ids(&ids)
        .await?
        .into_iter()
        .map(|product| (product.id, product.quantity))
        .collect();

    let mut updates = Vec::with_capacity(items.len());
    for item in items {
        let Some(&on_hand) = products.get(&item.product_id) else {
            tracing::warn!(product_id = %item.product_id, "restock skipped, product is gone");
            continue;
        };
        let quantity = on_hand
            .checked_add(item.quantity)
            .ok_or(OrderError::StockOverflow {
                product_id: item.product_id,
                quantity: item.quantity,
                on_hand,
            })?;
        updates.push((item.product_id, quantity));
    }

    for (product_id, quantity) in updates {
        store.update_quantity(product_id, quantity, now).await?;
    }
    Ok(())
}
