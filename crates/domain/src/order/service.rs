//! Order service providing the order lifecycle operations.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use common::{OrderId, OrderStatus, UserId};
use store::{Order, OrderBy, OrderFilter, OrderWithItems, Page, Store, Transaction};

use super::{
    DeletePolicy, LineItem, NoPayments, OrderError, OrderPolicy, PaymentLedger, build_order,
    check_deletable, reserve, restock, state,
};

/// Service for managing orders.
///
/// Every operation takes the store handle to run on. Operations that must
/// be atomic take a `Transaction`; the caller commits or rolls it back.
#[derive(Clone)]
pub struct OrderService {
    policy: OrderPolicy,
    payments: Arc<dyn PaymentLedger>,
}

impl Default for OrderService {
    fn default() -> Self {
        Self::new(OrderPolicy::default())
    }
}

impl OrderService {
    /// Creates a new order service with the given policy and no payment partner.
    pub fn new(policy: OrderPolicy) -> Self {
        Self {
            policy,
            payments: Arc::new(NoPayments),
        }
    }

    /// Replaces the payment ledger consulted by the delete policy.
    pub fn with_payment_ledger(mut self, payments: Arc<dyn PaymentLedger>) -> Self {
        self.payments = payments;
        self
    }

    /// Places an order for `user_id`.
    ///
    /// Reserves stock, snapshots the products and writes the order and its
    /// items. Any failure leaves the transaction to be rolled back.
    #[tracing::instrument(skip(self, tx, items), fields(lines = items.len()))]
    pub async fn create<T: Transaction>(
        &self,
        tx: &mut T,
        user_id: UserId,
        items: &[LineItem],
    ) -> Result<OrderWithItems, OrderError> {
        let start = Instant::now();
        let result = Self::place(tx, user_id, items).await;
        metrics::histogram!("order_create_duration_seconds").record(start.elapsed().as_secs_f64());

        match &result {
            Ok(created) => {
                metrics::counter!("orders_created_total").increment(1);
                tracing::info!(
                    order_id = %created.order.id,
                    amount = %created.order.amount,
                    "order created"
                );
            }
            Err(e) => {
                metrics::counter!("order_create_failures_total", "reason" => e.kind().to_string())
                    .increment(1);
                tracing::info!(error = %e, "order rejected");
            }
        }
        result
    }

    async fn place<T: Transaction>(
        tx: &mut T,
        user_id: UserId,
        items: &[LineItem],
    ) -> Result<OrderWithItems, OrderError> {
        let now = Utc::now();
        let snapshots = reserve(tx, items, now).await?;
        let created = build_order(user_id, items, &snapshots, now)?;
        tx.create_order(&created.order).await?;
        tx.create_order_items(&created.items).await?;
        Ok(created)
    }

    /// Loads an order header.
    #[tracing::instrument(skip(self, store))]
    pub async fn query_by_id<S: Store>(
        &self,
        store: &mut S,
        order_id: OrderId,
    ) -> Result<Order, OrderError> {
        store
            .order_by_id(order_id)
            .await?
            .ok_or(OrderError::OrderNotFound(order_id))
    }

    /// Loads an order with its item snapshots.
    #[tracing::instrument(skip(self, store))]
    pub async fn query_by_id_with_items<S: Store>(
        &self,
        store: &mut S,
        order_id: OrderId,
    ) -> Result<OrderWithItems, OrderError> {
        let order = self.query_by_id(store, order_id).await?;
        let items = store.order_items(order_id).await?;
        Ok(OrderWithItems { order, items })
    }

    /// Lists orders matching `filter`, sorted and paged.
    #[tracing::instrument(skip(self, store))]
    pub async fn query<S: Store>(
        &self,
        store: &mut S,
        filter: &OrderFilter,
        order_by: OrderBy,
        page: Page,
    ) -> Result<Vec<Order>, OrderError> {
        Ok(store.query_orders(filter, order_by, page).await?)
    }

    /// Counts orders matching `filter`.
    pub async fn count<S: Store>(
        &self,
        store: &mut S,
        filter: &OrderFilter,
    ) -> Result<u64, OrderError> {
        Ok(store.count_orders(filter).await?)
    }

    /// Moves an order to `target`.
    ///
    /// Re-applying the current status succeeds without writing. With
    /// `restock_on_cancel`, a cancellation also puts the items' stock back
    /// on the same handle, so callers should pass a transaction.
    #[tracing::instrument(skip(self, store))]
    pub async fn transition<S: Store>(
        &self,
        store: &mut S,
        order_id: OrderId,
        target: OrderStatus,
    ) -> Result<Order, OrderError> {
        let order = self.query_by_id(store, order_id).await?;
        let from = order.status;
        let now = Utc::now();

        let updated = match state::transition(store, order, target, now).await {
            Err(e @ OrderError::ConcurrentStatusChange { .. }) => {
                metrics::counter!("order_status_conflicts_total").increment(1);
                tracing::warn!(%order_id, %from, %target, "concurrent status change");
                return Err(e);
            }
            result => result?,
        };

        if updated.status != from {
            metrics::counter!("order_status_transitions_total", "to" => target.as_str())
                .increment(1);
            tracing::info!(%order_id, %from, to = %target, "order status changed");

            if target == OrderStatus::Cancelled && self.policy.restock_on_cancel {
                let items = store.order_items(order_id).await?;
                restock(store, &items, now).await?;
            }
        }
        Ok(updated)
    }

    /// Cancels an order.
    pub async fn cancel<S: Store>(
        &self,
        store: &mut S,
        order_id: OrderId,
    ) -> Result<Order, OrderError> {
        self.transition(store, order_id, OrderStatus::Cancelled)
            .await
    }

    /// Deletes an order and its items.
    ///
    /// Finished orders are kept. Under `UnlessFinishedOrPaid`, orders with a
    /// completed payment are kept too.
    #[tracing::instrument(skip(self, tx))]
    pub async fn delete<T: Transaction>(
        &self,
        tx: &mut T,
        order_id: OrderId,
    ) -> Result<(), OrderError> {
        let order = tx
            .lock_order(order_id)
            .await?
            .ok_or(OrderError::OrderNotFound(order_id))?;
        check_deletable(&order)?;

        if self.policy.delete == DeletePolicy::UnlessFinishedOrPaid
            && self.payments.has_successful_payment(order_id).await?
        {
            return Err(OrderError::OrderHasPayments(order_id));
        }

        tx.delete_order_items(order_id).await?;
        tx.delete_order(order_id).await?;
        tracing::info!(%order_id, status = %order.status, "order deleted");
        Ok(())
    }
}
