use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard};

use crate::{
    Order, OrderBy, OrderFilter, OrderId, OrderItem, OrderStatus, Page, Product, ProductId,
    Result, SortDirection, SortField, StoreError, User, UserId,
    store::{CatalogStore, Database, OrderStore, Transaction, UserStore},
};

/// A write that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    UpdateQuantity,
    CreateOrder,
    CreateOrderItems,
    UpdateStatus,
    DeleteOrderItems,
    DeleteOrder,
}

impl FailPoint {
    fn op(&self) -> &'static str {
        match self {
            FailPoint::UpdateQuantity => "update quantity",
            FailPoint::CreateOrder => "create order",
            FailPoint::CreateOrderItems => "create order items",
            FailPoint::UpdateStatus => "update status",
            FailPoint::DeleteOrderItems => "delete order items",
            FailPoint::DeleteOrder => "delete order",
        }
    }
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    products: HashMap<ProductId, Product>,
    orders: HashMap<OrderId, Order>,
    items: Vec<OrderItem>,
    users: HashMap<UserId, User>,
    fail_points: HashSet<FailPoint>,
}

impl MemoryState {
    fn check(&self, point: FailPoint) -> Result<()> {
        if self.fail_points.contains(&point) {
            return Err(StoreError::Injected { op: point.op() });
        }
        Ok(())
    }

    fn create_product(&mut self, product: &Product) -> Result<()> {
        if self.products.contains_key(&product.id) {
            return Err(StoreError::duplicate("product", product.id));
        }
        if product.quantity < 0 {
            return Err(StoreError::NegativeQuantity {
                product_id: product.id,
                quantity: product.quantity,
            });
        }
        self.products.insert(product.id, product.clone());
        Ok(())
    }

    fn fetch_by_ids(&self, ids: &[ProductId]) -> Vec<Product> {
        let wanted: HashSet<&ProductId> = ids.iter().collect();
        let mut products: Vec<_> = wanted
            .into_iter()
            .filter_map(|id| self.products.get(id).cloned())
            .collect();
        products.sort_by_key(|p| p.id);
        products
    }

    fn update_quantity(&mut self, id: ProductId, quantity: i32, now: DateTime<Utc>) -> Result<()> {
        self.check(FailPoint::UpdateQuantity)?;
        if quantity < 0 {
            return Err(StoreError::NegativeQuantity {
                product_id: id,
                quantity,
            });
        }
        let product = self
            .products
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("product", id))?;
        product.quantity = quantity;
        product.date_updated = now;
        Ok(())
    }

    fn create_order(&mut self, order: &Order) -> Result<()> {
        self.check(FailPoint::CreateOrder)?;
        if self.orders.contains_key(&order.id) {
            return Err(StoreError::duplicate("order", order.id));
        }
        self.orders.insert(order.id, order.clone());
        Ok(())
    }

    fn create_order_items(&mut self, items: &[OrderItem]) -> Result<()> {
        self.check(FailPoint::CreateOrderItems)?;
        for item in items {
            if !self.orders.contains_key(&item.order_id) {
                return Err(StoreError::not_found("order", item.order_id));
            }
            if self.items.iter().any(|existing| existing.id == item.id) {
                return Err(StoreError::duplicate("order item", item.id));
            }
        }
        self.items.extend_from_slice(items);
        Ok(())
    }

    fn order_items(&self, order_id: OrderId) -> Vec<OrderItem> {
        self.items
            .iter()
            .filter(|item| item.order_id == order_id)
            .cloned()
            .collect()
    }

    fn update_status(
        &mut self,
        id: OrderId,
        expected: OrderStatus,
        target: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.check(FailPoint::UpdateStatus)?;
        match self.orders.get_mut(&id) {
            Some(order) if order.status == expected => {
                order.status = target;
                order.date_updated = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn delete_order_items(&mut self, order_id: OrderId) -> Result<()> {
        self.check(FailPoint::DeleteOrderItems)?;
        self.items.retain(|item| item.order_id != order_id);
        Ok(())
    }

    fn delete_order(&mut self, id: OrderId) -> Result<()> {
        self.check(FailPoint::DeleteOrder)?;
        if self.items.iter().any(|item| item.order_id == id) {
            return Err(StoreError::Duplicate {
                entity: "order items referencing order",
                id: id.to_string(),
            });
        }
        self.orders
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("order", id))
    }

    fn matching_orders<'a>(&'a self, filter: &'a OrderFilter) -> impl Iterator<Item = &'a Order> {
        self.orders.values().filter(move |order| {
            filter
                .start_created_date
                .is_none_or(|start| order.date_created >= start)
                && filter
                    .end_created_date
                    .is_none_or(|end| order.date_created <= end)
                && filter.user_id.is_none_or(|user_id| order.user_id == user_id)
                && filter.status.is_none_or(|status| order.status == status)
        })
    }

    fn query_orders(&self, filter: &OrderFilter, order_by: OrderBy, page: Page) -> Vec<Order> {
        let mut orders: Vec<_> = self.matching_orders(filter).cloned().collect();
        orders.sort_by(|a, b| {
            let ordering = compare_orders(a, b, order_by.field).then(a.id.cmp(&b.id));
            match order_by.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });

        let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(page.limit()).unwrap_or(usize::MAX);
        orders.into_iter().skip(offset).take(limit).collect()
    }
}

fn compare_orders(a: &Order, b: &Order, field: SortField) -> Ordering {
    match field {
        SortField::DateCreated => a.date_created.cmp(&b.date_created),
        SortField::Amount => a.amount.cmp(&b.amount),
        // Same collation as the text column in PostgreSQL.
        SortField::Status => a.status.as_str().cmp(b.status.as_str()),
    }
}

/// In-memory database for tests and local runs.
///
/// Transactions are serializable: a transaction holds the database lock for
/// its whole lifetime and works on a private copy that replaces the shared
/// state on commit. Plain sessions lock per call.
#[derive(Clone, Default)]
pub struct InMemoryDatabase {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryDatabase {
    /// Creates a new empty in-memory database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write of the given kind fail.
    pub async fn fail_on(&self, point: FailPoint) {
        self.state.lock().await.fail_points.insert(point);
    }

    /// Removes all injected failures.
    pub async fn clear_failures(&self) {
        self.state.lock().await.fail_points.clear();
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }

    /// Returns the total number of order items stored.
    pub async fn order_item_count(&self) -> usize {
        self.state.lock().await.items.len()
    }
}

/// A plain in-memory store handle.
pub struct MemorySession {
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySession {
    async fn state(&mut self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().await
    }
}

/// A transactional in-memory store handle.
pub struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

impl MemoryTransaction {
    async fn state(&mut self) -> &mut MemoryState {
        &mut self.working
    }
}

/// Implements the store ports for a handle exposing `state()`.
macro_rules! impl_memory_store {
    ($handle:ty) => {
        #[async_trait]
        impl CatalogStore for $handle {
            async fn create_product(&mut self, product: &Product) -> Result<()> {
                self.state().await.create_product(product)
            }

            async fn product_by_id(&mut self, id: ProductId) -> Result<Option<Product>> {
                Ok(self.state().await.products.get(&id).cloned())
            }

            async fn fetch_by_ids(&mut self, ids: &[ProductId]) -> Result<Vec<Product>> {
                Ok(self.state().await.fetch_by_ids(ids))
            }

            async fn update_quantity(
                &mut self,
                id: ProductId,
                quantity: i32,
                now: DateTime<Utc>,
            ) -> Result<()> {
                self.state().await.update_quantity(id, quantity, now)
            }
        }

        #[async_trait]
        impl OrderStore for $handle {
            async fn create_order(&mut self, order: &Order) -> Result<()> {
                self.state().await.create_order(order)
            }

            async fn create_order_items(&mut self, items: &[OrderItem]) -> Result<()> {
                self.state().await.create_order_items(items)
            }

            async fn order_by_id(&mut self, id: OrderId) -> Result<Option<Order>> {
                Ok(self.state().await.orders.get(&id).cloned())
            }

            // Transactions hold the database lock for their whole lifetime.
            async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>> {
                self.order_by_id(id).await
            }

            async fn order_items(&mut self, order_id: OrderId) -> Result<Vec<OrderItem>> {
                Ok(self.state().await.order_items(order_id))
            }

            async fn update_status(
                &mut self,
                id: OrderId,
                expected: OrderStatus,
                target: OrderStatus,
                now: DateTime<Utc>,
            ) -> Result<bool> {
                self.state().await.update_status(id, expected, target, now)
            }

            async fn delete_order_items(&mut self, order_id: OrderId) -> Result<()> {
                self.state().await.delete_order_items(order_id)
            }

            async fn delete_order(&mut self, id: OrderId) -> Result<()> {
                self.state().await.delete_order(id)
            }

            async fn query_orders(
                &mut self,
                filter: &OrderFilter,
                order_by: OrderBy,
                page: Page,
            ) -> Result<Vec<Order>> {
                Ok(self.state().await.query_orders(filter, order_by, page))
            }

            async fn count_orders(&mut self, filter: &OrderFilter) -> Result<u64> {
                let count = self.state().await.matching_orders(filter).count();
                Ok(u64::try_from(count).unwrap_or(u64::MAX))
            }
        }

        #[async_trait]
        impl UserStore for $handle {
            async fn create_user(&mut self, user: &User) -> Result<()> {
                let mut state = self.state().await;
                if state.users.contains_key(&user.id) {
                    return Err(StoreError::duplicate("user", user.id));
                }
                state.users.insert(user.id, user.clone());
                Ok(())
            }

            async fn user_by_id(&mut self, id: UserId) -> Result<Option<User>> {
                Ok(self.state().await.users.get(&id).cloned())
            }
        }
    };
}

impl_memory_store!(MemorySession);
impl_memory_store!(MemoryTransaction);

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn commit(self) -> Result<()> {
        let MemoryTransaction { mut guard, working } = self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl Database for InMemoryDatabase {
    type Session = MemorySession;
    type Tx = MemoryTransaction;

    async fn session(&self) -> Result<Self::Session> {
        Ok(MemorySession {
            state: Arc::clone(&self.state),
        })
    }

    async fn begin(&self) -> Result<Self::Tx> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(MemoryTransaction { guard, working })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Money, Role};

    fn product(quantity: i32, price: i64) -> Product {
        let now = Utc::now();
        Product {
            id: ProductId::new(),
            name: "Widget".to_string(),
            description: "A widget".to_string(),
            image_url: "https://img.example.com/widget.png".to_string(),
            price: Money::from_minor(price),
            quantity,
            date_created: now,
            date_updated: now,
        }
    }

    fn order(user_id: UserId, amount: i64, created: DateTime<Utc>) -> Order {
        Order {
            id: OrderId::new(),
            user_id,
            amount: Money::from_minor(amount),
            status: OrderStatus::Created,
            date_created: created,
            date_updated: created,
        }
    }

    #[tokio::test]
    async fn fetch_by_ids_skips_missing_products() {
        let db = InMemoryDatabase::new();
        let mut session = db.session().await.unwrap();
        let p1 = product(5, 100);
        let p2 = product(1, 200);
        session.create_product(&p1).await.unwrap();
        session.create_product(&p2).await.unwrap();

        let found = session
            .fetch_by_ids(&[p1.id, ProductId::new(), p2.id])
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[tokio::test]
    async fn update_quantity_rejects_negative_and_missing() {
        let db = InMemoryDatabase::new();
        let mut session = db.session().await.unwrap();
        let p = product(5, 100);
        session.create_product(&p).await.unwrap();

        let err = session
            .update_quantity(p.id, -1, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NegativeQuantity { .. }));

        let err = session
            .update_quantity(ProductId::new(), 1, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));

        session.update_quantity(p.id, 2, Utc::now()).await.unwrap();
        let stored = session.product_by_id(p.id).await.unwrap().unwrap();
        assert_eq!(stored.quantity, 2);
    }

    #[tokio::test]
    async fn update_status_is_compare_and_swap() {
        let db = InMemoryDatabase::new();
        let mut session = db.session().await.unwrap();
        let o = order(UserId::new(), 100, Utc::now());
        session.create_order(&o).await.unwrap();

        let first = session
            .update_status(o.id, OrderStatus::Created, OrderStatus::Finished, Utc::now())
            .await
            .unwrap();
        let second = session
            .update_status(o.id, OrderStatus::Created, OrderStatus::Cancelled, Utc::now())
            .await
            .unwrap();

        assert!(first);
        assert!(!second);
        let stored = session.order_by_id(o.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Finished);
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let db = InMemoryDatabase::new();
        let p = product(5, 100);
        db.session().await.unwrap().create_product(&p).await.unwrap();

        {
            let mut tx = db.begin().await.unwrap();
            tx.update_quantity(p.id, 0, Utc::now()).await.unwrap();
            tx.create_order(&order(UserId::new(), 500, Utc::now()))
                .await
                .unwrap();
        }

        let mut session = db.session().await.unwrap();
        let stored = session.product_by_id(p.id).await.unwrap().unwrap();
        assert_eq!(stored.quantity, 5);
        assert_eq!(db.order_count().await, 0);
    }

    #[tokio::test]
    async fn explicit_rollback_discards_writes() {
        let db = InMemoryDatabase::new();
        let mut tx = db.begin().await.unwrap();
        tx.create_order(&order(UserId::new(), 500, Utc::now()))
            .await
            .unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(db.order_count().await, 0);
    }

    #[tokio::test]
    async fn committed_transaction_publishes_writes() {
        let db = InMemoryDatabase::new();
        let o = order(UserId::new(), 500, Utc::now());

        let mut tx = db.begin().await.unwrap();
        tx.create_order(&o).await.unwrap();
        tx.commit().await.unwrap();

        let mut session = db.session().await.unwrap();
        assert_eq!(session.order_by_id(o.id).await.unwrap(), Some(o));
    }

    #[tokio::test]
    async fn injected_failure_is_reported() {
        let db = InMemoryDatabase::new();
        db.fail_on(FailPoint::CreateOrder).await;

        let mut session = db.session().await.unwrap();
        let err = session
            .create_order(&order(UserId::new(), 1, Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Injected { .. }));

        db.clear_failures().await;
        session
            .create_order(&order(UserId::new(), 1, Utc::now()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn delete_requires_items_removed_first() {
        let db = InMemoryDatabase::new();
        let mut session = db.session().await.unwrap();
        let o = order(UserId::new(), 100, Utc::now());
        session.create_order(&o).await.unwrap();
        let now = Utc::now();
        session
            .create_order_items(&[OrderItem {
                id: crate::OrderItemId::new(),
                order_id: o.id,
                product_id: ProductId::new(),
                product_name: "Widget".to_string(),
                product_image_url: String::new(),
                price: Money::from_minor(100),
                quantity: 1,
                date_created: now,
                date_updated: now,
            }])
            .await
            .unwrap();

        assert!(session.delete_order(o.id).await.is_err());
        session.delete_order_items(o.id).await.unwrap();
        session.delete_order(o.id).await.unwrap();
        assert!(session.order_by_id(o.id).await.unwrap().is_none());
        assert!(matches!(
            session.delete_order(o.id).await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn query_filters_sorts_and_pages() {
        let db = InMemoryDatabase::new();
        let mut session = db.session().await.unwrap();
        let alice = UserId::new();
        let bob = UserId::new();
        let base = Utc::now();

        for (i, amount) in [300, 100, 200].into_iter().enumerate() {
            let created = base + chrono::Duration::seconds(i64::try_from(i).unwrap());
            session.create_order(&order(alice, amount, created)).await.unwrap();
        }
        session.create_order(&order(bob, 50, base)).await.unwrap();

        let filter = OrderFilter::for_user(alice);
        assert_eq!(session.count_orders(&filter).await.unwrap(), 3);

        let newest_first = session
            .query_orders(&filter, OrderBy::default(), Page::default())
            .await
            .unwrap();
        let amounts: Vec<i64> = newest_first.iter().map(|o| o.amount.minor()).collect();
        assert_eq!(amounts, vec![200, 100, 300]);

        let by_amount = session
            .query_orders(
                &filter,
                OrderBy::new(SortField::Amount, SortDirection::Asc),
                Page::new(2, 2).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(by_amount.len(), 1);
        assert_eq!(by_amount[0].amount.minor(), 300);

        let window = OrderFilter::new()
            .start_created_date(base + chrono::Duration::seconds(1))
            .end_created_date(base + chrono::Duration::seconds(1));
        assert_eq!(session.count_orders(&window).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn users_round_trip() {
        let db = InMemoryDatabase::new();
        let mut session = db.session().await.unwrap();
        let now = Utc::now();
        let user = User {
            id: UserId::new(),
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            roles: vec![Role::Admin],
            enabled: true,
            email_confirm_token: None,
            date_created: now,
            date_updated: now,
        };
        session.create_user(&user).await.unwrap();
        assert!(session.create_user(&user).await.is_err());
        assert_eq!(session.user_by_id(user.id).await.unwrap(), Some(user));
    }
}
