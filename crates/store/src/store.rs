use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    Order, OrderBy, OrderFilter, OrderId, OrderItem, OrderStatus, Page, Product, ProductId,
    Result, User, UserId,
};

/// Product lookup and stock updates.
///
/// Every method takes `&mut self`: a store handle is a single connection or
/// transaction and is never shared between requests.
#[async_trait]
pub trait CatalogStore: Send {
    /// Inserts a new product.
    async fn create_product(&mut self, product: &Product) -> Result<()>;

    /// Retrieves a single product.
    async fn product_by_id(&mut self, id: ProductId) -> Result<Option<Product>>;

    /// Retrieves every existing product among `ids`, ordered by id.
    ///
    /// Missing ids are silently absent from the result. Inside a transaction
    /// the returned rows stay locked for update until it ends.
    async fn fetch_by_ids(&mut self, ids: &[ProductId]) -> Result<Vec<Product>>;

    /// Overwrites the on-hand quantity of a product.
    ///
    /// Fails with `NegativeQuantity` for a negative value and `NotFound` if
    /// the product does not exist.
    async fn update_quantity(
        &mut self,
        id: ProductId,
        quantity: i32,
        now: DateTime<Utc>,
    ) -> Result<()>;
}

/// Order and order item persistence.
#[async_trait]
pub trait OrderStore: Send {
    async fn create_order(&mut self, order: &Order) -> Result<()>;

    async fn create_order_items(&mut self, items: &[OrderItem]) -> Result<()>;

    async fn order_by_id(&mut self, id: OrderId) -> Result<Option<Order>>;

    /// Like `order_by_id`, but inside a transaction the row stays locked for
    /// update until it ends, so its status cannot change underneath.
    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>>;

    /// Retrieves the items of an order in insertion order.
    async fn order_items(&mut self, order_id: OrderId) -> Result<Vec<OrderItem>>;

    /// Sets the status to `target` only if it is still `expected`.
    ///
    /// Returns false when no row matched, i.e. the order changed (or
    /// vanished) since it was read.
    async fn update_status(
        &mut self,
        id: OrderId,
        expected: OrderStatus,
        target: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    async fn delete_order_items(&mut self, order_id: OrderId) -> Result<()>;

    /// Deletes an order header. Fails with `NotFound` if it does not exist.
    async fn delete_order(&mut self, id: OrderId) -> Result<()>;

    async fn query_orders(
        &mut self,
        filter: &OrderFilter,
        order_by: OrderBy,
        page: Page,
    ) -> Result<Vec<Order>>;

    async fn count_orders(&mut self, filter: &OrderFilter) -> Result<u64>;
}

/// User account lookups.
#[async_trait]
pub trait UserStore: Send {
    async fn create_user(&mut self, user: &User) -> Result<()>;

    async fn user_by_id(&mut self, id: UserId) -> Result<Option<User>>;
}

/// A store handle implementing every port.
pub trait Store: CatalogStore + OrderStore + UserStore {}

impl<T: CatalogStore + OrderStore + UserStore + ?Sized> Store for T {}

/// A transaction-scoped store handle.
///
/// Dropping a transaction without committing rolls it back.
#[async_trait]
pub trait Transaction: Store {
    async fn commit(self) -> Result<()>;

    async fn rollback(self) -> Result<()>;
}

/// Hands out store handles. Cheap to clone and shared across requests.
#[async_trait]
pub trait Database: Clone + Send + Sync + 'static {
    /// A plain handle whose writes are committed individually.
    type Session: Store + 'static;

    /// A transactional handle whose writes commit or roll back together.
    type Tx: Transaction + 'static;

    async fn session(&self) -> Result<Self::Session>;

    async fn begin(&self) -> Result<Self::Tx>;
}
