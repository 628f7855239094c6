use std::ops::DerefMut;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    PgConnection, PgPool, Postgres, Row,
    pool::PoolConnection,
    postgres::{PgPoolOptions, PgRow},
};
use uuid::Uuid;

use crate::{
    Order, OrderBy, OrderFilter, OrderId, OrderItem, OrderItemId, OrderStatus, Page, Product,
    ProductId, Result, Role, StoreError, User, UserId,
    error::db,
    store::{CatalogStore, Database, OrderStore, Transaction, UserStore},
};

const UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL-backed database.
#[derive(Clone)]
pub struct PostgresDatabase {
    pool: PgPool,
}

impl PostgresDatabase {
    /// Creates a database over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a new pool.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(db("connect"))?;
        tracing::info!(max_connections, "database pool connected");
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        tracing::info!("database migrations applied");
        Ok(())
    }
}

#[async_trait]
impl Database for PostgresDatabase {
    type Session = PgSession;
    type Tx = PgTransaction;

    async fn session(&self) -> Result<Self::Session> {
        let conn = self.pool.acquire().await.map_err(db("acquire connection"))?;
        Ok(PgStore { conn })
    }

    async fn begin(&self) -> Result<Self::Tx> {
        let conn = self.pool.begin().await.map_err(db("begin transaction"))?;
        Ok(PgStore { conn })
    }
}

/// Store handle over a single PostgreSQL connection.
///
/// `C` is either a pooled connection (autocommit) or an open transaction.
pub struct PgStore<C> {
    conn: C,
}

/// Autocommit store handle.
pub type PgSession = PgStore<PoolConnection<Postgres>>;

/// Transactional store handle.
pub type PgTransaction = PgStore<sqlx::Transaction<'static, Postgres>>;

impl<C> PgStore<C>
where
    C: DerefMut<Target = PgConnection> + Send,
{
    fn conn(&mut self) -> &mut PgConnection {
        &mut self.conn
    }
}

#[async_trait]
impl Transaction for PgTransaction {
    async fn commit(self) -> Result<()> {
        self.conn.commit().await.map_err(db("commit"))
    }

    async fn rollback(self) -> Result<()> {
        self.conn.rollback().await.map_err(db("rollback"))
    }
}

fn get<'r, T>(row: &'r PgRow, column: &'static str) -> Result<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column).map_err(db(column))
}

fn row_to_product(row: &PgRow) -> Result<Product> {
    Ok(Product {
        id: ProductId::from_uuid(get(row, "product_id")?),
        name: get(row, "name")?,
        description: get(row, "description")?,
        image_url: get(row, "image_url")?,
        price: get::<i64>(row, "price")?.into(),
        quantity: get(row, "quantity")?,
        date_created: get(row, "date_created")?,
        date_updated: get(row, "date_updated")?,
    })
}

fn row_to_order(row: &PgRow) -> Result<Order> {
    let status: String = get(row, "status")?;
    let status = status.parse::<OrderStatus>().map_err(|e| StoreError::CorruptRow {
        table: "orders",
        reason: e.to_string(),
    })?;

    Ok(Order {
        id: OrderId::from_uuid(get(row, "order_id")?),
        user_id: UserId::from_uuid(get(row, "user_id")?),
        amount: get::<i64>(row, "amount")?.into(),
        status,
        date_created: get(row, "date_created")?,
        date_updated: get(row, "date_updated")?,
    })
}

fn row_to_order_item(row: &PgRow) -> Result<OrderItem> {
    Ok(OrderItem {
        id: OrderItemId::from_uuid(get(row, "order_item_id")?),
        order_id: OrderId::from_uuid(get(row, "order_id")?),
        product_id: ProductId::from_uuid(get(row, "product_id")?),
        product_name: get(row, "product_name")?,
        product_image_url: get(row, "product_image_url")?,
        price: get::<i64>(row, "price")?.into(),
        quantity: get(row, "quantity")?,
        date_created: get(row, "date_created")?,
        date_updated: get(row, "date_updated")?,
    })
}

fn row_to_user(row: &PgRow) -> Result<User> {
    let roles = get::<Vec<String>>(row, "roles")?
        .iter()
        .map(|role| role.parse::<Role>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| StoreError::CorruptRow {
            table: "users",
            reason: e.to_string(),
        })?;

    Ok(User {
        id: UserId::from_uuid(get(row, "user_id")?),
        name: get(row, "name")?,
        email: get(row, "email")?,
        roles,
        enabled: get(row, "enabled")?,
        email_confirm_token: get(row, "email_confirm_token")?,
        date_created: get(row, "date_created")?,
        date_updated: get(row, "date_updated")?,
    })
}

/// Maps a unique violation onto `Duplicate`, anything else onto `Database`.
fn insert_error(
    op: &'static str,
    entity: &'static str,
    id: impl ToString,
) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |e| {
        if let sqlx::Error::Database(ref db_err) = e
            && db_err.code().as_deref() == Some(UNIQUE_VIOLATION)
        {
            return StoreError::duplicate(entity, id);
        }
        StoreError::Database { op, source: e }
    }
}

/// Appends the WHERE clause for `filter`, numbering parameters from 1.
fn push_filter(sql: &mut String, filter: &OrderFilter) {
    sql.push_str(" WHERE 1=1");
    let mut param_count = 0;

    if filter.start_created_date.is_some() {
        param_count += 1;
        sql.push_str(&format!(" AND date_created >= ${param_count}"));
    }
    if filter.end_created_date.is_some() {
        param_count += 1;
        sql.push_str(&format!(" AND date_created <= ${param_count}"));
    }
    if filter.user_id.is_some() {
        param_count += 1;
        sql.push_str(&format!(" AND user_id = ${param_count}"));
    }
    if filter.status.is_some() {
        param_count += 1;
        sql.push_str(&format!(" AND status = ${param_count}"));
    }
}

fn bind_filter<'q>(
    mut query: sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>,
    filter: &OrderFilter,
) -> sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments> {
    if let Some(start) = filter.start_created_date {
        query = query.bind(start);
    }
    if let Some(end) = filter.end_created_date {
        query = query.bind(end);
    }
    if let Some(user_id) = filter.user_id {
        query = query.bind(user_id.as_uuid());
    }
    if let Some(status) = filter.status {
        query = query.bind(status.as_str());
    }
    query
}

fn filter_param_count(filter: &OrderFilter) -> usize {
    [
        filter.start_created_date.is_some(),
        filter.end_created_date.is_some(),
        filter.user_id.is_some(),
        filter.status.is_some(),
    ]
    .into_iter()
    .filter(|set| *set)
    .count()
}

#[async_trait]
impl<C> CatalogStore for PgStore<C>
where
    C: DerefMut<Target = PgConnection> + Send,
{
    async fn create_product(&mut self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (product_id, name, description, image_url, price, quantity, date_created, date_updated)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(&product.description)
        .bind(&product.image_url)
        .bind(product.price.minor())
        .bind(product.quantity)
        .bind(product.date_created)
        .bind(product.date_updated)
        .execute(self.conn())
        .await
        .map_err(insert_error("create product", "product", product.id))?;
        Ok(())
    }

    async fn product_by_id(&mut self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(
            r#"
            SELECT product_id, name, description, image_url, price, quantity, date_created, date_updated
            FROM products
            WHERE product_id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(self.conn())
        .await
        .map_err(db("product by id"))?;

        row.as_ref().map(row_to_product).transpose()
    }

    async fn fetch_by_ids(&mut self, ids: &[ProductId]) -> Result<Vec<Product>> {
        let ids: Vec<Uuid> = ids.iter().map(ProductId::as_uuid).collect();

        // Row locks are taken in id order so concurrent reservations cannot deadlock.
        let rows = sqlx::query(
            r#"
            SELECT product_id, name, description, image_url, price, quantity, date_created, date_updated
            FROM products
            WHERE product_id = ANY($1)
            ORDER BY product_id
            FOR UPDATE
            "#,
        )
        .bind(ids)
        .fetch_all(self.conn())
        .await
        .map_err(db("fetch products by ids"))?;

        rows.iter().map(row_to_product).collect()
    }

    async fn update_quantity(
        &mut self,
        id: ProductId,
        quantity: i32,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if quantity < 0 {
            return Err(StoreError::NegativeQuantity {
                product_id: id,
                quantity,
            });
        }

        let result = sqlx::query(
            "UPDATE products SET quantity = $2, date_updated = $3 WHERE product_id = $1",
        )
        .bind(id.as_uuid())
        .bind(quantity)
        .bind(now)
        .execute(self.conn())
        .await
        .map_err(db("update product quantity"))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("product", id));
        }
        Ok(())
    }
}

#[async_trait]
impl<C> OrderStore for PgStore<C>
where
    C: DerefMut<Target = PgConnection> + Send,
{
    async fn create_order(&mut self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (order_id, user_id, amount, status, date_created, date_updated)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.user_id.as_uuid())
        .bind(order.amount.minor())
        .bind(order.status.as_str())
        .bind(order.date_created)
        .bind(order.date_updated)
        .execute(self.conn())
        .await
        .map_err(insert_error("create order", "order", order.id))?;
        Ok(())
    }

    async fn create_order_items(&mut self, items: &[OrderItem]) -> Result<()> {
        for item in items {
            sqlx::query(
                r#"
                INSERT INTO order_items (order_item_id, order_id, product_id, product_name, product_image_url, price, quantity, date_created, date_updated)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(item.id.as_uuid())
            .bind(item.order_id.as_uuid())
            .bind(item.product_id.as_uuid())
            .bind(&item.product_name)
            .bind(&item.product_image_url)
            .bind(item.price.minor())
            .bind(item.quantity)
            .bind(item.date_created)
            .bind(item.date_updated)
            .execute(self.conn())
            .await
            .map_err(insert_error("create order item", "order item", item.id))?;
        }
        Ok(())
    }

    async fn order_by_id(&mut self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(
            r#"
            SELECT order_id, user_id, amount, status, date_created, date_updated
            FROM orders
            WHERE order_id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(self.conn())
        .await
        .map_err(db("order by id"))?;

        row.as_ref().map(row_to_order).transpose()
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(
            r#"
            SELECT order_id, user_id, amount, status, date_created, date_updated
            FROM orders
            WHERE order_id = $1
            FOR UPDATE
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(self.conn())
        .await
        .map_err(db("lock order"))?;

        row.as_ref().map(row_to_order).transpose()
    }

    async fn order_items(&mut self, order_id: OrderId) -> Result<Vec<OrderItem>> {
        let rows = sqlx::query(
            r#"
            SELECT order_item_id, order_id, product_id, product_name, product_image_url, price, quantity, date_created, date_updated
            FROM order_items
            WHERE order_id = $1
            ORDER BY seq
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(self.conn())
        .await
        .map_err(db("order items"))?;

        rows.iter().map(row_to_order_item).collect()
    }

    async fn update_status(
        &mut self,
        id: OrderId,
        expected: OrderStatus,
        target: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $3, date_updated = $4
            WHERE order_id = $1 AND status = $2
            "#,
        )
        .bind(id.as_uuid())
        .bind(expected.as_str())
        .bind(target.as_str())
        .bind(now)
        .execute(self.conn())
        .await
        .map_err(db("update order status"))?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_order_items(&mut self, order_id: OrderId) -> Result<()> {
        sqlx::query("DELETE FROM order_items WHERE order_id = $1")
            .bind(order_id.as_uuid())
            .execute(self.conn())
            .await
            .map_err(db("delete order items"))?;
        Ok(())
    }

    async fn delete_order(&mut self, id: OrderId) -> Result<()> {
        let result = sqlx::query("DELETE FROM orders WHERE order_id = $1")
            .bind(id.as_uuid())
            .execute(self.conn())
            .await
            .map_err(db("delete order"))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("order", id));
        }
        Ok(())
    }

    async fn query_orders(
        &mut self,
        filter: &OrderFilter,
        order_by: OrderBy,
        page: Page,
    ) -> Result<Vec<Order>> {
        let mut sql = String::from(
            "SELECT order_id, user_id, amount, status, date_created, date_updated FROM orders",
        );
        push_filter(&mut sql, filter);

        let direction = order_by.direction.as_sql();
        sql.push_str(&format!(
            " ORDER BY {} {direction}, order_id {direction}",
            order_by.field.as_str()
        ));

        let param_count = filter_param_count(filter);
        sql.push_str(&format!(
            " LIMIT ${} OFFSET ${}",
            param_count + 1,
            param_count + 2
        ));

        let limit = i64::try_from(page.limit()).unwrap_or(i64::MAX);
        let offset = i64::try_from(page.offset()).unwrap_or(i64::MAX);
        let rows = bind_filter(sqlx::query(&sql), filter)
            .bind(limit)
            .bind(offset)
            .fetch_all(self.conn())
            .await
            .map_err(db("query orders"))?;

        rows.iter().map(row_to_order).collect()
    }

    async fn count_orders(&mut self, filter: &OrderFilter) -> Result<u64> {
        let mut sql = String::from("SELECT COUNT(*) AS total FROM orders");
        push_filter(&mut sql, filter);

        let row = bind_filter(sqlx::query(&sql), filter)
            .fetch_one(self.conn())
            .await
            .map_err(db("count orders"))?;

        let total: i64 = get(&row, "total")?;
        Ok(u64::try_from(total).unwrap_or_default())
    }
}

#[async_trait]
impl<C> UserStore for PgStore<C>
where
    C: DerefMut<Target = PgConnection> + Send,
{
    async fn create_user(&mut self, user: &User) -> Result<()> {
        let roles: Vec<&str> = user.roles.iter().map(Role::as_str).collect();

        sqlx::query(
            r#"
            INSERT INTO users (user_id, name, email, roles, enabled, email_confirm_token, date_created, date_updated)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.name)
        .bind(&user.email)
        .bind(roles)
        .bind(user.enabled)
        .bind(&user.email_confirm_token)
        .bind(user.date_created)
        .bind(user.date_updated)
        .execute(self.conn())
        .await
        .map_err(insert_error("create user", "user", user.id))?;
        Ok(())
    }

    async fn user_by_id(&mut self, id: UserId) -> Result<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT user_id, name, email, roles, enabled, email_confirm_token, date_created, date_updated
            FROM users
            WHERE user_id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(self.conn())
        .await
        .map_err(db("user by id"))?;

        row.as_ref().map(row_to_user).transpose()
    }
}
