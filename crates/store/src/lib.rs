pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod query;
pub mod store;

pub use common::{Money, OrderId, OrderItemId, OrderStatus, ProductId, Role, UserId};
pub use error::{Result, StoreError};
pub use memory::{FailPoint, InMemoryDatabase, MemorySession, MemoryTransaction};
pub use model::{Order, OrderItem, OrderWithItems, Product, User};
pub use postgres::{PgSession, PgStore, PgTransaction, PostgresDatabase};
pub use query::{OrderBy, OrderFilter, Page, QueryError, SortDirection, SortField};
pub use store::{CatalogStore, Database, OrderStore, Store, Transaction, UserStore};
