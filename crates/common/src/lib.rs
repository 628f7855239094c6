//! Shared vocabulary for the ecommerce order core.
//!
//! Everything here is plain data: typed identifiers, integer money, the
//! closed order status and role enumerations, and the error taxonomy the
//! other crates map their failures onto.

pub mod error;
pub mod money;
pub mod role;
pub mod status;
pub mod types;

pub use error::ErrorKind;
pub use money::Money;
pub use role::{ParseRoleError, Role};
pub use status::{OrderStatus, ParseStatusError};
pub use types::{OrderId, OrderItemId, ProductId, UserId};
