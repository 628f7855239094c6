//! Shared application state.

use std::sync::Arc;
use std::time::Duration;

use auth::{Authenticator, KeyLookup};
use domain::OrderService;
use store::Database;

use crate::config::Config;

/// State shared by every handler.
pub struct AppState<D: Database> {
    pub db: D,
    pub orders: OrderService,
    pub auth: Authenticator<D>,
    /// Deadline for each request's transaction.
    pub deadline: Duration,
}

impl<D: Database> AppState<D> {
    pub fn new(db: D, keys: Arc<dyn KeyLookup>, config: &Config) -> Self {
        Self {
            auth: Authenticator::new(keys, config.issuer.clone(), db.clone()),
            orders: OrderService::new(config.order_policy),
            deadline: config.request_deadline,
            db,
        }
    }

    /// Replaces the order service, e.g. to plug in a payment ledger.
    pub fn with_order_service(mut self, orders: OrderService) -> Self {
        self.orders = orders;
        self
    }
}
