//! Configurable order policies.

use std::str::FromStr;

use async_trait::async_trait;
use common::OrderId;
use thiserror::Error;

use super::OrderError;

/// What deleting an order requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeletePolicy {
    /// Any order that is not finished may be deleted.
    #[default]
    UnlessFinished,

    /// As `UnlessFinished`, and the order must have no completed payment.
    UnlessFinishedOrPaid,
}

impl DeletePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeletePolicy::UnlessFinished => "unless_finished",
            DeletePolicy::UnlessFinishedOrPaid => "unless_finished_or_paid",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown delete policy {0:?}")]
pub struct ParseDeletePolicyError(pub String);

impl FromStr for DeletePolicy {
    type Err = ParseDeletePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unless_finished" => Ok(DeletePolicy::UnlessFinished),
            "unless_finished_or_paid" => Ok(DeletePolicy::UnlessFinishedOrPaid),
            other => Err(ParseDeletePolicyError(other.to_string())),
        }
    }
}

/// Knobs for behavior that is a business decision rather than an invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OrderPolicy {
    /// Put reserved stock back when an order is cancelled.
    pub restock_on_cancel: bool,

    pub delete: DeletePolicy,
}

impl OrderPolicy {
    pub fn with_restock_on_cancel(mut self, restock: bool) -> Self {
        self.restock_on_cancel = restock;
        self
    }

    pub fn with_delete(mut self, delete: DeletePolicy) -> Self {
        self.delete = delete;
        self
    }
}

/// Payment partner, consulted before deleting an order.
#[async_trait]
pub trait PaymentLedger: Send + Sync {
    /// Returns true if the order has at least one successful payment.
    async fn has_successful_payment(&self, order_id: OrderId) -> Result<bool, OrderError>;
}

/// Ledger for deployments without a payment partner.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPayments;

#[async_trait]
impl PaymentLedger for NoPayments {
    async fn has_successful_payment(&self, _order_id: OrderId) -> Result<bool, OrderError> {
        Ok(false)
    }
}
