//! Caller identity and authorization guards.

use std::sync::Arc;

use auth::{AuthError, Claims, Rule, authorize};
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use common::{OrderId, UserId};
use store::{Database, OrderStore};

use crate::error::ApiError;
use crate::state::AppState;

/// The authenticated caller of a request.
///
/// Extracting it runs the bearer token through the authenticator, so a
/// handler that takes a `Caller` only runs for verified, active accounts.
#[derive(Debug, Clone)]
pub struct Caller(pub Claims);

impl Caller {
    pub fn claims(&self) -> &Claims {
        &self.0
    }

    pub fn user_id(&self) -> Result<UserId, ApiError> {
        Ok(self.0.subject()?)
    }

    /// Evaluates `rule` against an optional resource owner.
    pub fn require(&self, rule: Rule, owner: Option<UserId>) -> Result<(), ApiError> {
        authorize(&self.0, owner, rule).map_err(|e| deny(&self.0, e))
    }

    /// Evaluates `rule` against the owner of `order_id`.
    ///
    /// A missing order is reported exactly like a failed rule so callers
    /// cannot probe for order ids they are not allowed to see.
    pub async fn require_for_order<D: Database>(
        &self,
        state: &AppState<D>,
        order_id: OrderId,
        rule: Rule,
    ) -> Result<(), ApiError> {
        let mut session = state.db.session().await?;
        match session.order_by_id(order_id).await? {
            Some(order) => self.require(rule, Some(order.user_id)),
            None => {
                tracing::debug!(%order_id, "order missing during authorization");
                Err(deny(&self.0, AuthError::Forbidden { rule: rule.as_str() }))
            }
        }
    }
}

fn deny(claims: &Claims, err: AuthError) -> ApiError {
    metrics::counter!("auth_failures_total", "reason" => err.reason()).increment(1);
    tracing::warn!(subject = %claims.sub, error = %err, "authorization rejected");
    err.into()
}

impl<D: Database> FromRequestParts<Arc<AppState<D>>> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState<D>>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();

        let claims = state.auth.authenticate(header).await?;
        Ok(Caller(claims))
    }
}
