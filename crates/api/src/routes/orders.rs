//! Order endpoints.

use std::sync::Arc;

use auth::Rule;
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{OrderId, OrderStatus, ProductId, UserId};
use domain::LineItem;
use serde::{Deserialize, Serialize};
use store::{Database, Order, OrderBy, OrderFilter, OrderItem, OrderWithItems, Page};

use crate::error::ApiError;
use crate::extract::Caller;
use crate::state::AppState;
use crate::transaction::with_transaction;

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub items: Vec<LineItemRequest>,
}

#[derive(Debug, Deserialize)]
pub struct LineItemRequest {
    pub product_id: String,
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

/// Query string accepted by the order listings.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<String>,
    pub rows: Option<String>,
    pub sort_by: Option<String>,
    pub start_created_date: Option<String>,
    pub end_created_date: Option<String>,
    pub user_id: Option<String>,
    pub status: Option<String>,
}

impl ListParams {
    fn page(&self) -> Result<Page, ApiError> {
        Ok(Page::parse(self.page.as_deref(), self.rows.as_deref())?)
    }

    fn order_by(&self) -> Result<OrderBy, ApiError> {
        Ok(OrderBy::parse(self.sort_by.as_deref())?)
    }

    fn filter(&self) -> Result<OrderFilter, ApiError> {
        let mut filter = OrderFilter::new();
        if let Some(raw) = &self.start_created_date {
            filter = filter.start_created_date(parse_date("start_created_date", raw)?);
        }
        if let Some(raw) = &self.end_created_date {
            filter = filter.end_created_date(parse_date("end_created_date", raw)?);
        }
        if let Some(raw) = &self.user_id {
            filter = filter.user_id(parse_id("user_id", raw, UserId::parse_str)?);
        }
        if let Some(raw) = &self.status {
            let status = raw
                .parse::<OrderStatus>()
                .map_err(|e| ApiError::BadRequest(e.to_string()))?;
            filter = filter.status(status);
        }
        Ok(filter)
    }
}

// -- Response types --

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub user_id: String,
    pub amount: i64,
    pub status: &'static str,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<OrderItemResponse>>,
}

#[derive(Debug, Serialize)]
pub struct OrderItemResponse {
    pub id: String,
    pub product_id: String,
    pub product_name: String,
    pub product_image_url: String,
    pub price: i64,
    pub quantity: i32,
}

#[derive(Debug, Serialize)]
pub struct OrderPage {
    pub items: Vec<OrderResponse>,
    pub total: u64,
    pub page: u32,
    pub rows_per_page: u32,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id.to_string(),
            user_id: order.user_id.to_string(),
            amount: order.amount.minor(),
            status: order.status.as_str(),
            date_created: order.date_created,
            date_updated: order.date_updated,
            items: None,
        }
    }
}

impl From<OrderItem> for OrderItemResponse {
    fn from(item: OrderItem) -> Self {
        Self {
            id: item.id.to_string(),
            product_id: item.product_id.to_string(),
            product_name: item.product_name,
            product_image_url: item.product_image_url,
            price: item.price.minor(),
            quantity: item.quantity,
        }
    }
}

impl From<OrderWithItems> for OrderResponse {
    fn from(full: OrderWithItems) -> Self {
        let items = full.items.into_iter().map(Into::into).collect();
        Self {
            items: Some(items),
            ..OrderResponse::from(full.order)
        }
    }
}

// -- Handlers --

/// POST /orders: place an order for the caller.
#[tracing::instrument(skip(state, caller, body))]
pub async fn create<D: Database>(
    State(state): State<Arc<AppState<D>>>,
    caller: Caller,
    body: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    caller.require(Rule::Any, None)?;
    let Json(req) = body?;
    let user_id = caller.user_id()?;

    let items = req
        .items
        .iter()
        .map(|item| {
            let product_id = parse_id("product_id", &item.product_id, ProductId::parse_str)?;
            Ok(LineItem::new(product_id, item.quantity))
        })
        .collect::<Result<Vec<_>, ApiError>>()?;

    let service = state.orders.clone();
    let order = with_transaction(&state.db, state.deadline, move |tx| {
        Box::pin(async move { Ok(service.create(tx, user_id, &items).await?) })
    })
    .await?;

    tracing::info!(order_id = %order.order.id, amount = %order.order.amount, "order placed");
    Ok((StatusCode::CREATED, Json(order.into())))
}

/// GET /orders/{id}: the order and its items, for an admin or the owner.
#[tracing::instrument(skip(state, caller))]
pub async fn get<D: Database>(
    State(state): State<Arc<AppState<D>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_id("order id", &id, OrderId::parse_str)?;
    caller
        .require_for_order(&*state, order_id, Rule::AdminOrOwner)
        .await?;

    let mut session = state.db.session().await?;
    let order = state
        .orders
        .query_by_id_with_items(&mut session, order_id)
        .await?;
    Ok(Json(order.into()))
}

/// GET /orders: filtered, sorted and paged listing of every order.
#[tracing::instrument(skip(state, caller))]
pub async fn list<D: Database>(
    State(state): State<Arc<AppState<D>>>,
    caller: Caller,
    Query(params): Query<ListParams>,
) -> Result<Json<OrderPage>, ApiError> {
    caller.require(Rule::Admin, None)?;
    let filter = params.filter()?;
    list_page(&*state, &filter, &params).await.map(Json)
}

/// GET /users/{user_id}/orders: the caller's own orders.
#[tracing::instrument(skip(state, caller))]
pub async fn list_for_user<D: Database>(
    State(state): State<Arc<AppState<D>>>,
    caller: Caller,
    Path(user_id): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<OrderPage>, ApiError> {
    let user_id = parse_id("user id", &user_id, UserId::parse_str)?;
    caller.require(Rule::Owner, Some(user_id))?;

    let filter = params.filter()?.user_id(caller.user_id()?);
    list_page(&*state, &filter, &params).await.map(Json)
}

async fn list_page<D: Database>(
    state: &AppState<D>,
    filter: &OrderFilter,
    params: &ListParams,
) -> Result<OrderPage, ApiError> {
    let page = params.page()?;
    let order_by = params.order_by()?;

    let mut session = state.db.session().await?;
    let orders = state
        .orders
        .query(&mut session, filter, order_by, page)
        .await?;
    let total = state.orders.count(&mut session, filter).await?;

    Ok(OrderPage {
        items: orders.into_iter().map(Into::into).collect(),
        total,
        page: page.number(),
        rows_per_page: page.rows_per_page(),
    })
}

/// PUT /orders/{id}/cancel: the owner withdraws an order.
#[tracing::instrument(skip(state, caller))]
pub async fn cancel<D: Database>(
    State(state): State<Arc<AppState<D>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_id("order id", &id, OrderId::parse_str)?;
    caller
        .require_for_order(&*state, order_id, Rule::Owner)
        .await?;

    let service = state.orders.clone();
    let order = with_transaction(&state.db, state.deadline, move |tx| {
        Box::pin(async move { Ok(service.cancel(tx, order_id).await?) })
    })
    .await?;
    Ok(Json(order.into()))
}

/// PUT /orders/{id}: an admin moves an order to another status.
#[tracing::instrument(skip(state, caller, body))]
pub async fn update_status<D: Database>(
    State(state): State<Arc<AppState<D>>>,
    caller: Caller,
    Path(id): Path<String>,
    body: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<Json<OrderResponse>, ApiError> {
    caller.require(Rule::Admin, None)?;
    let Json(req) = body?;
    let order_id = parse_id("order id", &id, OrderId::parse_str)?;
    let target = req
        .status
        .parse::<OrderStatus>()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let service = state.orders.clone();
    let order = with_transaction(&state.db, state.deadline, move |tx| {
        Box::pin(async move { Ok(service.transition(tx, order_id, target).await?) })
    })
    .await?;
    Ok(Json(order.into()))
}

/// DELETE /orders/{id}: an admin removes an order and its items.
#[tracing::instrument(skip(state, caller))]
pub async fn delete<D: Database>(
    State(state): State<Arc<AppState<D>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    caller.require(Rule::Admin, None)?;
    let order_id = parse_id("order id", &id, OrderId::parse_str)?;

    let service = state.orders.clone();
    with_transaction(&state.db, state.deadline, move |tx| {
        Box::pin(async move { Ok(service.delete(tx, order_id).await?) })
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

fn parse_id<T>(
    what: &str,
    raw: &str,
    parse: impl FnOnce(&str) -> Result<T, uuid::Error>,
) -> Result<T, ApiError> {
    parse(raw).map_err(|e| ApiError::BadRequest(format!("invalid {what}: {e}")))
}

fn parse_date(what: &str, raw: &str) -> Result<DateTime<Utc>, ApiError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| ApiError::BadRequest(format!("invalid {what}: {e}")))
}
