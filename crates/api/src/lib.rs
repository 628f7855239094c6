//! HTTP API server for the ecommerce order core.
//!
//! Exposes order placement, lookup, listing and lifecycle endpoints guarded
//! by bearer-token authentication and rule-based authorization, with
//! structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod extract;
pub mod routes;
pub mod state;
pub mod transaction;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use metrics_exporter_prometheus::PrometheusHandle;
use store::Database;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use error::ApiError;
pub use state::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<D: Database>(state: Arc<AppState<D>>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<D>))
        .route(
            "/orders",
            post(routes::orders::create::<D>).get(routes::orders::list::<D>),
        )
        .route(
            "/orders/{id}",
            get(routes::orders::get::<D>)
                .put(routes::orders::update_status::<D>)
                .delete(routes::orders::delete::<D>),
        )
        .route("/orders/{id}/cancel", put(routes::orders::cancel::<D>))
        .route(
            "/users/{user_id}/orders",
            get(routes::orders::list_for_user::<D>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
