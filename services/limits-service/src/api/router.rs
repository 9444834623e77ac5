use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::ApiState;

pub fn create_router(state: Arc<ApiState>) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(state.config.request_timeout()));

    Router::new()
        .route(
            "/api/tenants/:tenant_id/limits",
            get(handlers::usage_overview),
        )
        .route(
            "/api/tenants/:tenant_id/limits/:action",
            get(handlers::can_perform_action),
        )
        .route(
            "/api/tenants/:tenant_id/limits/:action/validate",
            post(handlers::validate_action),
        )
        .route(
            "/api/tenants/:tenant_id/records",
            post(handlers::create_record),
        )
        .route(
            "/api/tenants/:tenant_id/records/:action/:record_id",
            delete(handlers::delete_record),
        )
        .route(
            "/api/tenants/:tenant_id/subscription",
            get(handlers::get_subscription)
                .put(handlers::put_subscription)
                .delete(handlers::cancel_subscription),
        )
        .route("/health", get(handlers::health_check))
        .with_state(state)
        .layer(middleware)
}
