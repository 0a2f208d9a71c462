use std::sync::Arc;

use axum::{
    extract::State,
    http::Method,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, on},
    Json, Router,
};
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};

use crate::endpoint::{Endpoint, Endpoints};

use super::pool::worker_pool_middleware;
use super::state::ServeState;

const HEALTH_BODY: &str = "UP";

/// Full HTTP surface: the gated endpoints and status behind the worker pool,
/// health outside it.
pub fn build_router(state: ServeState) -> Router {
    let gated = endpoint_routes(state.endpoints())
        .route("/api/status", get(status_handler))
        .layer(middleware::from_fn_with_state(
            Arc::clone(state.pool()),
            worker_pool_middleware,
        ));

    Router::new()
        .route("/api/health", get(health_handler))
        .merge(gated)
        .layer(cors_layer())
        .with_state(state)
}

fn endpoint_routes(endpoints: &Endpoints) -> Router<ServeState> {
    endpoints.iter().fold(Router::new(), |router, endpoint| {
        let path = endpoint.config().path;
        let filter = endpoint.config().method.filter();
        let bound = Arc::clone(endpoint);
        router.route(
            path,
            on(filter, move |State(state): State<ServeState>| {
                let endpoint = Arc::clone(&bound);
                async move { gated_handler(endpoint, state).await }
            }),
        )
    })
}

async fn gated_handler(endpoint: Arc<Endpoint>, state: ServeState) -> Response {
    let outcome = endpoint.handle(state.shutdown_token()).await;
    endpoint.respond(outcome)
}

async fn status_handler(State(state): State<ServeState>) -> Json<Value> {
    Json(Value::Object(state.endpoints().status()))
}

async fn health_handler() -> impl IntoResponse {
    HEALTH_BODY
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
}
