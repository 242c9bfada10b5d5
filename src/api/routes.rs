use axum::extract::FromRef;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::metrics::{metrics_middleware, PipelineMetrics};
use crate::middleware::{gzip_middleware, logging_middleware, sign_middleware, SignState};
use crate::service::MetricService;

use super::handlers;

/// Shared router state. Sub-states are reachable via `FromRef` so handlers
/// can extract `State<MetricService>` directly (teacher's single-`PgPool`
/// state widened to a small struct now that the router carries more than
/// one collaborator).
#[derive(Clone)]
pub struct AppState {
    pub service: MetricService,
    pub sign: SignState,
    pub metrics: PipelineMetrics,
}

impl FromRef<AppState> for MetricService {
    fn from_ref(state: &AppState) -> Self {
        state.service.clone()
    }
}

impl FromRef<AppState> for SignState {
    fn from_ref(state: &AppState) -> Self {
        state.sign.clone()
    }
}

impl FromRef<AppState> for PipelineMetrics {
    fn from_ref(state: &AppState) -> Self {
        state.metrics.clone()
    }
}

async fn metrics_handler(axum::extract::State(state): axum::extract::State<AppState>) -> String {
    state.metrics.prometheus_handle.render()
}

pub fn create_router(state: AppState) -> Router {
    let sign_state = state.sign.clone();
    let metrics_state = state.metrics.clone();

    Router::new()
        .route("/", get(handlers::index))
        .route("/ping", get(handlers::ping))
        .route("/update/:kind/:id/:value", post(handlers::update_path))
        .route("/update/", post(handlers::update_json))
        .route("/updates/", post(handlers::update_batch))
        .route("/value/", post(handlers::get_value_json))
        .route("/value/:kind/:id", get(handlers::get_value_path))
        .route("/metrics", get(metrics_handler))
        .layer(middleware::from_fn_with_state(sign_state, sign_middleware))
        .layer(middleware::from_fn(gzip_middleware))
        .layer(middleware::from_fn_with_state(
            metrics_state,
            metrics_middleware,
        ))
        .layer(middleware::from_fn(logging_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
