use std::str::FromStr;

use axum::extract::{Path, State};
use axum::response::{Html, IntoResponse};
use axum::Json;

use crate::model::{Metric, MetricKind};
use crate::service::MetricService;

use super::types::{ApiError, GetMetricRequest, StatusResponse};

/// `POST /update/{kind}/{id}/{value}` — legacy path-encoded update (spec §4.6).
pub async fn update_path(
    State(service): State<MetricService>,
    Path((kind, id, value)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = MetricKind::from_str(&kind)
        .map_err(|_| ApiError::BadRequest(format!("unknown metric kind: {kind}")))?;

    let metric = match kind {
        MetricKind::Counter => {
            let delta = value
                .parse::<i64>()
                .map_err(|_| ApiError::BadRequest(format!("invalid counter value: {value}")))?;
            Metric::counter(id, delta)
        }
        MetricKind::Gauge => {
            let parsed = value
                .parse::<f64>()
                .map_err(|_| ApiError::BadRequest(format!("invalid gauge value: {value}")))?;
            Metric::gauge(id, parsed)
        }
    };

    service.set(metric).await?;
    Ok(())
}

/// `POST /update/` — JSON single update.
pub async fn update_json(
    State(service): State<MetricService>,
    Json(metric): Json<Metric>,
) -> Result<Json<Metric>, ApiError> {
    service.set(metric.clone()).await?;
    Ok(Json(metric))
}

/// `POST /updates/` — atomic batch update.
pub async fn update_batch(
    State(service): State<MetricService>,
    Json(metrics): Json<Vec<Metric>>,
) -> Result<Json<StatusResponse>, ApiError> {
    service.set_batch(metrics).await?;
    Ok(Json(StatusResponse { status: "ok" }))
}

/// `POST /value/` — JSON read; echoes `id`, `type`, and `delta` or `value`.
pub async fn get_value_json(
    State(service): State<MetricService>,
    Json(req): Json<GetMetricRequest>,
) -> Result<Json<Metric>, ApiError> {
    let kind = MetricKind::from_str(&req.kind)
        .map_err(|_| ApiError::BadRequest(format!("unknown metric kind: {}", req.kind)))?;
    let metric = service.get(&req.id, kind).await?;
    Ok(Json(metric))
}

/// `GET /value/{kind}/{id}` — legacy text read; body is the numeric string.
pub async fn get_value_path(
    State(service): State<MetricService>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<String, ApiError> {
    let kind = MetricKind::from_str(&kind)
        .map_err(|_| ApiError::BadRequest(format!("unknown metric kind: {kind}")))?;
    let metric = service.get(&id, kind).await?;
    match kind {
        MetricKind::Counter => Ok(metric.delta.unwrap_or_default().to_string()),
        MetricKind::Gauge => Ok(metric.value.unwrap_or_default().to_string()),
    }
}

/// `GET /ping` — repository health.
pub async fn ping(State(service): State<MetricService>) -> Result<(), ApiError> {
    service.health().await?;
    Ok(())
}

/// `GET /` — liveness page.
pub async fn index() -> Html<&'static str> {
    Html("<html><body><h1>metrics pipeline</h1></body></html>")
}
