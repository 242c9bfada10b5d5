use std::time::Instant;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;

/// Captures method, URI, status, and duration. Statuses >= 400 log at
/// `error`; everything else logs at `info` (spec §4.6).
pub async fn logging_middleware(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let start = Instant::now();

    let response = next.run(req).await;

    let status = response.status();
    let duration = start.elapsed();

    if status.as_u16() >= 400 {
        tracing::error!(%method, %uri, status = status.as_u16(), ?duration, "http request");
    } else {
        tracing::info!(%method, %uri, status = status.as_u16(), ?duration, "http request");
    }

    response
}
