use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use metrics_exporter_prometheus::PrometheusBuilder;
use tower::ServiceExt;

use crate::metrics::PipelineMetrics;
use crate::middleware::SignState;
use crate::repository::MemoryRepository;
use crate::service::MetricService;

use super::routes::{create_router, AppState};

fn test_state() -> AppState {
    let (_, prometheus_handle) = PrometheusBuilder::new().build().unwrap();
    let metrics = PipelineMetrics::new(prometheus_handle);
    AppState {
        service: MetricService::new(Arc::new(MemoryRepository::new()), metrics.clone()),
        sign: SignState::default(),
        metrics,
    }
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn counter_accumulates_across_path_updates() {
    let app = create_router(test_state());

    let req = Request::builder()
        .method("POST")
        .uri("/update/counter/hits/3")
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let req = Request::builder()
        .method("POST")
        .uri("/update/counter/hits/4")
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let req = Request::builder()
        .method("GET")
        .uri("/value/counter/hits")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_string(resp).await, "7");
}

#[tokio::test]
async fn gauge_overwrites_across_path_updates() {
    let app = create_router(test_state());

    for value in ["0.5", "0.75"] {
        let req = Request::builder()
            .method("POST")
            .uri(format!("/update/gauge/cpu/{value}"))
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let req = Request::builder()
        .method("GET")
        .uri("/value/gauge/cpu")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(body_string(resp).await, "0.75");
}

#[tokio::test]
async fn batch_json_update_then_json_read() {
    let app = create_router(test_state());

    let req = Request::builder()
        .method("POST")
        .uri("/updates/")
        .header("content-type", "application/json")
        .body(Body::from(
            r#"[{"id":"hits","type":"counter","delta":2},{"id":"cpu","type":"gauge","value":0.1}]"#,
        ))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_string(resp).await, r#"{"status":"ok"}"#);

    let req = Request::builder()
        .method("POST")
        .uri("/value/")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"id":"hits","type":"counter"}"#))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        body_string(resp).await,
        r#"{"id":"hits","type":"counter","delta":2}"#
    );
}

#[tokio::test]
async fn conflicting_kind_is_rejected() {
    let app = create_router(test_state());

    let req = Request::builder()
        .method("POST")
        .uri("/update/counter/hits/3")
        .body(Body::empty())
        .unwrap();
    assert_eq!(
        app.clone().oneshot(req).await.unwrap().status(),
        StatusCode::OK
    );

    let req = Request::builder()
        .method("POST")
        .uri("/update/gauge/hits/1.0")
        .body(Body::empty())
        .unwrap();
    assert_eq!(
        app.oneshot(req).await.unwrap().status(),
        StatusCode::BAD_REQUEST
    );
}

#[tokio::test]
async fn signed_request_is_accepted_and_tampered_signature_rejected() {
    let mut state = test_state();
    state.sign = SignState {
        secret: "s".to_string(),
    };
    let app = create_router(state);

    let body = r#"{"id":"hits","type":"counter","delta":1}"#;
    let signature = crate::middleware::sign_hex("s", body.as_bytes());

    let req = Request::builder()
        .method("POST")
        .uri("/update/")
        .header("content-type", "application/json")
        .header("HashSHA256", &signature)
        .body(Body::from(body))
        .unwrap();
    assert_eq!(app.clone().oneshot(req).await.unwrap().status(), StatusCode::OK);

    let req = Request::builder()
        .method("POST")
        .uri("/update/")
        .header("content-type", "application/json")
        .header("HashSHA256", "00")
        .body(Body::from(body))
        .unwrap();
    assert_eq!(
        app.oneshot(req).await.unwrap().status(),
        StatusCode::BAD_REQUEST
    );
}

#[tokio::test]
async fn ping_reports_repository_health() {
    let app = create_router(test_state());
    let req = Request::builder()
        .method("GET")
        .uri("/ping")
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.oneshot(req).await.unwrap().status(), StatusCode::OK);
}
