use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use hmac::{Hmac, Mac};
use sha2::Sha256;

const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

type HmacSha256 = Hmac<Sha256>;

/// Shared HMAC secret. An empty secret means the middleware is a
/// pass-through (spec §4.6).
#[derive(Clone, Default)]
pub struct SignState {
    pub secret: String,
}

/// Verifies the `HashSHA256` header against `HMAC-SHA256(secret, body)`
/// using constant-time comparison, then restores the body for the handler.
pub async fn sign_middleware(
    State(state): State<SignState>,
    req: Request,
    next: Next,
) -> Response {
    if state.secret.is_empty() {
        return next.run(req).await;
    }

    let Some(header_value) = req
        .headers()
        .get("HashSHA256")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
    else {
        return (StatusCode::BAD_REQUEST, "Signature required").into_response();
    };

    let Ok(expected_signature) = hex::decode(&header_value) else {
        return (StatusCode::BAD_REQUEST, "Invalid hash format").into_response();
    };

    let (parts, body) = req.into_parts();
    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(b) => b,
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };

    let mut mac = HmacSha256::new_from_slice(state.secret.as_bytes())
        .expect("HMAC accepts a key of any length");
    mac.update(&bytes);

    if mac.verify_slice(&expected_signature).is_err() {
        return (StatusCode::BAD_REQUEST, "Invalid signature").into_response();
    }

    let req = Request::from_parts(parts, Body::from(bytes));
    next.run(req).await
}

/// Computes the lowercase-hex HMAC-SHA256 used by both the server's
/// verification path and the agent reporter's signing path.
pub fn sign_hex(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts a key of any length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}
