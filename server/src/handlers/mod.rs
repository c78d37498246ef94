//! Request handlers for the traffic server surface

mod download;
mod upload;

pub use download::download;
pub use upload::upload;

use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};

use speedmark_common::PREFLIGHT_MAX_AGE_SECS;

use crate::AppState;

/// Resolve the allow-origin value for this request per the permissive
/// probe-endpoint policy.
pub(crate) fn allow_origin(state: &AppState, headers: &HeaderMap) -> String {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok());
    state.allow_list.resolve(origin)
}

/// Headers common to every measurement response: CORS disclosure, the
/// processing-duration timing header, and cache defeat (payloads must be
/// fetched fresh for every measurement).
pub(crate) fn measurement_headers(
    allow_origin: &str,
    server_time_ms: u64,
    expose: &'static str,
) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_str(allow_origin).unwrap_or(HeaderValue::from_static("*")),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, X-Requested-With"),
    );
    headers.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static(expose),
    );
    if let Ok(value) = HeaderValue::from_str(&format!("srv;dur={server_time_ms}")) {
        headers.insert("server-timing", value);
    }
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    headers
}

/// Short-circuit CORS preflight with a cached 204.
pub async fn preflight(State(state): State<AppState>, headers: HeaderMap) -> Response {
    preflight_response(&state, &headers)
}

pub(crate) fn preflight_response(state: &AppState, headers: &HeaderMap) -> Response {
    let allow = allow_origin(state, headers);
    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_str(&allow).unwrap_or(HeaderValue::from_static("*")),
    );
    response_headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    response_headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, X-Requested-With"),
    );
    response_headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_str(&PREFLIGHT_MAX_AGE_SECS.to_string())
            .unwrap_or(HeaderValue::from_static("86400")),
    );
    (StatusCode::NO_CONTENT, response_headers).into_response()
}

/// Liveness probe, no side effects.
pub async fn health() -> &'static str {
    "OK"
}

/// Preflight on unmatched paths still short-circuits; everything else is
/// not found.
pub async fn fallback(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    if method == Method::OPTIONS {
        return preflight_response(&state, &headers);
    }
    tracing::debug!("unmatched path: {} {}", method, uri);
    (StatusCode::NOT_FOUND, "Not Found").into_response()
}
