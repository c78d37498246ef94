//! Synthetic download handler (`GET /__down?bytes=<n>`)

use std::time::Instant;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use speedmark_common::MAX_DOWNLOAD_BYTES;

use crate::AppState;
use crate::metrics::MetricKind;
use crate::payload;

use super::{allow_origin, measurement_headers};

#[derive(Debug, Deserialize)]
pub struct DownloadParams {
    bytes: Option<String>,
}

pub async fn download(
    State(state): State<AppState>,
    Query(params): Query<DownloadParams>,
    headers: HeaderMap,
) -> Response {
    let started = Instant::now();

    // Missing parameter means an empty payload; anything non-numeric or
    // out of range is a client error.
    let bytes = match params.bytes.as_deref().unwrap_or("0").parse::<u64>() {
        Ok(bytes) if bytes <= MAX_DOWNLOAD_BYTES => bytes,
        _ => return (StatusCode::BAD_REQUEST, "Invalid file size").into_response(),
    };

    let body = payload::synthetic_body(bytes);
    let server_time_ms = started.elapsed().as_millis() as u64;

    let allow = allow_origin(&state, &headers);
    let mut response_headers =
        measurement_headers(&allow, server_time_ms, "Server-Timing, Content-Length");
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    if let Ok(value) = HeaderValue::from_str(&bytes.to_string()) {
        response_headers.insert(header::CONTENT_LENGTH, value);
    }

    if let Some(metrics) = &state.metrics {
        metrics.record(MetricKind::Download, bytes, server_time_ms, &headers);
    }

    (response_headers, body).into_response()
}
