//! Null upload handler (`POST /__up`)
//!
//! The body content is irrelevant; only the drained byte count and the
//! server processing time matter to the client's throughput calculation.

use std::time::Instant;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use futures::StreamExt;
use serde::Serialize;

use crate::AppState;
use crate::metrics::MetricKind;

use super::{allow_origin, measurement_headers};

#[derive(Debug, Serialize)]
pub struct UploadReceipt {
    pub bytes: u64,
    #[serde(rename = "serverTime")]
    pub server_time_ms: u64,
}

pub async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let started = Instant::now();

    // Reject over-ceiling declarations before touching the body. A missing
    // or unparsable declaration is treated as zero; the drained length is
    // what gets reported either way.
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);
    if declared > state.max_upload_bytes {
        return (StatusCode::PAYLOAD_TOO_LARGE, "File too large").into_response();
    }

    let mut drained: u64 = 0;
    let mut stream = body.into_data_stream();
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(chunk) => drained += chunk.len() as u64,
            Err(e) => {
                tracing::debug!("upload body aborted after {} bytes: {}", drained, e);
                return (StatusCode::BAD_REQUEST, "Incomplete body").into_response();
            }
        }
    }

    let server_time_ms = started.elapsed().as_millis() as u64;

    let allow = allow_origin(&state, &headers);
    let mut response_headers = measurement_headers(&allow, server_time_ms, "Server-Timing");
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );

    if let Some(metrics) = &state.metrics {
        metrics.record(MetricKind::Upload, drained, server_time_ms, &headers);
    }

    (
        response_headers,
        Json(UploadReceipt {
            bytes: drained,
            server_time_ms,
        }),
    )
        .into_response()
}
