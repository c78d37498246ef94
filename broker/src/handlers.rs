//! Credential issuance handlers
//!
//! Authorization rides on the `Referer` header rather than an API key:
//! only requests originating from known front-end pages may mint relay
//! credentials. The same validated origin is echoed back as the CORS
//! allow-origin, so authorization and CORS disclosure share one trust
//! signal.

use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};
use url::Url;

use speedmark_common::turn::{TurnCredentials, filter_udp_relay_urls};
use speedmark_common::{PREFLIGHT_MAX_AGE_SECS, SpeedmarkError};

use crate::AppState;

/// Upstream response shape: `{ "iceServers": { urls, username, credential } }`.
#[derive(Debug, Deserialize)]
struct UpstreamCredentials {
    #[serde(rename = "iceServers")]
    ice_servers: IceServers,
}

#[derive(Debug, Deserialize)]
struct IceServers {
    urls: Vec<String>,
    username: String,
    credential: String,
}

pub async fn turn_credentials(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    if method == Method::OPTIONS {
        return preflight(&state, &headers);
    }

    // A missing or unparsable referrer is always rejected; with a
    // non-wildcard allow-list the referrer origin must also be listed.
    let Some(referrer_origin) = referrer_origin(&headers) else {
        debug!("rejecting credential request without a usable referrer");
        return unauthorized();
    };
    if !state.allow_list.is_wildcard() && !state.allow_list.contains(&referrer_origin) {
        debug!("rejecting credential request from {}", referrer_origin);
        return unauthorized();
    }

    let creds = match issue_credentials(&state).await {
        Ok(creds) => creds,
        Err(err) => {
            // Upstream detail stays in the server log; the client only
            // ever sees an opaque 500.
            warn!("relay credential issuance failed: {}", err);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Internal server error" })),
            )
                .into_response();
        }
    };

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_str(&referrer_origin).unwrap_or(HeaderValue::from_static("*")),
    );
    response_headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    response_headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, X-Requested-With"),
    );

    (response_headers, Json(creds)).into_response()
}

/// Call the upstream relay credential service and filter its URL list
/// down to UDP-transport relay entries.
async fn issue_credentials(state: &AppState) -> Result<TurnCredentials, SpeedmarkError> {
    let response = state
        .http
        .post(state.upstream_url())
        .bearer_auth(&state.token_secret)
        .json(&json!({ "ttl": state.ttl_seconds }))
        .send()
        .await
        .map_err(|e| SpeedmarkError::Upstream(format!("request failed: {}", e)))?;

    let status = response.status();
    if status != reqwest::StatusCode::CREATED {
        let body = response.text().await.unwrap_or_default();
        return Err(SpeedmarkError::Upstream(format!(
            "bad response ({}): {}",
            status, body
        )));
    }

    let upstream: UpstreamCredentials = response
        .json()
        .await
        .map_err(|e| SpeedmarkError::Upstream(format!("malformed credentials: {}", e)))?;

    Ok(TurnCredentials {
        urls: filter_udp_relay_urls(&upstream.ice_servers.urls),
        username: upstream.ice_servers.username,
        credential: upstream.ice_servers.credential,
    })
}

fn referrer_origin(headers: &HeaderMap) -> Option<String> {
    let referrer = headers.get(header::REFERER)?.to_str().ok()?;
    let url = Url::parse(referrer).ok()?;
    let origin = url.origin();
    if origin.is_tuple() {
        Some(origin.ascii_serialization())
    } else {
        None
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": "Unauthorized" })),
    )
        .into_response()
}

fn preflight(state: &AppState, headers: &HeaderMap) -> Response {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok());
    let allow = state.allow_list.resolve(origin);

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

pub async fn fallback(State(state): State<AppState>, method: Method, headers: HeaderMap) -> Response {
    if method == Method::OPTIONS {
        return preflight(&state, &headers);
    }
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "Not found" })),
    )
        .into_response()
}
