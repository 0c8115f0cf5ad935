//! Ingestion endpoint: POST JSON body or GET image beacon.

use axum::extract::{Query, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, USER_AGENT};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use vantage_core::event::RawTrackingEvent;
use vantage_core::time::format_ts;

use crate::error::ApiError;
use crate::server::AppState;

/// 1×1 transparent GIF served to image beacons.
const TRANSPARENT_PIXEL: [u8; 43] = [
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xFF, 0xFF, 0xFF, 0x21, 0xF9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2C, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3B,
];

#[derive(Deserialize)]
pub struct BeaconQuery {
    /// URL-encoded JSON of the same shape as the POST body.
    pub data: Option<String>,
}

/// POST /track — synchronous ingestion with an acknowledgement body.
pub async fn post_track(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut raw): Json<RawTrackingEvent>,
) -> Result<Json<serde_json::Value>, ApiError> {
    fill_user_agent(&mut raw, &headers);
    let ack = state
        .ingestor
        .ingest(&raw, client_ip(&headers).as_deref(), Utc::now())?;

    Ok(Json(json!({
        "success": true,
        "event": ack.event,
        "customerId": ack.customer_id,
        "timestamp": format_ts(&ack.timestamp),
    })))
}

/// GET /track?data=… — fire-and-forget image-beacon fallback.
///
/// The response is always the transparent pixel, including on ingest
/// failure: the embedding page gets no error channel, only the log does.
pub async fn get_track(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<BeaconQuery>,
) -> Response {
    let mut raw: RawTrackingEvent = query
        .data
        .as_deref()
        .and_then(|data| serde_json::from_str(data).ok())
        .unwrap_or_default();
    fill_user_agent(&mut raw, &headers);

    if let Err(e) = state
        .ingestor
        .ingest(&raw, client_ip(&headers).as_deref(), Utc::now())
    {
        warn!(error = %e, "beacon event dropped");
    }

    (
        [
            (CONTENT_TYPE, "image/gif"),
            (CACHE_CONTROL, "no-store, no-cache, must-revalidate"),
        ],
        TRANSPARENT_PIXEL.to_vec(),
    )
        .into_response()
}

/// Prefer the payload's userAgent; fall back to the request header so
/// beacons that cannot set a body field still fingerprint.
fn fill_user_agent(raw: &mut RawTrackingEvent, headers: &HeaderMap) {
    if raw.user_agent.as_deref().map_or(true, str::is_empty) {
        raw.user_agent = headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
    }
}

/// Best-effort client IP from the forwarding chain.
fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
