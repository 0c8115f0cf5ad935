//! Tenant-scoped session read endpoints.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use vantage_core::ids::SessionId;
use vantage_core::scope::TenantScope;
use vantage_core::time::parse_ts;
use vantage_pipeline::{Score, INACTIVITY_THRESHOLD_SECS};
use vantage_store::{EventRow, SessionRow};

use crate::error::ApiError;
use crate::extract::Authenticated;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitorSummary {
    pub session_id: String,
    pub first_seen: String,
    pub last_seen: String,
    pub page_count: i64,
    pub event_count: i64,
    pub is_active: bool,
    pub score: Score,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitorList {
    pub visitors: Vec<VisitorSummary>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitorDetail {
    #[serde(flatten)]
    pub summary: VisitorSummary,
    pub events: Vec<EventView>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventView {
    pub id: String,
    pub name: String,
    pub domain: String,
    pub url: String,
    pub timestamp: String,
    pub data: serde_json::Value,
}

/// GET /visitors — session summaries for the caller's tenant, most
/// recently active first.
pub async fn list_visitors(
    State(state): State<AppState>,
    Authenticated(claims): Authenticated,
    Query(query): Query<ListQuery>,
) -> Result<Json<VisitorList>, ApiError> {
    let scope = claims.scope()?;
    let limit = query.limit.unwrap_or(100).min(500);
    let offset = query.offset.unwrap_or(0);

    let sessions = state.sessions.list_recent(&scope, limit, offset)?;
    let mut visitors = Vec::with_capacity(sessions.len());
    for session in sessions {
        visitors.push(summarize(&state, &scope, &session)?);
    }

    Ok(Json(VisitorList { visitors }))
}

/// GET /visitors/{session_id} — one session with its ordered events.
pub async fn get_visitor(
    State(state): State<AppState>,
    Authenticated(claims): Authenticated,
    Path(session_id): Path<String>,
) -> Result<Json<VisitorDetail>, ApiError> {
    let scope = claims.scope()?;
    let id = SessionId::from_raw(session_id);

    let session = state.sessions.get(&scope, &id)?;
    let summary = summarize(&state, &scope, &session)?;
    let events = state
        .sessions
        .events_for(&scope, &id)?
        .into_iter()
        .map(event_view)
        .collect();

    Ok(Json(VisitorDetail { summary, events }))
}

/// Scores are computed on the read path, never persisted: they stay
/// re-derivable from the event history.
fn summarize(
    state: &AppState,
    scope: &TenantScope,
    session: &SessionRow,
) -> Result<VisitorSummary, ApiError> {
    let now = Utc::now();
    let distinct = state.sessions.distinct_event_names(scope, &session.id)?;
    let visits = state
        .sessions
        .count_for_fingerprint(scope, &session.fingerprint_hash)?;
    let score = state.scoring.score(session, visits, distinct, now);

    let is_active = parse_ts(&session.last_seen)
        .map(|last_seen| now - last_seen < Duration::seconds(INACTIVITY_THRESHOLD_SECS))
        .unwrap_or(false);

    Ok(VisitorSummary {
        session_id: session.id.to_string(),
        first_seen: session.first_seen.clone(),
        last_seen: session.last_seen.clone(),
        page_count: session.page_count,
        event_count: session.event_count,
        is_active,
        score,
    })
}

fn event_view(row: EventRow) -> EventView {
    EventView {
        id: row.id.to_string(),
        name: row.name,
        domain: row.domain,
        url: row.url,
        timestamp: row.timestamp,
        data: row.payload,
    }
}
