//! Request API handlers.
//!
//! Every handler is a thin shim over the session store; pushes go through
//! the same relay path as push-channel `EVENT` messages so subscribers
//! cannot tell the two apart.

use axum::Json;
use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use bridge_core::protocol::ClientRole;
use bridge_core::session::{GlobalLogEntry, SessionState, SessionSummary, StoredEvent};
use bridge_core::{BridgeError, SessionId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::error::ApiError;
use crate::relay;
use crate::server::AppState;

/// Default page size for event listings.
pub const DEFAULT_EVENT_LIMIT: usize = 100;

/// `?limit=N` query.
#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    /// Max entries to return.
    pub limit: Option<usize>,
}

impl LimitQuery {
    fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_EVENT_LIMIT)
    }

    /// Resolve an extracted query, reporting a malformed one in the API's
    /// error shape instead of axum's plain-text rejection.
    fn resolve(query: Result<Query<Self>, QueryRejection>) -> Result<usize, ApiError> {
        match query {
            Ok(Query(query)) => Ok(query.limit()),
            Err(rejection) => {
                debug!(error = %rejection, "rejected limit query");
                Err(BridgeError::InvalidField("limit must be a non-negative integer").into())
            }
        }
    }
}

/// `GET /api/sessions`.
#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    sessions: Vec<SessionSummary>,
    total: usize,
}

/// `POST /api/sessions`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedSessionResponse {
    session_id: SessionId,
    session: SessionSummary,
}

/// `GET /api/sessions/{id}`.
#[derive(Debug, Serialize)]
pub struct SessionDetailResponse {
    session: SessionSummary,
    state: SessionState,
}

/// `DELETE /api/sessions/{id}`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedSessionResponse {
    session_id: SessionId,
    deleted: bool,
}

/// `GET /api/sessions/{id}/events`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEventsResponse {
    session_id: SessionId,
    events: Vec<StoredEvent>,
    total: u64,
}

/// `POST /api/sessions/{id}/events`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushEventResponse {
    success: bool,
    session_id: SessionId,
    event_count: usize,
}

/// `GET /api/sessions/{id}/metrics`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetricsResponse {
    session_id: SessionId,
    metrics: Map<String, Value>,
}

/// `GET /api/events`.
#[derive(Debug, Serialize)]
pub struct GlobalEventsResponse {
    events: Vec<GlobalLogEntry>,
    total: usize,
}

/// List every session, oldest first.
pub async fn list_sessions(State(state): State<AppState>) -> Json<SessionListResponse> {
    let sessions = state.store.list_sessions();
    Json(SessionListResponse {
        total: sessions.len(),
        sessions,
    })
}

/// Create an empty session.
pub async fn create_session(
    State(state): State<AppState>,
) -> (StatusCode, Json<CreatedSessionResponse>) {
    let session = state.store.create_session().lock().summary();
    (
        StatusCode::CREATED,
        Json(CreatedSessionResponse {
            session_id: session.id.clone(),
            session,
        }),
    )
}

/// Summary plus full state of one session.
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionDetailResponse>, ApiError> {
    let handle = state.store.get_session(&SessionId::from_raw(id))?;
    let session = handle.lock();
    Ok(Json(SessionDetailResponse {
        session: session.summary(),
        state: session.state(),
    }))
}

/// Remove a session. Attached connections stay open.
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeletedSessionResponse>, ApiError> {
    let session_id = SessionId::from_raw(id);
    state.store.delete_session(&session_id)?;
    Ok(Json(DeletedSessionResponse {
        session_id,
        deleted: true,
    }))
}

/// Most recent retained events plus the lifetime total.
pub async fn get_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
    query: Result<Query<LimitQuery>, QueryRejection>,
) -> Result<Json<SessionEventsResponse>, ApiError> {
    let session_id = SessionId::from_raw(id);
    let handle = state.store.get_session(&session_id)?;
    let limit = LimitQuery::resolve(query)?;
    let session = handle.lock();
    Ok(Json(SessionEventsResponse {
        events: session.recent_events(limit),
        total: session.total_events(),
        session_id,
    }))
}

/// Append an event and broadcast it to the session's connections.
///
/// The session is resolved before the body is inspected, so an unknown id
/// reports not-found even when the body is also invalid.
pub async fn push_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<PushEventResponse>, ApiError> {
    let session_id = SessionId::from_raw(id);
    let handle = state.store.get_session(&session_id)?;

    let event = if body.is_empty() {
        None
    } else {
        let mut body: Value = serde_json::from_slice(&body)
            .map_err(|_| BridgeError::InvalidField("Request body must be JSON"))?;
        body.get_mut("event")
            .map(Value::take)
            .filter(|event| !event.is_null())
    };

    let event_count = relay::ingest_event(&state.store, &handle, event, ClientRole::Producer)?;
    debug!(session_id = %session_id, event_count, "event pushed over http");
    Ok(Json(PushEventResponse {
        success: true,
        session_id,
        event_count,
    }))
}

/// Current metrics map of one session.
pub async fn get_metrics(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionMetricsResponse>, ApiError> {
    let session_id = SessionId::from_raw(id);
    let handle = state.store.get_session(&session_id)?;
    let metrics = handle.lock().metrics().clone();
    Ok(Json(SessionMetricsResponse {
        session_id,
        metrics,
    }))
}

/// Most recent entries of the cross-session log.
pub async fn global_events(
    State(state): State<AppState>,
    query: Result<Query<LimitQuery>, QueryRejection>,
) -> Result<Json<GlobalEventsResponse>, ApiError> {
    let (events, total) = state
        .store
        .global_log()
        .recent(LimitQuery::resolve(query)?);
    Ok(Json(GlobalEventsResponse { events, total }))
}
