use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use reload_core::{SessionState, SessionStatus, WatchdogEvent};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    pub limit: Option<usize>,
    /// Only events of this kind, e.g. `reloaded`.
    pub kind: Option<String>,
}

#[derive(Serialize)]
pub struct EventsResponse {
    pub session_id: String,
    pub state: SessionState,
    pub events: Vec<WatchdogEvent>,
}

#[derive(Serialize)]
pub struct ReloadResponse {
    pub message: String,
    pub session_id: String,
}

pub async fn get_status(State(state): State<AppState>) -> Result<Json<SessionStatus>, ApiError> {
    Ok(Json(state.session()?.status()))
}

/// Newest first.
pub async fn get_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<EventsResponse>, ApiError> {
    if query.limit == Some(0) {
        return Err(ApiError::BadRequest("limit must be at least 1".into()));
    }

    let status = state.session()?.status();
    let events = status
        .events
        .into_iter()
        .filter(|e| query.kind.as_deref().map_or(true, |k| e.kind.as_str() == k))
        .take(query.limit.unwrap_or(usize::MAX))
        .collect();

    Ok(Json(EventsResponse {
        session_id: status.session_id,
        state: status.state,
        events,
    }))
}

pub async fn request_reload(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let handle = state.session()?;
    handle.reload().await?;
    let session_id = handle.status().session_id;

    tracing::info!(%session_id, "Reload requested over HTTP");
    Ok((
        StatusCode::ACCEPTED,
        Json(ReloadResponse {
            message: "Reload queued".into(),
            session_id,
        }),
    ))
}
