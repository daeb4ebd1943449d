use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{error, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{ScanRequest, ScanResponse, SessionResponse},
    ScanSession,
};
use crate::{
    auth::{
        extractors::{Actor, AuthUser},
        policy::{require, Capability},
    },
    state::AppState,
};

pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/events/:id/sessions", post(open_session))
        .route("/sessions/:id", get(session_status).delete(close_session))
        .route("/sessions/:id/scans", post(submit_scan))
}

/// Arms a scanning device for one event.
#[instrument(skip(state, actor), fields(user_id = %actor.user_id))]
pub async fn open_session(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(event_id): Path<String>,
) -> Result<(StatusCode, Json<SessionResponse>), (StatusCode, String)> {
    let event = match state.store.get_event(&event_id).await {
        Ok(Some(ev)) => ev,
        Ok(None) => return Err((StatusCode::NOT_FOUND, "Event not found".into())),
        Err(e) => {
            error!(error = %e, %event_id, "event lookup failed");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
        }
    };
    require(&actor, Capability::ScanEvent(&event))?;

    let session = ScanSession::open(
        event,
        &actor.user_id,
        state.store.clone(),
        &state.feed,
        state.scan_settings(),
    )
    .await;
    let session = state.sessions.insert(session);
    Ok((StatusCode::CREATED, Json(SessionResponse::from(session.as_ref()))))
}

#[instrument(skip(state, user), fields(user_id = %user.user_id))]
pub async fn session_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionResponse>, (StatusCode, String)> {
    let session = owned_session(&state, &user, &id)?;
    Ok(Json(SessionResponse::from(session.as_ref())))
}

#[instrument(skip(state, user, body), fields(user_id = %user.user_id))]
pub async fn submit_scan(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<ScanRequest>,
) -> Result<Json<ScanResponse>, (StatusCode, String)> {
    let session = owned_session(&state, &user, &id)?;
    let validator = session.validator();
    let disposition = validator.scan(&body.code).await;
    let cooldown_ms = validator.settings().cooldown.as_millis() as u64;
    Ok(Json(ScanResponse::new(disposition, cooldown_ms)))
}

/// Tears the session down and releases its live feed.
#[instrument(skip(state, user), fields(user_id = %user.user_id))]
pub async fn close_session(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    owned_session(&state, &user, &id)?;
    state.sessions.close(&id);
    Ok(StatusCode::NO_CONTENT)
}

/// Sessions are only visible to the organizer who opened them. A hit counts
/// as activity for the idle reaper.
pub(crate) fn owned_session(
    state: &AppState,
    user: &AuthUser,
    id: &Uuid,
) -> Result<Arc<ScanSession>, (StatusCode, String)> {
    match state.sessions.get(id) {
        Some(s) if s.organizer_id == user.user_id => {
            s.touch();
            Ok(s)
        }
        Some(_) => {
            warn!(session_id = %id, "session belongs to another organizer");
            Err((StatusCode::NOT_FOUND, "Session not found".into()))
        }
        None => Err((StatusCode::NOT_FOUND, "Session not found".into())),
    }
}
