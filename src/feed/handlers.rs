use std::{convert::Infallible, time::Duration};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    routing::get,
    Json, Router,
};
use tokio_stream::{wrappers::WatchStream, Stream, StreamExt};
use tracing::{error, instrument};
use uuid::Uuid;

use super::{FeedSnapshot, LiveFeedView, RenderedFeed};
use crate::{
    auth::{
        extractors::{Actor, AuthUser},
        policy::{require, Capability},
    },
    checkin::handlers::owned_session,
    state::AppState,
};

pub fn feed_routes() -> Router<AppState> {
    Router::new()
        .route("/events/:id/attendance", get(attendance_snapshot))
        .route("/sessions/:id/feed", get(session_feed))
}

/// One-shot render of an event's most recent check-ins.
#[instrument(skip(state, actor), fields(user_id = %actor.user_id))]
pub async fn attendance_snapshot(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(event_id): Path<String>,
) -> Result<Json<RenderedFeed>, (StatusCode, String)> {
    let event = match state.store.get_event(&event_id).await {
        Ok(Some(ev)) => ev,
        Ok(None) => return Err((StatusCode::NOT_FOUND, "Event not found".into())),
        Err(e) => {
            error!(error = %e, %event_id, "event lookup failed");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
        }
    };
    require(&actor, Capability::ScanEvent(&event))?;

    let records = state
        .store
        .recent_attendance(&event.id, state.feed.limit() as i64)
        .await
        .map_err(|e| {
            error!(error = %e, %event_id, "attendance lookup failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;
    let view = LiveFeedView::new(state.config.checkin.display_offset);
    Ok(Json(view.render(&FeedSnapshot {
        generation: 0,
        records,
        stale: false,
    })))
}

/// Server-sent stream of the session's live feed. Each `feed` event carries a
/// full render; snapshots that would not change the screen are skipped. The
/// stream ends when the session is closed.
#[instrument(skip(state, user), fields(user_id = %user.user_id))]
pub async fn session_feed(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, (StatusCode, String)> {
    let session = owned_session(&state, &user, &id)?;
    let receiver = session.feed().watch();
    let mut view = LiveFeedView::new(state.config.checkin.display_offset);

    let stream = WatchStream::new(receiver)
        .filter_map(move |snapshot| view.apply(&snapshot))
        .filter_map(|rendered| match SseEvent::default().event("feed").json_data(&rendered) {
            Ok(event) => Some(Ok(event)),
            Err(e) => {
                error!(error = %e, "failed to encode feed frame");
                None
            }
        });

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Request},
    };
    use serde_json::Value;
    use time::OffsetDateTime;
    use tower::ServiceExt;

    use super::*;
    use crate::{
        app::build_app,
        auth::jwt::issue_test_token,
        store::{Event, MemoryStore, NewAttendance, Profile, RecordStore, Registration, Role},
    };

    async fn seeded() -> (AppState, Arc<MemoryStore>, Registration) {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_profile(Profile {
                role: Role::Organizer,
                ..Profile::new_student("o1")
            })
            .await
            .unwrap();
        store.seed_event(Event {
            id: "e1".into(),
            name: "Tech Fest".into(),
            date: OffsetDateTime::now_utc(),
            location: "Main Hall".into(),
            organizer_id: "o1".into(),
            restricted_branches: vec![],
        });
        let reg = Registration {
            id: Uuid::new_v4(),
            user_id: "u1".into(),
            event_id: "e1".into(),
            student_name: "asha Rao".into(),
            student_roll: "21CS01".into(),
            student_dept: None,
            registered_at: OffsetDateTime::now_utc(),
        };
        store.seed_registration(reg.clone());
        (AppState::fake(store.clone()), store, reg)
    }

    fn request(state: &AppState, method: &str, uri: &str, user: &str) -> Request<Body> {
        let token = issue_test_token(&state.config.jwt, user, None);
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    }

    async fn json(state: &AppState, uri: &str, user: &str) -> (StatusCode, Value) {
        let res = build_app(state.clone())
            .oneshot(request(state, "GET", uri, user))
            .await
            .unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn attendance_snapshot_renders_empty_then_entries() {
        let (state, store, reg) = seeded().await;

        let (status, body) = json(&state, "/api/v1/events/e1/attendance", "o1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "empty");
        assert_eq!(body["message"], "Ready to scan tickets...");

        store
            .insert_attendance_if_absent(NewAttendance::from_registration(
                &reg,
                "o1",
                OffsetDateTime::now_utc(),
            ))
            .await
            .unwrap();
        let (_, body) = json(&state, "/api/v1/events/e1/attendance", "o1").await;
        assert_eq!(body["state"], "entries");
        assert_eq!(body["count"], 1);
        assert_eq!(body["entries"][0]["display_initial"], "A");
        assert_eq!(body["entries"][0]["roll"], "21CS01");
    }

    #[tokio::test]
    async fn attendance_snapshot_is_limited_to_the_event_organizer() {
        let (state, _, _) = seeded().await;
        let (status, _) = json(&state, "/api/v1/events/e1/attendance", "someone").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = json(&state, "/api/v1/events/missing/attendance", "o1").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn session_feed_streams_the_current_render_first() {
        let (state, _, _) = seeded().await;
        let res = build_app(state.clone())
            .oneshot(request(&state, "POST", "/api/v1/events/e1/sessions", "o1"))
            .await
            .unwrap();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let session: Value = serde_json::from_slice(&bytes).unwrap();
        let id = session["session_id"].as_str().unwrap();

        let res = build_app(state.clone())
            .oneshot(request(&state, "GET", &format!("/api/v1/sessions/{id}/feed"), "o1"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            res.headers()[header::CONTENT_TYPE].to_str().unwrap(),
            "text/event-stream"
        );

        let mut frames = res.into_body().into_data_stream();
        let first = frames.next().await.unwrap().unwrap();
        let text = String::from_utf8(first.to_vec()).unwrap();
        assert!(text.contains("event: feed"));
        assert!(text.contains("Ready to scan tickets..."));
    }

    #[tokio::test]
    async fn session_feed_is_private_to_its_organizer() {
        let (state, _, _) = seeded().await;
        let (status, _) = json(
            &state,
            &format!("/api/v1/sessions/{}/feed", Uuid::new_v4()),
            "o1",
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
