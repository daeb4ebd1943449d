use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use tracing::{error, info, instrument, warn};

use super::{
    dto::{EventRequest, ListEventsQuery, Ticket},
    services::{list_tickets, register_for_event, RegistrationError},
};
use crate::{
    auth::{
        extractors::Actor,
        policy::{require, Capability},
    },
    state::AppState,
    store::{Event, EventChanges, NewEvent, Registration},
};

pub fn event_routes() -> Router<AppState> {
    Router::new()
        .route("/events", post(create_event).get(list_events))
        .route("/events/:id", get(get_event).put(update_event))
        .route("/events/:id/registrations", post(register))
        .route("/me/tickets", get(my_tickets))
}

#[instrument(skip(state, actor, body), fields(user_id = %actor.user_id))]
pub async fn create_event(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(body): Json<EventRequest>,
) -> Result<(StatusCode, HeaderMap, Json<Event>), (StatusCode, String)> {
    require(&actor, Capability::CreateEvent)?;
    let fields = validated(body)?;

    let event = state
        .store
        .insert_event(NewEvent {
            name: fields.name,
            date: fields.date,
            location: fields.location,
            organizer_id: actor.user_id.clone(),
            restricted_branches: fields.restricted_branches,
        })
        .await
        .map_err(internal)?;

    info!(event_id = %event.id, "event created");
    let mut headers = HeaderMap::new();
    if let Ok(loc) = format!("/api/v1/events/{}", event.id).parse() {
        headers.insert(axum::http::header::LOCATION, loc);
    }
    Ok((StatusCode::CREATED, headers, Json(event)))
}

#[instrument(skip(state, actor, body), fields(user_id = %actor.user_id))]
pub async fn update_event(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<String>,
    Json(body): Json<EventRequest>,
) -> Result<Json<Event>, (StatusCode, String)> {
    let current = match state.store.get_event(&id).await {
        Ok(Some(ev)) => ev,
        Ok(None) => return Err((StatusCode::NOT_FOUND, "Event not found".into())),
        Err(e) => return Err(internal(e)),
    };
    require(&actor, Capability::EditEvent(&current))?;
    let changes = validated(body)?;

    match state.store.update_event(&id, changes).await {
        Ok(Some(ev)) => {
            info!(event_id = %ev.id, "event updated");
            Ok(Json(ev))
        }
        // Deleted between the read and the write.
        Ok(None) => Err((StatusCode::NOT_FOUND, "Event not found".into())),
        Err(e) => Err(internal(e)),
    }
}

#[instrument(skip(state, actor), fields(user_id = %actor.user_id))]
pub async fn list_events(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Query(q): Query<ListEventsQuery>,
) -> Result<Json<Vec<Event>>, (StatusCode, String)> {
    let organizer = q.mine.then_some(actor.user_id.as_str());
    let events = state
        .store
        .list_events(organizer, q.limit.clamp(1, 100))
        .await
        .map_err(internal)?;
    Ok(Json(events))
}

#[instrument(skip(state, _actor))]
pub async fn get_event(
    State(state): State<AppState>,
    _actor: Actor,
    Path(id): Path<String>,
) -> Result<Json<Event>, (StatusCode, String)> {
    match state.store.get_event(&id).await {
        Ok(Some(ev)) => Ok(Json(ev)),
        Ok(None) => Err((StatusCode::NOT_FOUND, "Event not found".into())),
        Err(e) => Err(internal(e)),
    }
}

#[instrument(skip(state, actor), fields(user_id = %actor.user_id))]
pub async fn register(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<Registration>), (StatusCode, String)> {
    require(&actor, Capability::RegisterForEvent)?;

    match register_for_event(state.store.as_ref(), state.notifier.as_ref(), &actor, &id).await {
        Ok(reg) => Ok((StatusCode::CREATED, Json(reg))),
        Err(RegistrationError::Store(e)) => {
            error!(error = %e, event_id = %id, "registration failed");
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Registration failed.".into()))
        }
        Err(e) => {
            warn!(error = %e, event_id = %id, "registration refused");
            let status = match e {
                RegistrationError::ProfileIncomplete => StatusCode::BAD_REQUEST,
                RegistrationError::NotEligible { .. } => StatusCode::FORBIDDEN,
                RegistrationError::AlreadyRegistered => StatusCode::CONFLICT,
                _ => StatusCode::NOT_FOUND,
            };
            Err((status, e.to_string()))
        }
    }
}

#[instrument(skip(state, actor), fields(user_id = %actor.user_id))]
pub async fn my_tickets(
    State(state): State<AppState>,
    Actor(actor): Actor,
) -> Result<Json<Vec<Ticket>>, (StatusCode, String)> {
    let tickets = list_tickets(state.store.as_ref(), &actor.user_id)
        .await
        .map_err(internal)?;
    Ok(Json(tickets))
}

/// Trims the request and drops blank branch names.
fn validated(body: EventRequest) -> Result<EventChanges, (StatusCode, String)> {
    let name = body.name.trim().to_string();
    let location = body.location.trim().to_string();
    if name.is_empty() || location.is_empty() {
        warn!("event without name or location");
        return Err((StatusCode::BAD_REQUEST, "name and location are required".into()));
    }
    Ok(EventChanges {
        name,
        date: body.date,
        location,
        restricted_branches: body
            .restricted_branches
            .into_iter()
            .map(|b| b.trim().to_string())
            .filter(|b| !b.is_empty())
            .collect(),
    })
}

fn internal<E: std::error::Error>(e: E) -> (StatusCode, String) {
    error!(error = %e, "store operation failed");
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Request},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::{
        app::build_app,
        auth::jwt::issue_test_token,
        store::{MemoryStore, Profile, RecordStore, Role},
    };

    async fn call(
        state: &AppState,
        method: &str,
        uri: &str,
        user: &str,
        body: Option<Value>,
    ) -> (StatusCode, HeaderMap, Value) {
        let token = issue_test_token(&state.config.jwt, user, None);
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.map_or_else(Body::empty, |v| Body::from(v.to_string())))
            .unwrap();
        let res = build_app(state.clone()).oneshot(req).await.unwrap();
        let status = res.status();
        let headers = res.headers().clone();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, headers, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn state_with_users() -> AppState {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_profile(Profile {
                role: Role::Organizer,
                ..Profile::new_student("o1")
            })
            .await
            .unwrap();
        store
            .upsert_profile(Profile {
                full_name: Some("Asha Rao".into()),
                roll_no: Some("21CS01".into()),
                department: Some("CSE".into()),
                mobile: Some("9000000001".into()),
                ..Profile::new_student("u1")
            })
            .await
            .unwrap();
        AppState::fake(store)
    }

    async fn store_organizer(state: &AppState, user_id: &str) {
        state
            .store
            .upsert_profile(Profile {
                role: Role::Organizer,
                ..Profile::new_student(user_id)
            })
            .await
            .unwrap();
    }

    fn new_event(branches: &[&str]) -> Value {
        json!({
            "name": "Code Sprint",
            "date": "2026-11-02T10:00:00Z",
            "location": "Lab 1",
            "restricted_branches": branches,
        })
    }

    #[tokio::test]
    async fn organizer_creates_and_lists_own_events() {
        let state = state_with_users().await;
        let (status, headers, ev) = call(&state, "POST", "/api/v1/events", "o1", Some(new_event(&[]))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(ev["organizer_id"], "o1");
        let id = ev["id"].as_str().unwrap();
        assert_eq!(
            headers[header::LOCATION].to_str().unwrap(),
            format!("/api/v1/events/{id}")
        );

        let (_, _, mine) = call(&state, "GET", "/api/v1/events?mine=true", "o1", None).await;
        assert_eq!(mine.as_array().unwrap().len(), 1);
        let (status, _, fetched) = call(&state, "GET", &format!("/api/v1/events/{id}"), "u1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["name"], "Code Sprint");
    }

    #[tokio::test]
    async fn owner_edits_event_and_others_cannot() {
        let state = state_with_users().await;
        store_organizer(&state, "o2").await;
        let (_, _, ev) = call(&state, "POST", "/api/v1/events", "o1", Some(new_event(&[]))).await;
        let uri = format!("/api/v1/events/{}", ev["id"].as_str().unwrap());
        let edit = json!({
            "name": "Code Sprint Finals",
            "date": "2026-11-09T10:00:00Z",
            "location": " Auditorium ",
            "restricted_branches": ["CSE", " "],
        });

        let (status, _, _) = call(&state, "PUT", &uri, "o2", Some(edit.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _, _) = call(&state, "PUT", &uri, "u1", Some(edit.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _, updated) = call(&state, "PUT", &uri, "o1", Some(edit)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["id"], ev["id"]);
        assert_eq!(updated["name"], "Code Sprint Finals");
        assert_eq!(updated["location"], "Auditorium");
        assert_eq!(updated["organizer_id"], "o1");
        assert_eq!(updated["restricted_branches"], json!(["CSE"]));

        let (_, _, fetched) = call(&state, "GET", &uri, "u1", None).await;
        assert_eq!(fetched["name"], "Code Sprint Finals");
    }

    #[tokio::test]
    async fn editing_unknown_or_blank_event_is_refused() {
        let state = state_with_users().await;
        let (status, _, _) =
            call(&state, "PUT", "/api/v1/events/missing", "o1", Some(new_event(&[]))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, _, ev) = call(&state, "POST", "/api/v1/events", "o1", Some(new_event(&[]))).await;
        let uri = format!("/api/v1/events/{}", ev["id"].as_str().unwrap());
        let blank = json!({"name": " ", "date": "2026-11-09T10:00:00Z", "location": "Lab 1"});
        let (status, _, _) = call(&state, "PUT", &uri, "o1", Some(blank)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn students_cannot_create_events() {
        let state = state_with_users().await;
        let (status, _, _) = call(&state, "POST", "/api/v1/events", "u1", Some(new_event(&[]))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn student_registers_once_and_sees_ticket() {
        let state = state_with_users().await;
        let (_, _, ev) = call(&state, "POST", "/api/v1/events", "o1", Some(new_event(&[]))).await;
        let id = ev["id"].as_str().unwrap();
        let uri = format!("/api/v1/events/{id}/registrations");

        let (status, _, reg) = call(&state, "POST", &uri, "u1", None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(reg["student_roll"], "21CS01");

        let (status, _, _) = call(&state, "POST", &uri, "u1", None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, _, tickets) = call(&state, "GET", "/api/v1/me/tickets", "u1", None).await;
        assert_eq!(tickets[0]["code"], format!("u1:{id}"));
        assert_eq!(tickets[0]["checked_in"], false);
    }

    #[tokio::test]
    async fn registration_refusals_map_to_statuses() {
        let state = state_with_users().await;
        let (_, _, ev) = call(&state, "POST", "/api/v1/events", "o1", Some(new_event(&["ECE"]))).await;
        let id = ev["id"].as_str().unwrap();

        let (status, _, _) =
            call(&state, "POST", &format!("/api/v1/events/{id}/registrations"), "u1", None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        // Unknown user: a student with an empty profile.
        let (status, _, _) =
            call(&state, "POST", &format!("/api/v1/events/{id}/registrations"), "u9", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _, _) =
            call(&state, "POST", "/api/v1/events/missing/registrations", "u1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
