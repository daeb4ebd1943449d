use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{ProfileResponse, SetRoleRequest, UpdateProfileRequest},
        extractors::{Actor, AuthUser},
        policy::{require, Capability},
    },
    state::AppState,
    store::Profile,
};

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_me))
        .route("/me/profile", put(update_profile))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new().route("/admin/roles", post(set_role))
}

#[instrument(skip(actor), fields(user_id = %actor.user_id))]
pub async fn get_me(Actor(actor): Actor) -> Json<ProfileResponse> {
    Json(actor.into())
}

#[instrument(skip(state, user, current, payload), fields(user_id = %user.user_id))]
pub async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    Actor(current): Actor,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<ProfileResponse>, (StatusCode, String)> {
    let full_name = payload.full_name.trim().to_string();
    if full_name.is_empty() {
        warn!("empty full name");
        return Err((StatusCode::BAD_REQUEST, "Full name is required".into()));
    }

    let tidy = |v: Option<String>| {
        v.map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };
    // Role is never taken from the request.
    let profile = Profile {
        user_id: current.user_id,
        email: user.email.or(current.email).map(|e| e.trim().to_lowercase()),
        full_name: Some(full_name),
        roll_no: tidy(payload.roll_no),
        department: tidy(payload.department),
        mobile: tidy(payload.mobile),
        role: current.role,
    };

    let saved = state.store.upsert_profile(profile).await.map_err(|e| {
        error!(error = %e, "upsert_profile failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    info!(complete = saved.is_complete(), "profile saved");
    Ok(Json(saved.into()))
}

#[instrument(skip(state, actor, payload), fields(user_id = %actor.user_id))]
pub async fn set_role(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(payload): Json<SetRoleRequest>,
) -> Result<Json<ProfileResponse>, (StatusCode, String)> {
    require(&actor, Capability::ManageRoles)?;

    let email = payload.email.trim().to_lowercase();
    match state.store.set_role_by_email(&email, payload.role).await {
        Ok(Some(p)) => {
            info!(target_user = %p.user_id, role = %p.role, "role updated");
            Ok(Json(p.into()))
        }
        Ok(None) => {
            warn!(%email, "role change for unknown email");
            Err((StatusCode::NOT_FOUND, "User not found".into()))
        }
        Err(e) => {
            error!(error = %e, "set_role_by_email failed");
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
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
        store::{MemoryStore, RecordStore, Role},
    };

    async fn call(
        state: &AppState,
        method: &str,
        uri: &str,
        user: &str,
        email: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let token = issue_test_token(&state.config.jwt, user, email);
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.map_or_else(Body::empty, |v| Body::from(v.to_string())))
            .unwrap();
        let res = build_app(state.clone()).oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn unknown_user_is_an_incomplete_student() {
        let state = AppState::fake(Arc::new(MemoryStore::new()));
        let (status, me) = call(&state, "GET", "/api/v1/me", "u1", Some("asha@campus.edu"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["role"], "student");
        assert_eq!(me["email"], "asha@campus.edu");
        assert_eq!(me["profile_complete"], false);
    }

    #[tokio::test]
    async fn profile_update_completes_profile_but_keeps_role() {
        let store = Arc::new(MemoryStore::new());
        let state = AppState::fake(store.clone());
        let body = json!({
            "full_name": " Asha Rao ",
            "roll_no": "21CS01",
            "department": "CSE",
            "mobile": "9876543210",
            "role": "superAdmin"
        });
        let (status, me) = call(&state, "PUT", "/api/v1/me/profile", "u1", None, Some(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["full_name"], "Asha Rao");
        assert_eq!(me["role"], "student");
        assert_eq!(me["profile_complete"], true);

        let stored = store.get_profile("u1").await.unwrap().unwrap();
        assert_eq!(stored.role, Role::Student);
    }

    #[tokio::test]
    async fn blank_name_is_refused() {
        let state = AppState::fake(Arc::new(MemoryStore::new()));
        let (status, _) = call(
            &state,
            "PUT",
            "/api/v1/me/profile",
            "u1",
            None,
            Some(json!({"full_name": "   "})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn only_staff_can_promote() {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_profile(Profile {
                role: Role::Faculty,
                ..Profile::new_student("f1")
            })
            .await
            .unwrap();
        store
            .upsert_profile(Profile {
                email: Some("bala@campus.edu".into()),
                ..Profile::new_student("u2")
            })
            .await
            .unwrap();
        let state = AppState::fake(store.clone());
        let promote = json!({"email": "Bala@Campus.edu", "role": "organizer"});

        let (status, _) = call(&state, "POST", "/api/v1/admin/roles", "u2", None, Some(promote.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = call(&state, "POST", "/api/v1/admin/roles", "f1", None, Some(promote)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["role"], "organizer");

        let (status, _) = call(
            &state,
            "POST",
            "/api/v1/admin/roles",
            "f1",
            None,
            Some(json!({"email": "ghost@campus.edu", "role": "organizer"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
