use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, StatusCode},
};
use tracing::{error, warn};

use super::jwt::JwtKeys;
use crate::{state::AppState, store::Profile};

/// Caller identity from a verified bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub email: Option<String>,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        // Read Authorization header
        let auth = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or((StatusCode::UNAUTHORIZED, "missing Authorization header".into()))?;

        // Expect "Bearer <token>"
        let token = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .ok_or((StatusCode::UNAUTHORIZED, "invalid auth scheme".into()))?;

        let claims = JwtKeys::from_ref(state).verify(token).map_err(|e| {
            warn!(error = %e, "rejected bearer token");
            (StatusCode::UNAUTHORIZED, "invalid or expired token".to_string())
        })?;

        Ok(AuthUser {
            user_id: claims.sub,
            email: claims.email,
        })
    }
}

/// Authenticated caller together with their stored profile. Users the store
/// has not seen yet act as students with an empty profile.
#[derive(Debug, Clone)]
pub struct Actor(pub Profile);

#[async_trait]
impl FromRequestParts<AppState> for Actor {
    type Rejection = (StatusCode, String);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        let profile = state
            .store
            .get_profile(&user.user_id)
            .await
            .map_err(|e| {
                error!(error = %e, user_id = %user.user_id, "profile lookup failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "profile lookup failed".to_string())
            })?
            .unwrap_or_else(|| Profile {
                email: user.email.clone(),
                ..Profile::new_student(&user.user_id)
            });
        Ok(Actor(profile))
    }
}
