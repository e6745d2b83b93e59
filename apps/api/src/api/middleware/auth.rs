use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::api::state::AppState;
use crate::auth::jwt::verify_token;

/// Caller identity for protected routes
///
/// Verifies the bearer token, scopes the request to the token's workspace
/// and charges the request against the caller's rate limit.
///
/// Usage:
/// ```rust,ignore
/// async fn protected_handler(auth: AuthContext) -> Result<String, ApiError> {
///     Ok(format!("Hello user {} in {}", auth.user_id, auth.workspace_id))
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub workspace_id: Uuid,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("Missing authorization header"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::unauthorized("Invalid authorization format. Use: Bearer <token>"))?;

        let claims = verify_token(token, &state.jwt_secret)
            .map_err(|e| ApiError::unauthorized(format!("Invalid token: {}", e)))?;

        state
            .services
            .rate_limiter
            .check(claims.workspace_id, claims.sub)
            .map_err(ApiError::from)?;

        Ok(AuthContext {
            user_id: claims.sub,
            workspace_id: claims.workspace_id,
        })
    }
}
