//! Bearer token middleware for the protected API routes.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use tracing::debug;

use kvgate_storage::DataStore;

use super::routes::ApiError;
use super::state::AppState;

/// Username of the caller, inserted into request extensions once the bearer
/// token has been verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub username: String,
}

/// Extracts the token from an `Authorization: Bearer <token>` header.
fn bearer_token(request: &Request) -> Option<&str> {
    let value = request.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Rejects the request with 401 unless it carries a valid token for a user
/// that still exists.
pub async fn require_bearer<S: DataStore>(
    State(state): State<Arc<AppState<S>>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&request)
        .ok_or_else(|| ApiError::unauthorized("missing bearer token"))?;

    let username = state.auth.verify(token).map_err(|err| {
        debug!(error = %err, "token rejected");
        ApiError::from(err)
    })?;

    let ctx = state.request_context();
    state.auth.find_user(&ctx, &username).await.map_err(|err| {
        debug!(error = %err, %username, "token subject rejected");
        if err.is_unauthorized() {
            ApiError::unauthorized("invalid token")
        } else {
            ApiError::from(err)
        }
    })?;

    request
        .extensions_mut()
        .insert(AuthenticatedUser { username });
    Ok(next.run(request).await)
}
