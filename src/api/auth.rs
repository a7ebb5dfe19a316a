//! Account and session endpoints.

use axum::{extract::State, Json};

use super::{read, written, ApiResult};
use crate::models::{Profile, Session, SessionResponse, SignInRequest, SignUpRequest};
use crate::services::identity;
use crate::AppState;

/// POST /api/auth/signup - Create an account and its profile.
pub async fn sign_up(
    State(state): State<AppState>,
    Json(request): Json<SignUpRequest>,
) -> ApiResult<Profile> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    let result = identity::sign_up(&state.repo, &state.config, &request).await;
    written(&state, revision_id, result).await
}

/// POST /api/auth/signin - Exchange credentials for a session token.
pub async fn sign_in(
    State(state): State<AppState>,
    Json(request): Json<SignInRequest>,
) -> ApiResult<SessionResponse> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    let result = identity::sign_in(&state.repo, &state.config, &request).await;
    written(&state, revision_id, result).await
}

/// POST /api/auth/signout - Revoke the bearer token.
pub async fn sign_out(State(state): State<AppState>, session: Session) -> ApiResult<()> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    read(revision_id, identity::sign_out(&state.repo, &session).await)
}

/// GET /api/auth/me - Profile behind the bearer token.
pub async fn me(State(state): State<AppState>, session: Session) -> ApiResult<Profile> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    read(
        revision_id,
        identity::resolve_profile(&state.repo, &session.principal_id).await,
    )
}
