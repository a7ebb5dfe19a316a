//! Own profile endpoints.

use axum::{extract::State, Json};

use super::{read, written, ApiResult};
use crate::models::{Profile, Session, UpdateProfileRequest};
use crate::services::identity;
use crate::AppState;

/// GET /api/profile - The caller's profile.
pub async fn get_profile(State(state): State<AppState>, session: Session) -> ApiResult<Profile> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    read(
        revision_id,
        identity::resolve_profile(&state.repo, &session.principal_id).await,
    )
}

/// PUT /api/profile - Change the caller's name or phone.
pub async fn update_profile(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<UpdateProfileRequest>,
) -> ApiResult<Profile> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    let result = identity::update_profile(&state.repo, &session, &request).await;
    written(&state, revision_id, result).await
}
