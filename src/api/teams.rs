//! Team and membership endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{read, written, ApiResult};
use crate::models::{AddMemberRequest, CreateTeamRequest, Session, Team, UpdateTeamRequest};
use crate::services::teams;
use crate::AppState;

/// GET /api/teams - List teams visible to the caller.
pub async fn list_teams(State(state): State<AppState>, session: Session) -> ApiResult<Vec<Team>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    read(revision_id, teams::list_teams(&state.repo, &session).await)
}

/// POST /api/teams - Create a team.
pub async fn create_team(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<CreateTeamRequest>,
) -> ApiResult<Team> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    let result =
        teams::create_team(&state.repo, &session, &request.organization_id, &request.name).await;
    written(&state, revision_id, result).await
}

/// GET /api/teams/:id - Get a team with members.
pub async fn get_team(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> ApiResult<Team> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    read(revision_id, teams::get_team(&state.repo, &session, &id).await)
}

/// PUT /api/teams/:id - Rename or (de)activate a team.
pub async fn update_team(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Json(request): Json<UpdateTeamRequest>,
) -> ApiResult<Team> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    let result = teams::update_team(&state.repo, &session, &id, &request).await;
    written(&state, revision_id, result).await
}

/// POST /api/teams/:id/members - Add or update a member.
pub async fn add_member(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Json(request): Json<AddMemberRequest>,
) -> ApiResult<Team> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    let result = teams::add_member(
        &state.repo,
        &session,
        &id,
        &request.user_id,
        request.is_leader,
    )
    .await;
    written(&state, revision_id, result).await
}

/// DELETE /api/teams/:id/members/:user_id - Remove a member.
pub async fn remove_member(
    State(state): State<AppState>,
    session: Session,
    Path((id, user_id)): Path<(String, String)>,
) -> ApiResult<Team> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    let result = teams::remove_member(&state.repo, &session, &id, &user_id).await;
    written(&state, revision_id, result).await
}
