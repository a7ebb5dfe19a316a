//! Mission endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{read, written, ApiResult};
use crate::models::{
    AdvanceMissionRequest, CancelMissionRequest, CreateMissionRequest, Mission, Session,
};
use crate::services::missions;
use crate::AppState;

/// GET /api/missions - Missions visible to the caller.
pub async fn list_missions(
    State(state): State<AppState>,
    session: Session,
) -> ApiResult<Vec<Mission>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    read(revision_id, missions::list_missions(&state.repo, &session).await)
}

/// POST /api/missions - Assign requests to a team.
pub async fn create_mission(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<CreateMissionRequest>,
) -> ApiResult<Mission> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    let result =
        missions::create_mission(&state.repo, &session, &request.team_id, &request.request_ids)
            .await;
    written(&state, revision_id, result).await
}

/// GET /api/missions/:id - Get one mission with its history.
pub async fn get_mission(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> ApiResult<Mission> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    read(revision_id, missions::get_mission(&state.repo, &session, &id).await)
}

/// POST /api/missions/:id/status - Advance to the next status.
pub async fn advance_mission(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Json(request): Json<AdvanceMissionRequest>,
) -> ApiResult<Mission> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    let result =
        missions::advance_mission_status(&state.repo, &session, &id, &request.status).await;
    written(&state, revision_id, result).await
}

/// POST /api/missions/:id/cancel - Cancel a preparing mission.
pub async fn cancel_mission(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Json(request): Json<CancelMissionRequest>,
) -> ApiResult<Mission> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    let result = missions::cancel_mission(&state.repo, &session, &id, &request.reason).await;
    written(&state, revision_id, result).await
}
