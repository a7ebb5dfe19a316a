//! Help request endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};

use super::{read, written, ApiResult};
use crate::models::{
    CreateHelpRequest, HelpRequest, ListRequestsQuery, Session, TransitionRequest,
    UpdateHelpRequest,
};
use crate::services::requests;
use crate::AppState;

/// GET /api/requests - Requests visible to the caller.
///
/// Organizations may pass `organizationId` and `zone` to narrow to one zone.
pub async fn list_requests(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<ListRequestsQuery>,
) -> ApiResult<Vec<HelpRequest>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    read(
        revision_id,
        requests::list_requests(
            &state.repo,
            &session,
            query.organization_id.as_deref(),
            query.zone.as_deref(),
        )
        .await,
    )
}

/// POST /api/requests - File a help request.
pub async fn create_request(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<CreateHelpRequest>,
) -> ApiResult<HelpRequest> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    let result = requests::create_request(&state.repo, &state.config, &session, &request).await;
    written(&state, revision_id, result).await
}

/// GET /api/requests/:id - Get one request.
pub async fn get_request(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> ApiResult<HelpRequest> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    read(revision_id, requests::get_request(&state.repo, &session, &id).await)
}

/// PUT /api/requests/:id - Edit a pending request.
pub async fn update_request(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Json(request): Json<UpdateHelpRequest>,
) -> ApiResult<HelpRequest> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    let result =
        requests::update_request(&state.repo, &state.config, &session, &id, &request).await;
    written(&state, revision_id, result).await
}

/// POST /api/requests/:id/status - Move a request to a new status.
pub async fn transition_request(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Json(request): Json<TransitionRequest>,
) -> ApiResult<HelpRequest> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    let result =
        requests::transition_request_status(&state.repo, &session, &id, &request.status).await;
    written(&state, revision_id, result).await
}
