//! Organization endpoints: registration, review, zones and documents.

use axum::{
    extract::{Path, Query, State},
    Json,
};

use super::{read, written, ApiResult};
use crate::models::{
    AddDocumentRequest, ListOrganizationsQuery, Organization, OrganizationDocument,
    RegisterOrganizationRequest, RejectOrganizationRequest, Session, SetZonesRequest,
    UpdateOrganizationRequest, ZoneSummary,
};
use crate::services::organizations;
use crate::AppState;

/// GET /api/organizations - List organizations visible to the caller.
pub async fn list_organizations(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<ListOrganizationsQuery>,
) -> ApiResult<Vec<Organization>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    read(
        revision_id,
        organizations::list_organizations(&state.repo, &session, query.status.as_deref()).await,
    )
}

/// POST /api/organizations - Register the caller's organization.
pub async fn register_organization(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<RegisterOrganizationRequest>,
) -> ApiResult<Organization> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    let result = organizations::register_organization(&state.repo, &session, &request).await;
    written(&state, revision_id, result).await
}

/// GET /api/organizations/:id - Get one organization.
pub async fn get_organization(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> ApiResult<Organization> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    read(
        revision_id,
        organizations::get_organization(&state.repo, &session, &id).await,
    )
}

/// PUT /api/organizations/:id - Edit organization details.
pub async fn update_organization(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Json(request): Json<UpdateOrganizationRequest>,
) -> ApiResult<Organization> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    let result = organizations::update_organization(&state.repo, &session, &id, &request).await;
    written(&state, revision_id, result).await
}

/// POST /api/organizations/:id/approve - Admin approval.
pub async fn approve_organization(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> ApiResult<Organization> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    let result = organizations::approve_organization(&state.repo, &session, &id).await;
    written(&state, revision_id, result).await
}

/// POST /api/organizations/:id/reject - Admin rejection with a reason.
pub async fn reject_organization(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Json(request): Json<RejectOrganizationRequest>,
) -> ApiResult<Organization> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    let result =
        organizations::reject_organization(&state.repo, &session, &id, &request.reason).await;
    written(&state, revision_id, result).await
}

/// POST /api/organizations/:id/resubmit - Owner resubmits after rejection.
pub async fn resubmit_organization(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> ApiResult<Organization> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    let result = organizations::resubmit_organization(&state.repo, &session, &id).await;
    written(&state, revision_id, result).await
}

/// GET /api/organizations/:id/zones - Zones served.
pub async fn list_zones(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> ApiResult<Vec<String>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    read(
        revision_id,
        organizations::get_organization(&state.repo, &session, &id)
            .await
            .map(|o| o.zones),
    )
}

/// PUT /api/organizations/:id/zones - Replace zones served.
pub async fn set_zones(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Json(request): Json<SetZonesRequest>,
) -> ApiResult<Vec<String>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    let result = organizations::set_zones(&state.repo, &session, &id, &request.zones).await;
    written(&state, revision_id, result).await
}

/// GET /api/organizations/:id/zones/summary - Open request counts per zone.
pub async fn zone_summary(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> ApiResult<Vec<ZoneSummary>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    read(
        revision_id,
        organizations::zone_summary(&state.repo, &session, &id).await,
    )
}

/// GET /api/organizations/:id/documents - Registration documents.
pub async fn list_documents(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> ApiResult<Vec<OrganizationDocument>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    read(
        revision_id,
        organizations::list_documents(&state.repo, &session, &id).await,
    )
}

/// POST /api/organizations/:id/documents - Attach a document reference.
pub async fn add_document(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Json(request): Json<AddDocumentRequest>,
) -> ApiResult<OrganizationDocument> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    let result = organizations::add_document(&state.repo, &session, &id, &request).await;
    written(&state, revision_id, result).await
}
