//! Organization registration, approval and zone management.

use super::required;
use crate::access::{ensure_mutate, ensure_view, Resource};
use crate::db::Repository;
use crate::errors::AppError;
use crate::models::{
    AddDocumentRequest, Organization, OrganizationDocument, OrganizationStatus,
    RegisterOrganizationRequest, Role, Session, UpdateOrganizationRequest, ZoneSummary,
};

fn resource(organization: &Organization) -> Resource<'_> {
    Resource::Organization {
        owner_id: &organization.owner_profile_id,
    }
}

async fn load(repo: &Repository, id: &str) -> Result<Organization, AppError> {
    repo.get_organization(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Organization {} not found", id)))
}

/// Load an organization and check the caller may see it.
pub async fn get_organization(
    repo: &Repository,
    session: &Session,
    id: &str,
) -> Result<Organization, AppError> {
    let organization = load(repo, id).await?;
    let scope = repo.load_scope(session).await?;
    ensure_view(session, &scope, &resource(&organization))?;
    Ok(organization)
}

/// Load an organization the caller owns. Admins do not pass.
async fn load_owned(
    repo: &Repository,
    session: &Session,
    id: &str,
) -> Result<Organization, AppError> {
    let organization = get_organization(repo, session, id).await?;
    if session.role != Role::Organization {
        return Err(AppError::Forbidden(
            "Only the owning organization may do this".to_string(),
        ));
    }
    let scope = repo.load_scope(session).await?;
    ensure_mutate(session, &scope, &resource(&organization))?;
    Ok(organization)
}

fn require_admin(session: &Session) -> Result<(), AppError> {
    if session.role != Role::Admin {
        return Err(AppError::Forbidden(
            "Only an admin may review organizations".to_string(),
        ));
    }
    Ok(())
}

fn ensure_transition(
    organization: &Organization,
    to: OrganizationStatus,
) -> Result<(), AppError> {
    if !organization.status.can_transition_to(to) {
        return Err(AppError::InvalidTransition(format!(
            "Organization cannot move from {} to {}",
            organization.status.as_str(),
            to.as_str()
        )));
    }
    Ok(())
}

/// Register the caller's organization for review.
pub async fn register_organization(
    repo: &Repository,
    session: &Session,
    request: &RegisterOrganizationRequest,
) -> Result<Organization, AppError> {
    if session.role != Role::Organization {
        return Err(AppError::Forbidden(
            "Only organization accounts may register an organization".to_string(),
        ));
    }
    request.validate()?;

    let organization = repo.create_organization(&session.principal_id, request).await?;
    tracing::info!(organization_id = %organization.id, "organization registered");
    Ok(organization)
}

/// List organizations visible to the caller.
pub async fn list_organizations(
    repo: &Repository,
    session: &Session,
    status: Option<&str>,
) -> Result<Vec<Organization>, AppError> {
    let status = status
        .map(|s| s.parse::<OrganizationStatus>())
        .transpose()?;

    match session.role {
        Role::Admin => repo.list_organizations(status).await,
        Role::Organization => Ok(repo
            .get_organization_by_owner(&session.principal_id)
            .await?
            .into_iter()
            .filter(|o| status.is_none_or(|s| o.status == s))
            .collect()),
        Role::Victim | Role::Rescuer => Err(AppError::Forbidden(format!(
            "A {} may not list organizations",
            session.role
        ))),
    }
}

/// Change owner-editable details.
pub async fn update_organization(
    repo: &Repository,
    session: &Session,
    id: &str,
    patch: &UpdateOrganizationRequest,
) -> Result<Organization, AppError> {
    let current = get_organization(repo, session, id).await?;
    let scope = repo.load_scope(session).await?;
    ensure_mutate(session, &scope, &resource(&current))?;

    let merged = RegisterOrganizationRequest {
        name: patch.name.clone().unwrap_or(current.name.clone()),
        email: patch.email.clone().unwrap_or(current.email.clone()),
        phone: patch.phone.clone().unwrap_or(current.phone.clone()),
        address: patch.address.clone().unwrap_or(current.address.clone()),
        representative_name: patch
            .representative_name
            .clone()
            .unwrap_or(current.representative_name.clone()),
        representative_position: patch
            .representative_position
            .clone()
            .unwrap_or(current.representative_position.clone()),
    };
    merged.validate()?;

    let updated = Organization {
        name: merged.name.trim().to_string(),
        email: merged.email.trim().to_string(),
        phone: merged.phone.trim().to_string(),
        address: merged.address.trim().to_string(),
        representative_name: merged.representative_name.trim().to_string(),
        representative_position: merged.representative_position.trim().to_string(),
        ..current
    };
    repo.update_organization_details(&updated).await
}

/// Approve a pending organization.
pub async fn approve_organization(
    repo: &Repository,
    session: &Session,
    id: &str,
) -> Result<Organization, AppError> {
    require_admin(session)?;
    let organization = load(repo, id).await?;
    ensure_transition(&organization, OrganizationStatus::Approved)?;

    let approved = repo
        .set_organization_status(id, organization.status, OrganizationStatus::Approved, None)
        .await?;
    tracing::info!(organization_id = %id, admin = %session.principal_id, "organization approved");
    Ok(approved)
}

/// Reject a pending organization with a reason.
pub async fn reject_organization(
    repo: &Repository,
    session: &Session,
    id: &str,
    reason: &str,
) -> Result<Organization, AppError> {
    require_admin(session)?;
    let reason = required("reason", reason)?;
    let organization = load(repo, id).await?;
    ensure_transition(&organization, OrganizationStatus::Rejected)?;

    let rejected = repo
        .set_organization_status(
            id,
            organization.status,
            OrganizationStatus::Rejected,
            Some(&reason),
        )
        .await?;
    tracing::info!(organization_id = %id, admin = %session.principal_id, "organization rejected");
    Ok(rejected)
}

/// Send a rejected organization back for review. Clears the rejection reason.
pub async fn resubmit_organization(
    repo: &Repository,
    session: &Session,
    id: &str,
) -> Result<Organization, AppError> {
    let organization = load_owned(repo, session, id).await?;
    ensure_transition(&organization, OrganizationStatus::Pending)?;

    let resubmitted = repo
        .set_organization_status(id, organization.status, OrganizationStatus::Pending, None)
        .await?;
    tracing::info!(organization_id = %id, "organization resubmitted");
    Ok(resubmitted)
}

/// Replace the zones the organization serves.
pub async fn set_zones(
    repo: &Repository,
    session: &Session,
    id: &str,
    zones: &[String],
) -> Result<Vec<String>, AppError> {
    load_owned(repo, session, id).await?;

    let mut normalized = Vec::with_capacity(zones.len());
    for zone in zones {
        let zone = zone.trim();
        if !is_zone_key(zone) {
            return Err(AppError::Validation(format!(
                "'{}' is not a zone key of the form <lat>:<lng>",
                zone
            )));
        }
        if !normalized.iter().any(|z: &String| z == zone) {
            normalized.push(zone.to_string());
        }
    }

    repo.replace_zones(id, &normalized).await
}

/// Pending and reserved counts for each served zone.
pub async fn zone_summary(
    repo: &Repository,
    session: &Session,
    id: &str,
) -> Result<Vec<ZoneSummary>, AppError> {
    get_organization(repo, session, id).await?;
    repo.zone_summary(id).await
}

/// Attach a registration document reference.
pub async fn add_document(
    repo: &Repository,
    session: &Session,
    id: &str,
    request: &AddDocumentRequest,
) -> Result<OrganizationDocument, AppError> {
    load_owned(repo, session, id).await?;
    let file_name = required("fileName", &request.file_name)?;
    let file_path = required("filePath", &request.file_path)?;

    repo.add_document(id, &file_name, &file_path).await
}

/// List registration documents.
pub async fn list_documents(
    repo: &Repository,
    session: &Session,
    id: &str,
) -> Result<Vec<OrganizationDocument>, AppError> {
    get_organization(repo, session, id).await?;
    repo.list_documents(id).await
}

fn is_zone_key(zone: &str) -> bool {
    match zone.split_once(':') {
        Some((lat, lng)) => lat.parse::<i64>().is_ok() && lng.parse::<i64>().is_ok(),
        None => false,
    }
}
