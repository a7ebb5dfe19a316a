//! Help request lifecycle.

use crate::access::{can_mutate, ensure_mutate, ensure_view, Assignment, Resource, Scope};
use crate::config::Config;
use crate::db::{now_timestamp, Repository};
use crate::errors::AppError;
use crate::models::{
    validate_fields, zone_for, CreateHelpRequest, HelpRequest, Location, RequestStatus, Role,
    Session, UpdateHelpRequest,
};

fn resource<'a>(request: &'a HelpRequest, assignments: &'a [Assignment]) -> Resource<'a> {
    Resource::HelpRequest {
        owner_id: &request.user_id,
        status: request.status,
        zone: &request.zone,
        assignments,
    }
}

/// A request with everything the gate needs to judge it.
struct Loaded {
    request: HelpRequest,
    assignments: Vec<Assignment>,
    scope: Scope,
}

async fn load_visible(repo: &Repository, session: &Session, id: &str) -> Result<Loaded, AppError> {
    let request = repo
        .get_request(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Request {} not found", id)))?;
    let assignments = repo.request_assignments(id).await?;
    let scope = repo.load_scope(session).await?;

    ensure_view(session, &scope, &resource(&request, &assignments))?;

    Ok(Loaded {
        request,
        assignments,
        scope,
    })
}

fn normalized_location(location: &Location) -> Location {
    Location {
        address: location.address.trim().to_string(),
        ..location.clone()
    }
}

/// File a new help request as the calling victim.
pub async fn create_request(
    repo: &Repository,
    config: &Config,
    session: &Session,
    payload: &CreateHelpRequest,
) -> Result<HelpRequest, AppError> {
    if session.role != Role::Victim {
        return Err(AppError::Forbidden(
            "Only victims can file help requests".to_string(),
        ));
    }
    payload.validate()?;

    let location = normalized_location(&payload.location);
    let request = HelpRequest {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: session.principal_id.clone(),
        zone: zone_for(location.lat, location.lng, config.zone_cell_degrees),
        location,
        needs: payload.needs.clone(),
        people_count: payload.people_count,
        details: payload.details.trim().to_string(),
        images: payload.images.iter().map(|u| u.trim().to_string()).collect(),
        status: RequestStatus::Pending,
        created_at: now_timestamp(),
    };

    let created = repo.create_request(&request).await?;
    tracing::info!(request_id = %created.id, zone = %created.zone, "help request filed");
    Ok(created)
}

/// Edit a pending request. Only its owner may, and the zone follows the location.
pub async fn update_request(
    repo: &Repository,
    config: &Config,
    session: &Session,
    id: &str,
    patch: &UpdateHelpRequest,
) -> Result<HelpRequest, AppError> {
    let Loaded { request, .. } = load_visible(repo, session, id).await?;

    if session.role != Role::Victim || request.user_id != session.principal_id {
        return Err(AppError::Forbidden(
            "Only the owner may edit a help request".to_string(),
        ));
    }
    if request.status != RequestStatus::Pending {
        return Err(AppError::conflict(format!(
            "Request {} is {} and can no longer be edited",
            id, request.status
        )));
    }

    let location = patch
        .location
        .as_ref()
        .map(normalized_location)
        .unwrap_or_else(|| request.location.clone());
    let needs = patch.needs.clone().unwrap_or_else(|| request.needs.clone());
    let people_count = patch.people_count.unwrap_or(request.people_count);
    let images = match &patch.images {
        Some(images) => images.iter().map(|u| u.trim().to_string()).collect(),
        None => request.images.clone(),
    };
    validate_fields(&location, &needs, people_count, &images)?;

    let updated = HelpRequest {
        zone: zone_for(location.lat, location.lng, config.zone_cell_degrees),
        location,
        needs,
        people_count,
        details: patch
            .details
            .as_deref()
            .map(|d| d.trim().to_string())
            .unwrap_or(request.details.clone()),
        images,
        ..request
    };

    repo.update_pending_request(&updated).await
}

/// Get a single visible request.
pub async fn get_request(
    repo: &Repository,
    session: &Session,
    id: &str,
) -> Result<HelpRequest, AppError> {
    Ok(load_visible(repo, session, id).await?.request)
}

/// The caller's own requests, newest first.
pub async fn list_requests_for_victim(
    repo: &Repository,
    session: &Session,
) -> Result<Vec<HelpRequest>, AppError> {
    if session.role != Role::Victim {
        return Err(AppError::Forbidden(
            "Only victims have their own requests".to_string(),
        ));
    }
    repo.list_requests_by_owner(&session.principal_id).await
}

/// Open requests inside an organization's zones, or in one of them.
pub async fn list_requests_for_zone(
    repo: &Repository,
    session: &Session,
    organization_id: &str,
    zone: Option<&str>,
) -> Result<Vec<HelpRequest>, AppError> {
    let organization = repo
        .get_organization(organization_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Organization {} not found", organization_id)))?;

    if session.role != Role::Organization || organization.owner_profile_id != session.principal_id
    {
        return Err(AppError::Forbidden(
            "Only the owning organization may browse its zones".to_string(),
        ));
    }

    match zone.map(str::trim).filter(|z| !z.is_empty()) {
        Some(zone) => {
            if !organization.zones.iter().any(|z| z == zone) {
                return Err(AppError::Forbidden(format!(
                    "Zone {} is not served by this organization",
                    zone
                )));
            }
            repo.list_open_requests_in_zones(&[zone.to_string()]).await
        }
        None => repo.list_open_requests_in_zones(&organization.zones).await,
    }
}

/// Requests visible to the caller, dispatched on role.
pub async fn list_requests(
    repo: &Repository,
    session: &Session,
    organization_id: Option<&str>,
    zone: Option<&str>,
) -> Result<Vec<HelpRequest>, AppError> {
    match session.role {
        Role::Victim => list_requests_for_victim(repo, session).await,
        Role::Organization => {
            let organization_id = match organization_id {
                Some(id) => id.to_string(),
                None => match repo.get_organization_by_owner(&session.principal_id).await? {
                    Some(organization) => organization.id,
                    None => return Ok(Vec::new()),
                },
            };
            list_requests_for_zone(repo, session, &organization_id, zone).await
        }
        Role::Rescuer => {
            let scope = repo.load_scope(session).await?;
            let team_ids: Vec<String> = scope.team_ids.into_iter().collect();
            repo.list_requests_for_teams(&team_ids).await
        }
        Role::Admin => repo.list_all_requests().await,
    }
}

/// Move a request along one edge of its state machine.
///
/// Checks run in order: visibility, edge legality, then whether this role may
/// take this edge. Only mission creation reserves a request, and forward moves
/// past that need an active mission of the caller's organization or team. The
/// write only lands if the status is still what was read.
pub async fn transition_request_status(
    repo: &Repository,
    session: &Session,
    id: &str,
    new_status: &str,
) -> Result<HelpRequest, AppError> {
    let to: RequestStatus = new_status.trim().parse()?;
    let Loaded {
        request,
        assignments,
        scope,
    } = load_visible(repo, session, id).await?;
    let from = request.status;

    if !from.can_transition_to(to) {
        if from.is_terminal() {
            return Err(AppError::InvalidTransition(format!(
                "Request is {} and cannot move any further",
                from
            )));
        }
        let allowed: Vec<&str> = from
            .allowed_next_states()
            .iter()
            .map(|s| s.as_str())
            .collect();
        return Err(AppError::InvalidTransition(format!(
            "Request cannot move from {} to {} (allowed: {})",
            from,
            to,
            allowed.join(", ")
        )));
    }

    let target = resource(&request, &assignments);
    match (session.role, to) {
        (Role::Admin, _) => {
            return Err(AppError::Forbidden(
                "Admins do not change request status".to_string(),
            ))
        }
        (_, RequestStatus::Reserved) => {
            return Err(AppError::Forbidden(
                "Requests are reserved by assigning them to a mission".to_string(),
            ))
        }
        (Role::Victim, RequestStatus::Cancelled) if from == RequestStatus::Pending => {
            ensure_mutate(session, &scope, &target)?
        }
        (Role::Victim, _) => {
            return Err(AppError::Forbidden(
                "A victim may only cancel a request that is still pending".to_string(),
            ))
        }
        (Role::Organization, RequestStatus::Cancelled) => ensure_mutate(session, &scope, &target)?,
        (Role::Organization, _) => {
            let on_own_mission = assignments
                .iter()
                .any(|a| a.active && scope.organization_ids.contains(&a.organization_id));
            if !on_own_mission {
                return Err(AppError::Forbidden(
                    "Organizations move requests forward only through their active missions"
                        .to_string(),
                ));
            }
        }
        (Role::Rescuer, RequestStatus::Cancelled) => {
            return Err(AppError::Forbidden(
                "Rescuers cannot cancel help requests".to_string(),
            ))
        }
        (Role::Rescuer, _) => {
            if !can_mutate(session, &scope, &target) {
                return Err(AppError::Forbidden(
                    "Rescuers act only on requests of an active mission of their team"
                        .to_string(),
                ));
            }
        }
    }

    let updated = repo.set_request_status(id, from, to).await?;
    tracing::info!(
        request_id = %id,
        from = %from,
        to = %to,
        by = %session.principal_id,
        "request status changed"
    );
    Ok(updated)
}
