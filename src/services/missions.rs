//! Mission orchestration: assigning requests to a team and driving the
//! mission through its lifecycle.

use std::collections::HashSet;

use crate::access::{ensure_mutate, ensure_view, Resource};
use crate::db::Repository;
use crate::errors::AppError;
use crate::models::{Mission, MissionStatus, RequestStatus, Role, Session};

/// A mission with the owners of its requests, as the gate needs it.
struct Loaded {
    mission: Mission,
    requester_ids: Vec<String>,
}

impl Loaded {
    fn resource(&self) -> Resource<'_> {
        Resource::Mission {
            team_id: &self.mission.team_id,
            organization_id: &self.mission.organization_id,
            requester_ids: &self.requester_ids,
        }
    }
}

async fn load(repo: &Repository, id: &str) -> Result<Loaded, AppError> {
    let mission = repo
        .get_mission(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Mission {} not found", id)))?;
    let requester_ids = repo.mission_requester_ids(id).await?;
    Ok(Loaded {
        mission,
        requester_ids,
    })
}

/// Assign pending requests to a team.
///
/// Everything that can be judged up front is checked before the write, and
/// the repository re-checks availability inside its transaction so two
/// organizations racing for the same request cannot both win.
pub async fn create_mission(
    repo: &Repository,
    session: &Session,
    team_id: &str,
    request_ids: &[String],
) -> Result<Mission, AppError> {
    if request_ids.is_empty() {
        return Err(AppError::Validation(
            "A mission needs at least one request".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    let mut duplicates = Vec::new();
    for id in request_ids {
        if !seen.insert(id.as_str()) {
            duplicates.push(id.as_str());
        }
    }
    if !duplicates.is_empty() {
        return Err(AppError::Validation(format!(
            "Request ids are listed more than once: {}",
            duplicates.join(", ")
        )));
    }

    let team = repo
        .get_team(team_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Team {} not found", team_id)))?;
    let scope = repo.load_scope(session).await?;
    ensure_mutate(
        session,
        &scope,
        &Resource::Team {
            id: &team.id,
            organization_id: &team.organization_id,
        },
    )?;

    if !team.is_active {
        return Err(AppError::Validation(format!("Team {} is not active", team.id)));
    }
    if !team.has_leader() {
        return Err(AppError::Validation(format!(
            "Team {} has no leader",
            team.id
        )));
    }

    let mut contested = Vec::new();
    for request_id in request_ids {
        let request = repo
            .get_request(request_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Request {} not found", request_id)))?;
        let assignments = repo.request_assignments(request_id).await?;

        ensure_mutate(
            session,
            &scope,
            &Resource::HelpRequest {
                owner_id: &request.user_id,
                status: request.status,
                zone: &request.zone,
                assignments: &assignments,
            },
        )?;

        if let Some(active) = assignments.iter().find(|a| a.active) {
            tracing::debug!(request_id = %request_id, mission_id = %active.mission_id, "request already assigned");
            contested.push(request_id.clone());
        } else if request.status != RequestStatus::Pending {
            contested.push(request_id.clone());
        }
    }
    if !contested.is_empty() {
        return Err(AppError::Conflict {
            message: format!(
                "Requests are not available for a new mission: {}",
                contested.join(", ")
            ),
            request_ids: contested,
        });
    }

    let mission = repo.create_mission(&team.id, request_ids).await?;
    tracing::info!(
        mission_id = %mission.id,
        team_id = %team.id,
        requests = mission.request_ids.len(),
        "mission created"
    );
    Ok(mission)
}

/// Move a mission to its next status.
pub async fn advance_mission_status(
    repo: &Repository,
    session: &Session,
    id: &str,
    new_status: &str,
) -> Result<Mission, AppError> {
    let to: MissionStatus = new_status.trim().parse()?;
    let loaded = load(repo, id).await?;
    let scope = repo.load_scope(session).await?;
    ensure_view(session, &scope, &loaded.resource())?;

    let from = loaded.mission.status;
    if !from.can_advance_to(to) {
        return Err(AppError::InvalidTransition(match from.next() {
            Some(next) if !from.is_terminal() => format!(
                "Mission cannot move from {} to {}, next is {}",
                from, to, next
            ),
            _ => format!("Mission is {} and cannot move any further", from),
        }));
    }
    ensure_mutate(session, &scope, &loaded.resource())?;

    let mission = repo.advance_mission(id, from, to).await?;
    tracing::info!(
        mission_id = %id,
        from = %from,
        to = %to,
        by = %session.principal_id,
        "mission advanced"
    );
    Ok(mission)
}

/// Cancel a mission that has not started moving.
pub async fn cancel_mission(
    repo: &Repository,
    session: &Session,
    id: &str,
    reason: &str,
) -> Result<Mission, AppError> {
    let loaded = load(repo, id).await?;
    let scope = repo.load_scope(session).await?;
    ensure_view(session, &scope, &loaded.resource())?;

    if !loaded.mission.status.can_cancel() {
        return Err(AppError::InvalidTransition(format!(
            "Mission is {} and can only be cancelled while preparing",
            loaded.mission.status
        )));
    }
    ensure_mutate(session, &scope, &loaded.resource())?;

    let reason = reason.trim();
    let reason = (!reason.is_empty()).then_some(reason);
    repo.cancel_mission(id, reason).await
}

/// Get a visible mission.
pub async fn get_mission(
    repo: &Repository,
    session: &Session,
    id: &str,
) -> Result<Mission, AppError> {
    let loaded = load(repo, id).await?;
    let scope = repo.load_scope(session).await?;
    ensure_view(session, &scope, &loaded.resource())?;
    Ok(loaded.mission)
}

/// Missions visible to the caller, newest first.
pub async fn list_missions(repo: &Repository, session: &Session) -> Result<Vec<Mission>, AppError> {
    match session.role {
        Role::Admin => repo.list_all_missions().await,
        Role::Organization => {
            let scope = repo.load_scope(session).await?;
            let ids: Vec<String> = scope.organization_ids.into_iter().collect();
            repo.list_missions_for_organizations(&ids).await
        }
        Role::Rescuer => {
            let scope = repo.load_scope(session).await?;
            let ids: Vec<String> = scope.team_ids.into_iter().collect();
            repo.list_missions_for_teams(&ids).await
        }
        Role::Victim => repo.list_missions_for_requester(&session.principal_id).await,
    }
}
