//! Teams and their rescuer memberships.

use super::required;
use crate::access::{ensure_mutate, ensure_view, Resource};
use crate::db::Repository;
use crate::errors::AppError;
use crate::models::{OrganizationStatus, Role, Session, Team, UpdateTeamRequest};

fn resource(team: &Team) -> Resource<'_> {
    Resource::Team {
        id: &team.id,
        organization_id: &team.organization_id,
    }
}

async fn load(repo: &Repository, id: &str) -> Result<Team, AppError> {
    repo.get_team(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Team {} not found", id)))
}

/// Load a team the caller may change.
async fn load_mutable(repo: &Repository, session: &Session, id: &str) -> Result<Team, AppError> {
    let team = load(repo, id).await?;
    let scope = repo.load_scope(session).await?;
    ensure_view(session, &scope, &resource(&team))?;
    ensure_mutate(session, &scope, &resource(&team))?;
    Ok(team)
}

/// Create a team under an approved organization the caller owns.
pub async fn create_team(
    repo: &Repository,
    session: &Session,
    organization_id: &str,
    name: &str,
) -> Result<Team, AppError> {
    let organization = repo
        .get_organization(organization_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Organization {} not found", organization_id)))?;

    let scope = repo.load_scope(session).await?;
    ensure_mutate(
        session,
        &scope,
        &Resource::Team {
            id: "",
            organization_id: &organization.id,
        },
    )?;

    if organization.status != OrganizationStatus::Approved {
        tracing::warn!(
            organization_id = %organization.id,
            status = organization.status.as_str(),
            "team creation by unapproved organization"
        );
        return Err(AppError::Unauthorized(format!(
            "Organization is {} and cannot form teams until approved",
            organization.status.as_str()
        )));
    }

    let name = required("name", name)?;
    let team = repo.create_team(&organization.id, &name).await?;
    tracing::info!(team_id = %team.id, organization_id = %organization.id, "team created");
    Ok(team)
}

/// Get a visible team with its members.
pub async fn get_team(repo: &Repository, session: &Session, id: &str) -> Result<Team, AppError> {
    let team = load(repo, id).await?;
    let scope = repo.load_scope(session).await?;
    ensure_view(session, &scope, &resource(&team))?;
    Ok(team)
}

/// Teams visible to the caller.
pub async fn list_teams(repo: &Repository, session: &Session) -> Result<Vec<Team>, AppError> {
    match session.role {
        Role::Admin => repo.list_all_teams().await,
        Role::Organization => {
            let scope = repo.load_scope(session).await?;
            let mut teams = Vec::new();
            for organization_id in &scope.organization_ids {
                teams.extend(repo.list_teams_for_organization(organization_id).await?);
            }
            Ok(teams)
        }
        Role::Rescuer => repo.list_teams_for_member(&session.principal_id).await,
        Role::Victim => Err(AppError::Forbidden(
            "A victim may not list teams".to_string(),
        )),
    }
}

/// Rename a team or toggle whether it can take missions.
pub async fn update_team(
    repo: &Repository,
    session: &Session,
    id: &str,
    patch: &UpdateTeamRequest,
) -> Result<Team, AppError> {
    let team = load_mutable(repo, session, id).await?;

    let name = match &patch.name {
        Some(name) => required("name", name)?,
        None => team.name.clone(),
    };
    let is_active = patch.is_active.unwrap_or(team.is_active);

    let updated = repo.update_team(id, &name, is_active).await?;
    if is_active != team.is_active {
        tracing::info!(team_id = %id, is_active, "team activity changed");
    }
    Ok(updated)
}

/// Add a rescuer to a team, optionally as its leader.
pub async fn add_member(
    repo: &Repository,
    session: &Session,
    team_id: &str,
    user_id: &str,
    is_leader: bool,
) -> Result<Team, AppError> {
    load_mutable(repo, session, team_id).await?;

    let profile = repo
        .get_profile(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Profile {} not found", user_id)))?;
    if profile.role != Role::Rescuer {
        return Err(AppError::Validation(format!(
            "Only rescuers can join a team, {} is a {}",
            user_id, profile.role
        )));
    }

    let team = repo.upsert_team_member(team_id, user_id, is_leader).await?;
    if is_leader {
        tracing::info!(team_id = %team_id, leader = %user_id, "team leader assigned");
    }
    Ok(team)
}

/// Remove a member. Removing the leader leaves the team without one.
pub async fn remove_member(
    repo: &Repository,
    session: &Session,
    team_id: &str,
    user_id: &str,
) -> Result<Team, AppError> {
    load_mutable(repo, session, team_id).await?;
    repo.remove_team_member(team_id, user_id).await
}
