//! Role-based view gate.
//!
//! Pure decision functions over a session, the principal's affiliations and a
//! resource descriptor. Anything not explicitly granted is denied.

use std::collections::HashSet;

use crate::errors::AppError;
use crate::models::{RequestStatus, Role, Session};

/// Affiliations of a principal, loaded from the store once per operation.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    /// Organizations owned by the principal
    pub organization_ids: HashSet<String>,
    /// Zones served by those organizations
    pub zones: HashSet<String>,
    /// Teams the principal is a member of
    pub team_ids: HashSet<String>,
    /// Teams the principal leads
    pub led_team_ids: HashSet<String>,
}

/// A mission that links a help request.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub mission_id: String,
    pub team_id: String,
    pub organization_id: String,
    pub active: bool,
}

/// Descriptor of the thing being accessed.
#[derive(Debug, Clone, Copy)]
pub enum Resource<'a> {
    HelpRequest {
        owner_id: &'a str,
        status: RequestStatus,
        zone: &'a str,
        assignments: &'a [Assignment],
    },
    Organization {
        owner_id: &'a str,
    },
    Team {
        id: &'a str,
        organization_id: &'a str,
    },
    Mission {
        team_id: &'a str,
        organization_id: &'a str,
        requester_ids: &'a [String],
    },
}

impl Resource<'_> {
    fn kind(&self) -> &'static str {
        match self {
            Resource::HelpRequest { .. } => "help request",
            Resource::Organization { .. } => "organization",
            Resource::Team { .. } => "team",
            Resource::Mission { .. } => "mission",
        }
    }
}

/// Decide whether the principal may observe the resource.
pub fn can_view(session: &Session, scope: &Scope, resource: &Resource<'_>) -> bool {
    match (session.role, resource) {
        (Role::Admin, _) => true,

        (Role::Victim, Resource::HelpRequest { owner_id, .. }) => *owner_id == session.principal_id,
        (Role::Victim, Resource::Mission { requester_ids, .. }) => {
            requester_ids.iter().any(|id| *id == session.principal_id)
        }

        (
            Role::Organization,
            Resource::HelpRequest {
                zone, assignments, ..
            },
        ) => {
            scope.zones.contains(*zone)
                || assignments
                    .iter()
                    .any(|a| scope.organization_ids.contains(&a.organization_id))
        }
        (Role::Organization, Resource::Organization { owner_id, .. }) => {
            *owner_id == session.principal_id
        }
        (
            Role::Organization,
            Resource::Team {
                organization_id, ..
            },
        )
        | (
            Role::Organization,
            Resource::Mission {
                organization_id, ..
            },
        ) => scope.organization_ids.contains(*organization_id),

        (Role::Rescuer, Resource::HelpRequest { assignments, .. }) => assignments
            .iter()
            .any(|a| scope.team_ids.contains(&a.team_id)),
        (Role::Rescuer, Resource::Team { id, .. }) => scope.team_ids.contains(*id),
        (Role::Rescuer, Resource::Mission { team_id, .. }) => scope.team_ids.contains(*team_id),

        _ => false,
    }
}

/// Decide whether the principal may change the resource.
pub fn can_mutate(session: &Session, scope: &Scope, resource: &Resource<'_>) -> bool {
    match (session.role, resource) {
        (Role::Admin, Resource::Organization { .. }) => true,

        (
            Role::Victim,
            Resource::HelpRequest {
                owner_id, status, ..
            },
        ) => *owner_id == session.principal_id && *status == RequestStatus::Pending,

        (Role::Organization, Resource::HelpRequest { .. })
        | (Role::Organization, Resource::Organization { .. })
        | (Role::Organization, Resource::Team { .. })
        | (Role::Organization, Resource::Mission { .. }) => can_view(session, scope, resource),

        // Rescuers act on requests only through an active mission of their team
        (Role::Rescuer, Resource::HelpRequest { assignments, .. }) => assignments
            .iter()
            .any(|a| a.active && scope.team_ids.contains(&a.team_id)),
        (Role::Rescuer, Resource::Mission { team_id, .. }) => {
            scope.led_team_ids.contains(*team_id)
        }

        _ => false,
    }
}

/// Fail closed with `Forbidden` unless the resource is visible.
pub fn ensure_view(
    session: &Session,
    scope: &Scope,
    resource: &Resource<'_>,
) -> Result<(), AppError> {
    if can_view(session, scope, resource) {
        Ok(())
    } else {
        tracing::debug!(
            principal = %session.principal_id,
            role = %session.role,
            "view of {} denied",
            resource.kind()
        );
        Err(AppError::Forbidden(format!(
            "A {} may not view this {}",
            session.role,
            resource.kind()
        )))
    }
}

/// Fail closed with `Forbidden` unless the resource may be changed.
pub fn ensure_mutate(
    session: &Session,
    scope: &Scope,
    resource: &Resource<'_>,
) -> Result<(), AppError> {
    if can_mutate(session, scope, resource) {
        Ok(())
    } else {
        tracing::debug!(
            principal = %session.principal_id,
            role = %session.role,
            "mutation of {} denied",
            resource.kind()
        );
        Err(AppError::Forbidden(format!(
            "A {} may not change this {}",
            session.role,
            resource.kind()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(id: &str, role: Role) -> Session {
        Session {
            principal_id: id.to_string(),
            role,
            token: "t".to_string(),
        }
    }

    fn set(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn assignment(team: &str, org: &str, active: bool) -> Assignment {
        Assignment {
            mission_id: "m1".to_string(),
            team_id: team.to_string(),
            organization_id: org.to_string(),
            active,
        }
    }

    fn request<'a>(
        owner: &'a str,
        status: RequestStatus,
        zone: &'a str,
        assignments: &'a [Assignment],
    ) -> Resource<'a> {
        Resource::HelpRequest {
            owner_id: owner,
            status,
            zone,
            assignments,
        }
    }

    #[test]
    fn test_victim_sees_only_own_requests() {
        let victim = session("v1", Role::Victim);
        let scope = Scope::default();

        assert!(can_view(&victim, &scope, &request("v1", RequestStatus::Pending, "1:1", &[])));
        assert!(!can_view(&victim, &scope, &request("v2", RequestStatus::Pending, "1:1", &[])));
    }

    #[test]
    fn test_victim_mutates_only_while_pending() {
        let victim = session("v1", Role::Victim);
        let scope = Scope::default();

        assert!(can_mutate(&victim, &scope, &request("v1", RequestStatus::Pending, "1:1", &[])));
        assert!(!can_mutate(&victim, &scope, &request("v1", RequestStatus::Reserved, "1:1", &[])));
        assert!(!can_mutate(&victim, &scope, &request("v2", RequestStatus::Pending, "1:1", &[])));
    }

    #[test]
    fn test_organization_zone_scoped_requests() {
        let org = session("o-owner", Role::Organization);
        let scope = Scope {
            organization_ids: set(&["org1"]),
            zones: set(&["1:1"]),
            ..Scope::default()
        };
        let elsewhere = [assignment("team1", "org1", true)];

        assert!(can_view(&org, &scope, &request("v1", RequestStatus::Pending, "1:1", &[])));
        assert!(!can_view(&org, &scope, &request("v1", RequestStatus::Pending, "9:9", &[])));
        // Out of zone but dispatched by this organization
        assert!(can_mutate(&org, &scope, &request("v1", RequestStatus::Reserved, "9:9", &elsewhere)));
    }

    #[test]
    fn test_rescuer_sees_requests_through_team_missions() {
        let rescuer = session("r1", Role::Rescuer);
        let scope = Scope {
            team_ids: set(&["team1"]),
            ..Scope::default()
        };
        let mine = [assignment("team1", "org1", true)];
        let done = [assignment("team1", "org1", false)];
        let other = [assignment("team2", "org1", true)];

        assert!(can_view(&rescuer, &scope, &request("v1", RequestStatus::Reserved, "1:1", &mine)));
        assert!(can_mutate(&rescuer, &scope, &request("v1", RequestStatus::Reserved, "1:1", &mine)));
        assert!(can_view(&rescuer, &scope, &request("v1", RequestStatus::Completed, "1:1", &done)));
        assert!(!can_mutate(&rescuer, &scope, &request("v1", RequestStatus::Completed, "1:1", &done)));
        assert!(!can_view(&rescuer, &scope, &request("v1", RequestStatus::Reserved, "1:1", &other)));
    }

    #[test]
    fn test_only_team_leader_mutates_mission() {
        let member = session("r1", Role::Rescuer);
        let leader = session("r2", Role::Rescuer);
        let member_scope = Scope {
            team_ids: set(&["team1"]),
            ..Scope::default()
        };
        let leader_scope = Scope {
            team_ids: set(&["team1"]),
            led_team_ids: set(&["team1"]),
            ..Scope::default()
        };
        let mission = Resource::Mission {
            team_id: "team1",
            organization_id: "org1",
            requester_ids: &[],
        };

        assert!(can_view(&member, &member_scope, &mission));
        assert!(!can_mutate(&member, &member_scope, &mission));
        assert!(can_mutate(&leader, &leader_scope, &mission));
    }

    #[test]
    fn test_admin_views_all_but_mutates_only_organizations() {
        let admin = session("a1", Role::Admin);
        let scope = Scope::default();
        let team = Resource::Team {
            id: "team1",
            organization_id: "org1",
        };
        let org = Resource::Organization { owner_id: "o1" };

        assert!(can_view(&admin, &scope, &team));
        assert!(!can_mutate(&admin, &scope, &team));
        assert!(can_mutate(&admin, &scope, &org));
        assert!(!can_mutate(&admin, &scope, &request("v1", RequestStatus::Pending, "1:1", &[])));
    }

    #[test]
    fn test_victim_reads_mission_linking_own_request() {
        let victim = session("v1", Role::Victim);
        let requesters = vec!["v1".to_string()];
        let mission = Resource::Mission {
            team_id: "team1",
            organization_id: "org1",
            requester_ids: &requesters,
        };

        assert!(can_view(&victim, &Scope::default(), &mission));
        assert!(!can_mutate(&victim, &Scope::default(), &mission));
    }

    #[test]
    fn test_default_deny() {
        let rescuer = session("r1", Role::Rescuer);
        let victim = session("v1", Role::Victim);
        let org = Resource::Organization { owner_id: "o1" };

        assert!(!can_view(&rescuer, &Scope::default(), &org));
        assert!(!can_view(&victim, &Scope::default(), &org));
        assert!(matches!(
            ensure_view(&victim, &Scope::default(), &org),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn test_organization_record_belongs_to_its_owner() {
        let owner = session("o1", Role::Organization);
        let other = session("o2", Role::Organization);
        let org = Resource::Organization { owner_id: "o1" };

        assert!(can_view(&owner, &Scope::default(), &org));
        assert!(can_mutate(&owner, &Scope::default(), &org));
        assert!(!can_view(&other, &Scope::default(), &org));
        assert!(!can_mutate(&other, &Scope::default(), &org));
    }
}
