//! Team and membership models.

use serde::{Deserialize, Serialize};

/// A rescuer team owned by one organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: String,
    pub organization_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leader_id: Option<String>,
    pub name: String,
    pub is_active: bool,
    pub members: Vec<TeamMember>,
    pub created_at: String,
}

impl Team {
    /// An assignable team is active with a leader who is still a member.
    pub fn has_leader(&self) -> bool {
        match &self.leader_id {
            Some(leader) => self
                .members
                .iter()
                .any(|m| m.is_leader && &m.user_id == leader),
            None => false,
        }
    }
}

/// Join row between a team and a rescuer profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMember {
    pub id: String,
    pub team_id: String,
    pub user_id: String,
    pub is_leader: bool,
    pub created_at: String,
}

/// Request body for creating a team.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTeamRequest {
    pub organization_id: String,
    pub name: String,
}

/// Request body for updating a team.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTeamRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

/// Request body for adding a member to a team.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMemberRequest {
    pub user_id: String,
    #[serde(default)]
    pub is_leader: bool,
}
