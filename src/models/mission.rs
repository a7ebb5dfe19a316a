//! Mission model and its forward-only status state machine.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Progress status of a mission.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    Preparing,
    OnWay,
    Arrived,
    Completed,
    Cancelled,
}

impl MissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MissionStatus::Preparing => "preparing",
            MissionStatus::OnWay => "on_way",
            MissionStatus::Arrived => "arrived",
            MissionStatus::Completed => "completed",
            MissionStatus::Cancelled => "cancelled",
        }
    }

    /// The only state reachable by advancing. Cancellation is a separate edge.
    pub fn next(&self) -> Option<MissionStatus> {
        match self {
            MissionStatus::Preparing => Some(MissionStatus::OnWay),
            MissionStatus::OnWay => Some(MissionStatus::Arrived),
            MissionStatus::Arrived => Some(MissionStatus::Completed),
            MissionStatus::Completed | MissionStatus::Cancelled => None,
        }
    }

    pub fn can_advance_to(&self, to: MissionStatus) -> bool {
        self.next() == Some(to)
    }

    pub fn can_cancel(&self) -> bool {
        *self == MissionStatus::Preparing
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, MissionStatus::Completed | MissionStatus::Cancelled)
    }
}

impl FromStr for MissionStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "preparing" => Ok(MissionStatus::Preparing),
            "on_way" => Ok(MissionStatus::OnWay),
            "arrived" => Ok(MissionStatus::Arrived),
            "completed" => Ok(MissionStatus::Completed),
            "cancelled" => Ok(MissionStatus::Cancelled),
            other => Err(AppError::Validation(format!(
                "Unknown mission status '{}'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for MissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the append-only mission history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub status: MissionStatus,
    pub timestamp: String,
}

/// A team's assignment covering one or more help requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mission {
    pub id: String,
    pub team_id: String,
    pub organization_id: String,
    pub status: MissionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
    pub request_ids: Vec<String>,
    pub status_updates: Vec<StatusUpdate>,
    pub created_at: String,
}

/// Request body for creating a mission.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMissionRequest {
    pub team_id: String,
    pub request_ids: Vec<String>,
}

/// Request body for advancing a mission.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceMissionRequest {
    pub status: String,
}

/// Request body for cancelling a mission.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelMissionRequest {
    #[serde(default)]
    pub reason: String,
}
