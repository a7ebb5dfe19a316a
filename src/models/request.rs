//! Help request model and its status state machine.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Lifecycle status of a help request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Reserved,
    InProgress,
    Completed,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Reserved => "reserved",
            RequestStatus::InProgress => "in_progress",
            RequestStatus::Completed => "completed",
            RequestStatus::Cancelled => "cancelled",
        }
    }

    /// Check if a transition follows one of the defined edges.
    pub fn can_transition_to(&self, to: RequestStatus) -> bool {
        match (self, to) {
            // Forward path
            (RequestStatus::Pending, RequestStatus::Reserved) => true,
            (RequestStatus::Reserved, RequestStatus::InProgress) => true,
            (RequestStatus::InProgress, RequestStatus::Completed) => true,

            // Cancellation before work starts
            (RequestStatus::Pending, RequestStatus::Cancelled) => true,
            (RequestStatus::Reserved, RequestStatus::Cancelled) => true,

            _ => false,
        }
    }

    /// Get allowed next states.
    pub fn allowed_next_states(&self) -> Vec<RequestStatus> {
        match self {
            RequestStatus::Pending => vec![RequestStatus::Reserved, RequestStatus::Cancelled],
            RequestStatus::Reserved => vec![RequestStatus::InProgress, RequestStatus::Cancelled],
            RequestStatus::InProgress => vec![RequestStatus::Completed],
            RequestStatus::Completed => vec![],
            RequestStatus::Cancelled => vec![],
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.allowed_next_states().is_empty()
    }
}

impl FromStr for RequestStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "reserved" => Ok(RequestStatus::Reserved),
            "in_progress" => Ok(RequestStatus::InProgress),
            "completed" => Ok(RequestStatus::Completed),
            "cancelled" => Ok(RequestStatus::Cancelled),
            other => Err(AppError::Validation(format!(
                "Unknown request status '{}'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Picked location of the people needing help.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
    pub address: String,
}

impl Location {
    /// `(0, 0)` is the "nothing picked" sentinel of the map picker.
    pub fn validate(&self) -> Result<(), AppError> {
        if !self.lat.is_finite() || !self.lng.is_finite() {
            return Err(AppError::Validation("Location must be numeric".to_string()));
        }
        if self.lat == 0.0 && self.lng == 0.0 {
            return Err(AppError::Validation(
                "A location must be picked".to_string(),
            ));
        }
        if !(-90.0..=90.0).contains(&self.lat) || !(-180.0..=180.0).contains(&self.lng) {
            return Err(AppError::Validation(
                "Location is outside valid coordinates".to_string(),
            ));
        }
        if self.address.trim().is_empty() {
            return Err(AppError::Validation("Address is required".to_string()));
        }
        Ok(())
    }
}

/// Kinds of help requested.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Needs {
    #[serde(default)]
    pub food: bool,
    #[serde(default)]
    pub water: bool,
    #[serde(default)]
    pub medicine: bool,
    #[serde(default)]
    pub other: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_details: Option<String>,
}

impl Needs {
    pub fn validate(&self) -> Result<(), AppError> {
        if !(self.food || self.water || self.medicine || self.other) {
            return Err(AppError::Validation(
                "At least one need must be selected".to_string(),
            ));
        }
        if self.other
            && self
                .other_details
                .as_deref()
                .map_or(true, |d| d.trim().is_empty())
        {
            return Err(AppError::Validation(
                "Describe the other need in otherDetails".to_string(),
            ));
        }
        Ok(())
    }
}

/// A victim's request for help.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelpRequest {
    pub id: String,
    pub user_id: String,
    pub location: Location,
    pub zone: String,
    pub needs: Needs,
    pub people_count: i64,
    pub details: String,
    pub images: Vec<String>,
    pub status: RequestStatus,
    pub created_at: String,
}

/// Request body for creating a help request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateHelpRequest {
    pub location: Location,
    pub needs: Needs,
    pub people_count: i64,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub images: Vec<String>,
}

impl CreateHelpRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        validate_fields(&self.location, &self.needs, self.people_count, &self.images)
    }
}

/// Owner edits allowed while the request is still pending.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateHelpRequest {
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub needs: Option<Needs>,
    #[serde(default)]
    pub people_count: Option<i64>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub images: Option<Vec<String>>,
}

/// Request body for a status transition.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRequest {
    pub status: String,
}

/// Query parameters for listing help requests.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRequestsQuery {
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub zone: Option<String>,
}

pub fn validate_fields(
    location: &Location,
    needs: &Needs,
    people_count: i64,
    images: &[String],
) -> Result<(), AppError> {
    if people_count < 1 {
        return Err(AppError::Validation(
            "peopleCount must be at least 1".to_string(),
        ));
    }
    needs.validate()?;
    location.validate()?;
    if images.iter().any(|url| url.trim().is_empty()) {
        return Err(AppError::Validation("Image URLs must not be empty".to_string()));
    }
    Ok(())
}

/// Grid cell key of a coordinate, `"<latIndex>:<lngIndex>"`.
pub fn zone_for(lat: f64, lng: f64, cell_degrees: f64) -> String {
    let lat_index = (lat / cell_degrees).floor() as i64;
    let lng_index = (lng / cell_degrees).floor() as i64;
    format!("{}:{}", lat_index, lng_index)
}
