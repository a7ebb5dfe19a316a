//! Organization model and its admin approval workflow.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Approval status of an organization.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrganizationStatus {
    Pending,
    Approved,
    Rejected,
}

impl OrganizationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrganizationStatus::Pending => "pending",
            OrganizationStatus::Approved => "approved",
            OrganizationStatus::Rejected => "rejected",
        }
    }

    /// Admins decide pending organizations; a rejected owner may resubmit.
    pub fn can_transition_to(&self, to: OrganizationStatus) -> bool {
        matches!(
            (self, to),
            (OrganizationStatus::Pending, OrganizationStatus::Approved)
                | (OrganizationStatus::Pending, OrganizationStatus::Rejected)
                | (OrganizationStatus::Rejected, OrganizationStatus::Pending)
        )
    }
}

impl FromStr for OrganizationStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrganizationStatus::Pending),
            "approved" => Ok(OrganizationStatus::Approved),
            "rejected" => Ok(OrganizationStatus::Rejected),
            other => Err(AppError::Validation(format!(
                "Unknown organization status '{}'",
                other
            ))),
        }
    }
}

/// A relief organization registered by an organization-role profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: String,
    pub owner_profile_id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub representative_name: String,
    pub representative_position: String,
    pub status: OrganizationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    pub is_verified: bool,
    pub zones: Vec<String>,
    pub created_at: String,
}

/// Request body for registering an organization.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterOrganizationRequest {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub representative_name: String,
    #[serde(default)]
    pub representative_position: String,
}

impl RegisterOrganizationRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        let required = [
            ("name", &self.name),
            ("email", &self.email),
            ("phone", &self.phone),
            ("address", &self.address),
            ("representativeName", &self.representative_name),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(AppError::Validation(format!("{} is required", field)));
            }
        }
        if !self.email.contains('@') {
            return Err(AppError::Validation("email is malformed".to_string()));
        }
        Ok(())
    }
}

/// Fields the owner may change on its own record.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrganizationRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub representative_name: Option<String>,
    #[serde(default)]
    pub representative_position: Option<String>,
}

/// Request body for rejecting an organization.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectOrganizationRequest {
    pub reason: String,
}

/// Query parameters for listing organizations.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListOrganizationsQuery {
    #[serde(default)]
    pub status: Option<String>,
}

/// Request body replacing the zones an organization serves.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetZonesRequest {
    pub zones: Vec<String>,
}

/// Request counts for one served zone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ZoneSummary {
    pub zone: String,
    pub pending: i64,
    pub reserved: i64,
}

/// A registration document reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationDocument {
    pub id: String,
    pub organization_id: String,
    pub file_name: String,
    pub file_path: String,
    pub created_at: String,
}

/// Request body for attaching a document.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddDocumentRequest {
    pub file_name: String,
    pub file_path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_decisions_only_from_pending() {
        use OrganizationStatus::*;
        assert!(Pending.can_transition_to(Approved));
        assert!(Pending.can_transition_to(Rejected));
        assert!(!Approved.can_transition_to(Rejected));
        assert!(!Approved.can_transition_to(Pending));
        assert!(!Rejected.can_transition_to(Approved));
    }

    #[test]
    fn test_rejected_may_resubmit() {
        assert!(OrganizationStatus::Rejected.can_transition_to(OrganizationStatus::Pending));
    }

    #[test]
    fn test_registration_requires_fields() {
        let mut req = RegisterOrganizationRequest {
            name: "River Aid".to_string(),
            email: "ops@riveraid.org".to_string(),
            phone: "0800".to_string(),
            address: "1 Levee Rd".to_string(),
            representative_name: "Sam".to_string(),
            representative_position: String::new(),
        };
        assert!(req.validate().is_ok());

        req.address = "  ".to_string();
        assert!(matches!(req.validate(), Err(AppError::Validation(_))));
    }
}
