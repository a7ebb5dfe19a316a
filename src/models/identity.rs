//! Principal, profile and session models.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Actor role attached to every profile. Immutable once the profile exists.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Victim,
    Organization,
    Rescuer,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Victim => "victim",
            Role::Organization => "organization",
            Role::Rescuer => "rescuer",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "victim" => Ok(Role::Victim),
            "organization" => Ok(Role::Organization),
            "rescuer" => Ok(Role::Rescuer),
            "admin" => Ok(Role::Admin),
            other => Err(AppError::Validation(format!("Unknown role '{}'", other))),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role-tagged profile of an authenticated principal. `id` is the principal id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub role: Role,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub created_at: String,
}

/// Auth-side record of a principal.
#[derive(Debug, Clone)]
pub struct Principal {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub metadata: PrincipalMetadata,
}

/// Metadata captured at sign-up, used to repair a missing profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrincipalMetadata {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Explicit session context handed to every core operation.
#[derive(Debug, Clone)]
pub struct Session {
    pub principal_id: String,
    pub role: Role,
    pub token: String,
}

/// Request body for creating an account.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub role: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Request body for signing in.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
    /// Role the client is signing in as; a mismatch rejects the sign-in
    #[serde(default)]
    pub role: Option<String>,
}

/// Issued session returned by sign-in.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub token: String,
    pub expires_at: String,
    pub profile: Profile,
}

/// Request body for updating the caller's own profile.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}
