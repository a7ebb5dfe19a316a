//! Sign-up, sign-in, sessions and profile resolution.

use super::{optional, required};
use crate::auth::{hash_password, verify_password};
use crate::config::Config;
use crate::db::Repository;
use crate::errors::AppError;
use crate::models::{
    PrincipalMetadata, Profile, Role, Session, SessionResponse, SignInRequest, SignUpRequest,
    UpdateProfileRequest,
};

const MIN_PASSWORD_LEN: usize = 8;
const DEFAULT_PROFILE_NAME: &str = "User";

fn normalize_email(email: &str) -> Result<String, AppError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::Validation("A valid email is required".to_string()));
    }
    Ok(email)
}

/// Create a principal and its profile.
pub async fn sign_up(
    repo: &Repository,
    config: &Config,
    request: &SignUpRequest,
) -> Result<Profile, AppError> {
    let email = normalize_email(&request.email)?;
    if request.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    let name = required("name", &request.name)?;
    let role: Role = request.role.trim().parse()?;

    if role == Role::Admin && config.bootstrap_admin_email.as_deref() != Some(email.as_str()) {
        tracing::warn!(email = %email, "admin sign-up refused");
        return Err(AppError::Forbidden(
            "The admin role cannot be chosen at sign-up".to_string(),
        ));
    }

    let password_hash = hash_password(&request.password)?;
    let metadata = PrincipalMetadata {
        role: Some(role.as_str().to_string()),
        name: Some(name.clone()),
    };
    let principal = repo.create_principal(&email, &password_hash, &metadata).await?;

    let phone = optional(request.phone.as_deref());
    repo.insert_profile_if_absent(&principal.id, role, &name, Some(&email), phone.as_deref())
        .await?;

    tracing::info!(principal_id = %principal.id, role = %role, "account created");

    resolve_profile(repo, &principal.id).await
}

/// Verify credentials and issue a session.
pub async fn sign_in(
    repo: &Repository,
    config: &Config,
    request: &SignInRequest,
) -> Result<SessionResponse, AppError> {
    let invalid = || AppError::Unauthorized("Invalid email or password".to_string());

    let email = normalize_email(&request.email).map_err(|_| invalid())?;
    let principal = repo.find_principal_by_email(&email).await?.ok_or_else(invalid)?;
    if !verify_password(&request.password, &principal.password_hash)? {
        tracing::debug!(email = %email, "sign-in with wrong password");
        return Err(invalid());
    }

    let profile = resolve_profile(repo, &principal.id).await?;

    if let Some(expected) = request.role.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let expected: Role = expected.parse()?;
        if expected != profile.role {
            tracing::warn!(
                principal_id = %principal.id,
                expected = %expected,
                actual = %profile.role,
                "sign-in role mismatch"
            );
            return Err(AppError::Unauthorized(format!(
                "This account is not registered as {}",
                expected
            )));
        }
    }

    let (token, expires_at) = repo
        .create_session(&principal.id, config.session_ttl_hours)
        .await?;

    tracing::info!(principal_id = %principal.id, role = %profile.role, "signed in");

    Ok(SessionResponse {
        token,
        expires_at,
        profile,
    })
}

/// Revoke a session token.
pub async fn sign_out(repo: &Repository, session: &Session) -> Result<(), AppError> {
    if !repo.delete_session(&session.token).await? {
        return Err(AppError::Unauthorized("Session already ended".to_string()));
    }
    Ok(())
}

/// Resolve a bearer token into the caller's session and profile.
pub async fn current_session(
    repo: &Repository,
    token: &str,
) -> Result<(Session, Profile), AppError> {
    let principal_id = repo
        .find_session(token)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Session expired or unknown".to_string()))?;

    let profile = resolve_profile(repo, &principal_id).await?;
    let session = Session {
        principal_id,
        role: profile.role,
        token: token.to_string(),
    };
    Ok((session, profile))
}

/// Fetch the profile of a principal, creating it from sign-up metadata when
/// it is missing. Safe to call repeatedly and concurrently.
pub async fn resolve_profile(repo: &Repository, principal_id: &str) -> Result<Profile, AppError> {
    if let Some(profile) = repo.get_profile(principal_id).await? {
        return Ok(profile);
    }

    let principal = repo
        .get_principal(principal_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized(format!("Unknown principal {}", principal_id)))?;

    let role = match principal.metadata.role.as_deref() {
        Some(raw) => raw.parse::<Role>().unwrap_or_else(|_| {
            tracing::warn!(principal_id = %principal_id, role = raw, "unknown role in metadata, using victim");
            Role::Victim
        }),
        None => Role::Victim,
    };
    let name = optional(principal.metadata.name.as_deref())
        .unwrap_or_else(|| DEFAULT_PROFILE_NAME.to_string());

    if repo
        .insert_profile_if_absent(principal_id, role, &name, Some(&principal.email), None)
        .await?
    {
        tracing::info!(principal_id = %principal_id, role = %role, "repaired missing profile");
    }

    repo.get_profile(principal_id).await?.ok_or_else(|| {
        AppError::Store(format!("Profile for {} could not be persisted", principal_id))
    })
}

/// Change the caller's own name and phone.
pub async fn update_profile(
    repo: &Repository,
    session: &Session,
    request: &UpdateProfileRequest,
) -> Result<Profile, AppError> {
    let current = resolve_profile(repo, &session.principal_id).await?;

    let name = match &request.name {
        Some(name) => required("name", name)?,
        None => current.name,
    };
    let phone = match &request.phone {
        Some(phone) => optional(Some(phone)),
        None => current.phone,
    };

    repo.update_profile(&session.principal_id, &name, phone.as_deref())
        .await
}
