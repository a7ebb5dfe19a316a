//! Principal, session and profile persistence.

use chrono::{Duration, SecondsFormat, Utc};
use sqlx::Row;

use super::repository::{bump_revision, now_timestamp, parse_column};
use super::Repository;
use crate::errors::AppError;
use crate::models::{Principal, PrincipalMetadata, Profile, Role};

impl Repository {
    // ==================== PRINCIPAL OPERATIONS ====================

    /// Create a principal. Duplicate emails surface as a conflict.
    pub async fn create_principal(
        &self,
        email: &str,
        password_hash: &str,
        metadata: &PrincipalMetadata,
    ) -> Result<Principal, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let metadata_json = serde_json::to_string(metadata)?;

        sqlx::query(
            "INSERT INTO principals (id, email, password_hash, metadata, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(email)
        .bind(password_hash)
        .bind(&metadata_json)
        .bind(now_timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict { .. } => {
                AppError::conflict(format!("An account for {} already exists", email))
            }
            other => other,
        })?;

        Ok(Principal {
            id,
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            metadata: metadata.clone(),
        })
    }

    /// Find a principal by its (normalized) email.
    pub async fn find_principal_by_email(&self, email: &str) -> Result<Option<Principal>, AppError> {
        let row = sqlx::query("SELECT id, email, password_hash, metadata FROM principals WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(principal_from_row))
    }

    /// Get a principal by ID.
    pub async fn get_principal(&self, id: &str) -> Result<Option<Principal>, AppError> {
        let row = sqlx::query("SELECT id, email, password_hash, metadata FROM principals WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(principal_from_row))
    }

    // ==================== SESSION OPERATIONS ====================

    /// Issue a session token valid for `ttl_hours`.
    pub async fn create_session(
        &self,
        principal_id: &str,
        ttl_hours: i64,
    ) -> Result<(String, String), AppError> {
        let token = format!(
            "{}{}",
            uuid::Uuid::new_v4().simple(),
            uuid::Uuid::new_v4().simple()
        );
        let now = Utc::now();
        let ttl = Duration::try_hours(ttl_hours)
            .ok_or_else(|| AppError::Internal(format!("Session lifetime of {} hours is out of range", ttl_hours)))?;
        let expires_at = (now + ttl).to_rfc3339_opts(SecondsFormat::Micros, true);

        sqlx::query("INSERT INTO sessions (token, principal_id, created_at, expires_at) VALUES (?, ?, ?, ?)")
            .bind(&token)
            .bind(principal_id)
            .bind(now.to_rfc3339_opts(SecondsFormat::Micros, true))
            .bind(&expires_at)
            .execute(&self.pool)
            .await?;

        Ok((token, expires_at))
    }

    /// Resolve an unexpired session token to its principal id.
    pub async fn find_session(&self, token: &str) -> Result<Option<String>, AppError> {
        let row = sqlx::query("SELECT principal_id FROM sessions WHERE token = ? AND expires_at > ?")
            .bind(token)
            .bind(now_timestamp())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.get("principal_id")))
    }

    /// Delete a session. Returns whether a session existed.
    pub async fn delete_session(&self, token: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // ==================== PROFILE OPERATIONS ====================

    /// Get a profile by principal ID.
    pub async fn get_profile(&self, id: &str) -> Result<Option<Profile>, AppError> {
        let row = sqlx::query("SELECT id, role, name, email, phone, created_at FROM profiles WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(profile_from_row).transpose()
    }

    /// Insert a profile unless one already exists for the principal.
    /// Returns whether a row was written.
    pub async fn insert_profile_if_absent(
        &self,
        id: &str,
        role: Role,
        name: &str,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "INSERT OR IGNORE INTO profiles (id, role, name, email, phone, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(role.as_str())
        .bind(name)
        .bind(email)
        .bind(phone)
        .bind(now_timestamp())
        .execute(&mut *tx)
        .await?;

        let created = result.rows_affected() > 0;
        if created {
            bump_revision(&mut tx).await?;
        }
        tx.commit().await?;

        Ok(created)
    }

    /// Update the mutable profile fields. Role is never touched.
    pub async fn update_profile(
        &self,
        id: &str,
        name: &str,
        phone: Option<&str>,
    ) -> Result<Profile, AppError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("UPDATE profiles SET name = ?, phone = ? WHERE id = ?")
            .bind(name)
            .bind(phone)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Profile {} not found", id)));
        }

        bump_revision(&mut tx).await?;
        tx.commit().await?;

        self.get_profile(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Profile {} not found", id)))
    }
}

// Helper functions for row conversion

fn principal_from_row(row: &sqlx::sqlite::SqliteRow) -> Principal {
    let metadata_str: Option<String> = row.get("metadata");
    Principal {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        metadata: metadata_str
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default(),
    }
}

fn profile_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Profile, AppError> {
    Ok(Profile {
        id: row.get("id"),
        role: parse_column(row, "role")?,
        name: row.get("name"),
        email: row.get("email"),
        phone: row.get("phone"),
        created_at: row.get("created_at"),
    })
}
