//! Organization, zone and document persistence.

use sqlx::Row;

use super::repository::{bump_revision, flag, now_timestamp, parse_column};
use super::Repository;
use crate::errors::AppError;
use crate::models::{
    Organization, OrganizationDocument, OrganizationStatus, RegisterOrganizationRequest,
    ZoneSummary,
};

const ORGANIZATION_COLUMNS: &str = "id, user_id, name, email, phone, address, representative_name, representative_position, status, rejection_reason, is_verified, created_at";

impl Repository {
    /// List organizations, optionally filtered by status, oldest first.
    pub async fn list_organizations(
        &self,
        status: Option<OrganizationStatus>,
    ) -> Result<Vec<Organization>, AppError> {
        let rows = match status {
            Some(status) => {
                sqlx::query(&format!(
                    "SELECT {} FROM organizations WHERE status = ? ORDER BY created_at",
                    ORGANIZATION_COLUMNS
                ))
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM organizations ORDER BY created_at",
                    ORGANIZATION_COLUMNS
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        let mut organizations = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut organization = organization_from_row(row)?;
            organization.zones = self.list_zones(&organization.id).await?;
            organizations.push(organization);
        }
        Ok(organizations)
    }

    /// Get an organization by ID.
    pub async fn get_organization(&self, id: &str) -> Result<Option<Organization>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM organizations WHERE id = ?",
            ORGANIZATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let mut organization = organization_from_row(&row)?;
                organization.zones = self.list_zones(id).await?;
                Ok(Some(organization))
            }
            None => Ok(None),
        }
    }

    /// Get the organization owned by a profile, if any.
    pub async fn get_organization_by_owner(
        &self,
        owner_id: &str,
    ) -> Result<Option<Organization>, AppError> {
        let row = sqlx::query("SELECT id FROM organizations WHERE user_id = ?")
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let id: String = row.get("id");
                self.get_organization(&id).await
            }
            None => Ok(None),
        }
    }

    /// Register a new organization in `pending` status.
    pub async fn create_organization(
        &self,
        owner_id: &str,
        request: &RegisterOrganizationRequest,
    ) -> Result<Organization, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = now_timestamp();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"INSERT INTO organizations (id, user_id, name, email, phone, address, representative_name,
                   representative_position, status, rejection_reason, is_verified, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'pending', NULL, 0, ?)"#,
        )
        .bind(&id)
        .bind(owner_id)
        .bind(request.name.trim())
        .bind(request.email.trim())
        .bind(request.phone.trim())
        .bind(request.address.trim())
        .bind(request.representative_name.trim())
        .bind(request.representative_position.trim())
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict { .. } => {
                AppError::conflict("This profile already registered an organization")
            }
            other => other,
        })?;

        bump_revision(&mut tx).await?;
        tx.commit().await?;

        Ok(Organization {
            id,
            owner_profile_id: owner_id.to_string(),
            name: request.name.trim().to_string(),
            email: request.email.trim().to_string(),
            phone: request.phone.trim().to_string(),
            address: request.address.trim().to_string(),
            representative_name: request.representative_name.trim().to_string(),
            representative_position: request.representative_position.trim().to_string(),
            status: OrganizationStatus::Pending,
            rejection_reason: None,
            is_verified: false,
            zones: Vec::new(),
            created_at: now,
        })
    }

    /// Overwrite the owner-editable fields.
    pub async fn update_organization_details(
        &self,
        organization: &Organization,
    ) -> Result<Organization, AppError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"UPDATE organizations SET name = ?, email = ?, phone = ?, address = ?,
                   representative_name = ?, representative_position = ?
               WHERE id = ?"#,
        )
        .bind(&organization.name)
        .bind(&organization.email)
        .bind(&organization.phone)
        .bind(&organization.address)
        .bind(&organization.representative_name)
        .bind(&organization.representative_position)
        .bind(&organization.id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Organization {} not found",
                organization.id
            )));
        }

        bump_revision(&mut tx).await?;
        tx.commit().await?;

        Ok(organization.clone())
    }

    /// Compare-and-set the approval status.
    pub async fn set_organization_status(
        &self,
        id: &str,
        from: OrganizationStatus,
        to: OrganizationStatus,
        rejection_reason: Option<&str>,
    ) -> Result<Organization, AppError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE organizations SET status = ?, rejection_reason = ?, is_verified = ? WHERE id = ? AND status = ?",
        )
        .bind(to.as_str())
        .bind(rejection_reason)
        .bind((to == OrganizationStatus::Approved) as i32)
        .bind(id)
        .bind(from.as_str())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::conflict(format!(
                "Organization {} is no longer {}",
                id,
                from.as_str()
            )));
        }

        bump_revision(&mut tx).await?;
        tx.commit().await?;

        self.get_organization(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Organization {} not found", id)))
    }

    // ==================== ZONE OPERATIONS ====================

    /// Zones served by an organization, sorted.
    pub async fn list_zones(&self, organization_id: &str) -> Result<Vec<String>, AppError> {
        let rows = sqlx::query("SELECT zone FROM organization_zones WHERE organization_id = ? ORDER BY zone")
            .bind(organization_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(|r| r.get("zone")).collect())
    }

    /// Replace the served zones in one transaction.
    pub async fn replace_zones(
        &self,
        organization_id: &str,
        zones: &[String],
    ) -> Result<Vec<String>, AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM organization_zones WHERE organization_id = ?")
            .bind(organization_id)
            .execute(&mut *tx)
            .await?;

        for zone in zones {
            sqlx::query("INSERT OR IGNORE INTO organization_zones (organization_id, zone) VALUES (?, ?)")
                .bind(organization_id)
                .bind(zone)
                .execute(&mut *tx)
                .await?;
        }

        bump_revision(&mut tx).await?;
        tx.commit().await?;

        self.list_zones(organization_id).await
    }

    /// Pending and reserved request counts for each served zone.
    pub async fn zone_summary(&self, organization_id: &str) -> Result<Vec<ZoneSummary>, AppError> {
        let rows = sqlx::query(
            r#"SELECT z.zone AS zone,
                      COALESCE(SUM(CASE WHEN r.status = 'pending' THEN 1 ELSE 0 END), 0) AS pending,
                      COALESCE(SUM(CASE WHEN r.status = 'reserved' THEN 1 ELSE 0 END), 0) AS reserved
               FROM organization_zones z
               LEFT JOIN help_requests r ON r.zone = z.zone
               WHERE z.organization_id = ?
               GROUP BY z.zone
               ORDER BY z.zone"#,
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| ZoneSummary {
                zone: row.get("zone"),
                pending: row.get("pending"),
                reserved: row.get("reserved"),
            })
            .collect())
    }

    // ==================== DOCUMENT OPERATIONS ====================

    /// Attach a registration document reference.
    pub async fn add_document(
        &self,
        organization_id: &str,
        file_name: &str,
        file_path: &str,
    ) -> Result<OrganizationDocument, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = now_timestamp();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO organization_documents (id, organization_id, file_name, file_path, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(organization_id)
        .bind(file_name)
        .bind(file_path)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        bump_revision(&mut tx).await?;
        tx.commit().await?;

        Ok(OrganizationDocument {
            id,
            organization_id: organization_id.to_string(),
            file_name: file_name.to_string(),
            file_path: file_path.to_string(),
            created_at: now,
        })
    }

    /// List documents of an organization, oldest first.
    pub async fn list_documents(
        &self,
        organization_id: &str,
    ) -> Result<Vec<OrganizationDocument>, AppError> {
        let rows = sqlx::query(
            "SELECT id, organization_id, file_name, file_path, created_at FROM organization_documents WHERE organization_id = ? ORDER BY created_at",
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| OrganizationDocument {
                id: row.get("id"),
                organization_id: row.get("organization_id"),
                file_name: row.get("file_name"),
                file_path: row.get("file_path"),
                created_at: row.get("created_at"),
            })
            .collect())
    }
}

// Helper functions for row conversion

fn organization_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Organization, AppError> {
    Ok(Organization {
        id: row.get("id"),
        owner_profile_id: row.get("user_id"),
        name: row.get("name"),
        email: row.get("email"),
        phone: row.get("phone"),
        address: row.get("address"),
        representative_name: row.get("representative_name"),
        representative_position: row.get("representative_position"),
        status: parse_column(row, "status")?,
        rejection_reason: row.get("rejection_reason"),
        is_verified: flag(row, "is_verified"),
        zones: Vec::new(),
        created_at: row.get("created_at"),
    })
}
