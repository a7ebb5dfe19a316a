//! Help request persistence.

use sqlx::{Row, SqliteConnection};

use super::repository::{bump_revision, flag, now_timestamp, parse_column};
use super::Repository;
use crate::access::Assignment;
use crate::errors::AppError;
use crate::models::{HelpRequest, Location, Needs, RequestStatus};

const REQUEST_COLUMNS: &str = "r.id, r.user_id, r.location_lat, r.location_lng, r.location_address, r.zone, r.needs_food, r.needs_water, r.needs_medicine, r.needs_other, r.other_details, r.people_count, r.details, r.status, r.created_at";

impl Repository {
    /// Insert a new pending request with its images.
    pub async fn create_request(&self, request: &HelpRequest) -> Result<HelpRequest, AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"INSERT INTO help_requests (id, user_id, location_lat, location_lng, location_address, zone,
                   needs_food, needs_water, needs_medicine, needs_other, other_details,
                   people_count, details, status, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&request.id)
        .bind(&request.user_id)
        .bind(request.location.lat)
        .bind(request.location.lng)
        .bind(&request.location.address)
        .bind(&request.zone)
        .bind(request.needs.food as i32)
        .bind(request.needs.water as i32)
        .bind(request.needs.medicine as i32)
        .bind(request.needs.other as i32)
        .bind(&request.needs.other_details)
        .bind(request.people_count)
        .bind(&request.details)
        .bind(request.status.as_str())
        .bind(&request.created_at)
        .execute(&mut *tx)
        .await?;

        insert_images(&mut tx, &request.id, &request.images).await?;

        bump_revision(&mut tx).await?;
        tx.commit().await?;

        Ok(request.clone())
    }

    /// Get a request by ID.
    pub async fn get_request(&self, id: &str) -> Result<Option<HelpRequest>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM help_requests r WHERE r.id = ?",
            REQUEST_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.request_with_images(&row).await?)),
            None => Ok(None),
        }
    }

    /// Requests created by one victim, newest first.
    pub async fn list_requests_by_owner(&self, user_id: &str) -> Result<Vec<HelpRequest>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM help_requests r WHERE r.user_id = ? ORDER BY r.created_at DESC, r.rowid DESC",
            REQUEST_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        self.requests_with_images(&rows).await
    }

    /// Pending and reserved requests inside any of the zones, newest first.
    pub async fn list_open_requests_in_zones(
        &self,
        zones: &[String],
    ) -> Result<Vec<HelpRequest>, AppError> {
        if zones.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {} FROM help_requests r WHERE r.status IN ('pending', 'reserved') AND r.zone IN ({}) ORDER BY r.created_at DESC, r.rowid DESC",
            REQUEST_COLUMNS,
            placeholders(zones.len())
        );
        let mut query = sqlx::query(&sql);
        for zone in zones {
            query = query.bind(zone);
        }
        let rows = query.fetch_all(&self.pool).await?;

        self.requests_with_images(&rows).await
    }

    /// Requests linked to any mission of the given teams, newest first.
    pub async fn list_requests_for_teams(
        &self,
        team_ids: &[String],
    ) -> Result<Vec<HelpRequest>, AppError> {
        if team_ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            r#"SELECT {} FROM help_requests r
               WHERE r.id IN (SELECT mr.request_id FROM mission_requests mr
                              JOIN missions m ON m.id = mr.mission_id
                              WHERE m.team_id IN ({}))
               ORDER BY r.created_at DESC, r.rowid DESC"#,
            REQUEST_COLUMNS,
            placeholders(team_ids.len())
        );
        let mut query = sqlx::query(&sql);
        for team_id in team_ids {
            query = query.bind(team_id);
        }
        let rows = query.fetch_all(&self.pool).await?;

        self.requests_with_images(&rows).await
    }

    /// Every request, newest first.
    pub async fn list_all_requests(&self) -> Result<Vec<HelpRequest>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM help_requests r ORDER BY r.created_at DESC, r.rowid DESC",
            REQUEST_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        self.requests_with_images(&rows).await
    }

    /// Overwrite the pre-assignment fields. Only succeeds while still pending.
    pub async fn update_pending_request(&self, request: &HelpRequest) -> Result<HelpRequest, AppError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"UPDATE help_requests SET location_lat = ?, location_lng = ?, location_address = ?, zone = ?,
                   needs_food = ?, needs_water = ?, needs_medicine = ?, needs_other = ?, other_details = ?,
                   people_count = ?, details = ?
               WHERE id = ? AND status = 'pending'"#,
        )
        .bind(request.location.lat)
        .bind(request.location.lng)
        .bind(&request.location.address)
        .bind(&request.zone)
        .bind(request.needs.food as i32)
        .bind(request.needs.water as i32)
        .bind(request.needs.medicine as i32)
        .bind(request.needs.other as i32)
        .bind(&request.needs.other_details)
        .bind(request.people_count)
        .bind(&request.details)
        .bind(&request.id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::conflict(format!(
                "Request {} is no longer pending",
                request.id
            )));
        }

        sqlx::query("DELETE FROM request_images WHERE request_id = ?")
            .bind(&request.id)
            .execute(&mut *tx)
            .await?;
        insert_images(&mut tx, &request.id, &request.images).await?;

        bump_revision(&mut tx).await?;
        tx.commit().await?;

        Ok(request.clone())
    }

    /// Compare-and-set a request status. Losing the race is a conflict.
    pub async fn set_request_status(
        &self,
        id: &str,
        from: RequestStatus,
        to: RequestStatus,
    ) -> Result<HelpRequest, AppError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("UPDATE help_requests SET status = ? WHERE id = ? AND status = ?")
            .bind(to.as_str())
            .bind(id)
            .bind(from.as_str())
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict {
                message: format!("Request {} is no longer {}", id, from),
                request_ids: vec![id.to_string()],
            });
        }

        bump_revision(&mut tx).await?;
        tx.commit().await?;

        self.get_request(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Request {} not found", id)))
    }

    /// Every mission that ever linked the request, with its owning organization.
    pub async fn request_assignments(&self, request_id: &str) -> Result<Vec<Assignment>, AppError> {
        let rows = sqlx::query(
            r#"SELECT m.id AS mission_id, m.team_id AS team_id, t.organization_id AS organization_id,
                      mr.active AS active
               FROM mission_requests mr
               JOIN missions m ON m.id = mr.mission_id
               JOIN teams t ON t.id = m.team_id
               WHERE mr.request_id = ?
               ORDER BY mr.created_at"#,
        )
        .bind(request_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| Assignment {
                mission_id: row.get("mission_id"),
                team_id: row.get("team_id"),
                organization_id: row.get("organization_id"),
                active: flag(row, "active"),
            })
            .collect())
    }

    async fn request_with_images(&self, row: &sqlx::sqlite::SqliteRow) -> Result<HelpRequest, AppError> {
        let mut request = request_from_row(row)?;
        let images = sqlx::query("SELECT image_url FROM request_images WHERE request_id = ? ORDER BY position")
            .bind(&request.id)
            .fetch_all(&self.pool)
            .await?;
        request.images = images.iter().map(|r| r.get("image_url")).collect();
        Ok(request)
    }

    async fn requests_with_images(
        &self,
        rows: &[sqlx::sqlite::SqliteRow],
    ) -> Result<Vec<HelpRequest>, AppError> {
        let mut requests = Vec::with_capacity(rows.len());
        for row in rows {
            requests.push(self.request_with_images(row).await?);
        }
        Ok(requests)
    }
}

async fn insert_images(
    conn: &mut SqliteConnection,
    request_id: &str,
    images: &[String],
) -> Result<(), AppError> {
    let now = now_timestamp();
    for (position, url) in images.iter().enumerate() {
        sqlx::query(
            "INSERT INTO request_images (id, request_id, image_url, position, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(request_id)
        .bind(url)
        .bind(position as i64)
        .bind(&now)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// `?, ?, ?` for an IN list of `n` values.
pub(super) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

// Helper functions for row conversion

pub(super) fn request_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<HelpRequest, AppError> {
    Ok(HelpRequest {
        id: row.get("id"),
        user_id: row.get("user_id"),
        location: Location {
            lat: row.get("location_lat"),
            lng: row.get("location_lng"),
            address: row.get("location_address"),
        },
        zone: row.get("zone"),
        needs: Needs {
            food: flag(row, "needs_food"),
            water: flag(row, "needs_water"),
            medicine: flag(row, "needs_medicine"),
            other: flag(row, "needs_other"),
            other_details: row.get("other_details"),
        },
        people_count: row.get("people_count"),
        details: row.get("details"),
        images: Vec::new(),
        status: parse_column(row, "status")?,
        created_at: row.get("created_at"),
    })
}
