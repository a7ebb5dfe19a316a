//! Mission persistence: creation with request locking, status advancement,
//! cancellation and history.

use sqlx::{Row, SqliteConnection};

use super::repository::{bump_revision, now_timestamp, parse_column};
use super::requests::placeholders;
use super::Repository;
use crate::errors::AppError;
use crate::models::{Mission, MissionStatus, RequestStatus, StatusUpdate};

const MISSION_COLUMNS: &str = "m.id, m.team_id, t.organization_id, m.status, m.start_time, m.end_time, m.cancel_reason, m.created_at";

impl Repository {
    /// Create a mission and reserve its requests, all or nothing.
    ///
    /// The mission insert comes first so the transaction holds the write lock
    /// before any request is inspected. Every request must still be pending and
    /// free of active links; otherwise the whole transaction rolls back with a
    /// conflict naming the offending ids.
    pub async fn create_mission(
        &self,
        team_id: &str,
        request_ids: &[String],
    ) -> Result<Mission, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = now_timestamp();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO missions (id, team_id, status, start_time, end_time, cancel_reason, created_at) VALUES (?, ?, 'preparing', NULL, NULL, NULL, ?)",
        )
        .bind(&id)
        .bind(team_id)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        let mut contested = Vec::new();
        for request_id in request_ids {
            let row = sqlx::query(
                r#"SELECT r.status AS status,
                          EXISTS (SELECT 1 FROM mission_requests mr
                                  WHERE mr.request_id = r.id AND mr.active = 1) AS linked
                   FROM help_requests r WHERE r.id = ?"#,
            )
            .bind(request_id)
            .fetch_optional(&mut *tx)
            .await?;

            let available = match row {
                Some(row) => {
                    let status: String = row.get("status");
                    let linked: i32 = row.get("linked");
                    status == RequestStatus::Pending.as_str() && linked == 0
                }
                None => false,
            };
            if !available {
                contested.push(request_id.clone());
            }
        }

        if !contested.is_empty() {
            tracing::warn!(
                team_id = %team_id,
                contested = ?contested,
                "mission creation lost the race for requests"
            );
            return Err(AppError::Conflict {
                message: format!(
                    "Requests are no longer available: {}",
                    contested.join(", ")
                ),
                request_ids: contested,
            });
        }

        for request_id in request_ids {
            let result = sqlx::query(
                "UPDATE help_requests SET status = 'reserved' WHERE id = ? AND status = 'pending'",
            )
            .bind(request_id)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                return Err(AppError::Conflict {
                    message: format!("Request {} is no longer pending", request_id),
                    request_ids: vec![request_id.clone()],
                });
            }

            sqlx::query(
                "INSERT INTO mission_requests (id, mission_id, request_id, active, created_at) VALUES (?, ?, ?, 1, ?)",
            )
            .bind(uuid::Uuid::new_v4().to_string())
            .bind(&id)
            .bind(request_id)
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(|e| match AppError::from(e) {
                AppError::Conflict { .. } => AppError::Conflict {
                    message: format!("Request {} is already on an active mission", request_id),
                    request_ids: vec![request_id.clone()],
                },
                other => other,
            })?;
        }

        append_status_update(&mut tx, &id, MissionStatus::Preparing).await?;

        bump_revision(&mut tx).await?;
        tx.commit().await?;

        self.require_mission(&id).await
    }

    /// Move a mission one step forward, cascading to its linked requests.
    pub async fn advance_mission(
        &self,
        id: &str,
        from: MissionStatus,
        to: MissionStatus,
    ) -> Result<Mission, AppError> {
        let now = now_timestamp();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"UPDATE missions SET status = ?,
                   start_time = CASE WHEN ? THEN COALESCE(start_time, ?) ELSE start_time END,
                   end_time = CASE WHEN ? THEN ? ELSE end_time END
               WHERE id = ? AND status = ?"#,
        )
        .bind(to.as_str())
        .bind(from == MissionStatus::Preparing)
        .bind(&now)
        .bind(to == MissionStatus::Completed)
        .bind(&now)
        .bind(id)
        .bind(from.as_str())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::conflict(format!(
                "Mission {} is no longer {}",
                id, from
            )));
        }

        if from == MissionStatus::Preparing {
            let moved = move_linked_requests(
                &mut tx,
                id,
                RequestStatus::Reserved,
                RequestStatus::InProgress,
            )
            .await?;
            tracing::info!(mission_id = %id, moved, "linked requests now in progress");
        }

        if to == MissionStatus::Completed {
            let moved = move_linked_requests(
                &mut tx,
                id,
                RequestStatus::InProgress,
                RequestStatus::Completed,
            )
            .await?;
            deactivate_links(&mut tx, id).await?;
            tracing::info!(mission_id = %id, moved, "linked requests completed");
        }

        append_status_update(&mut tx, id, to).await?;

        bump_revision(&mut tx).await?;
        tx.commit().await?;

        self.require_mission(id).await
    }

    /// Cancel a preparing mission and release its requests back to pending.
    pub async fn cancel_mission(
        &self,
        id: &str,
        reason: Option<&str>,
    ) -> Result<Mission, AppError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE missions SET status = 'cancelled', cancel_reason = ? WHERE id = ? AND status = 'preparing'",
        )
        .bind(reason)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::conflict(format!(
                "Mission {} is no longer preparing",
                id
            )));
        }

        let released =
            move_linked_requests(&mut tx, id, RequestStatus::Reserved, RequestStatus::Pending)
                .await?;
        deactivate_links(&mut tx, id).await?;
        append_status_update(&mut tx, id, MissionStatus::Cancelled).await?;

        bump_revision(&mut tx).await?;
        tx.commit().await?;

        tracing::info!(mission_id = %id, released, "mission cancelled, requests released");

        self.require_mission(id).await
    }

    /// Get a mission with its request ids and history.
    pub async fn get_mission(&self, id: &str) -> Result<Option<Mission>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM missions m JOIN teams t ON t.id = m.team_id WHERE m.id = ?",
            MISSION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.mission_with_children(&row).await?)),
            None => Ok(None),
        }
    }

    /// Every mission, newest first.
    pub async fn list_all_missions(&self) -> Result<Vec<Mission>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM missions m JOIN teams t ON t.id = m.team_id ORDER BY m.created_at DESC, m.rowid DESC",
            MISSION_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        self.missions_with_children(&rows).await
    }

    /// Missions run by teams of the given organizations, newest first.
    pub async fn list_missions_for_organizations(
        &self,
        organization_ids: &[String],
    ) -> Result<Vec<Mission>, AppError> {
        self.list_missions_where("t.organization_id", organization_ids)
            .await
    }

    /// Missions assigned to the given teams, newest first.
    pub async fn list_missions_for_teams(
        &self,
        team_ids: &[String],
    ) -> Result<Vec<Mission>, AppError> {
        self.list_missions_where("m.team_id", team_ids).await
    }

    /// Missions that ever linked one of the victim's requests, newest first.
    pub async fn list_missions_for_requester(&self, user_id: &str) -> Result<Vec<Mission>, AppError> {
        let rows = sqlx::query(&format!(
            r#"SELECT {} FROM missions m
               JOIN teams t ON t.id = m.team_id
               WHERE m.id IN (SELECT mr.mission_id FROM mission_requests mr
                              JOIN help_requests r ON r.id = mr.request_id
                              WHERE r.user_id = ?)
               ORDER BY m.created_at DESC, m.rowid DESC"#,
            MISSION_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        self.missions_with_children(&rows).await
    }

    /// Owners of the requests a mission links.
    pub async fn mission_requester_ids(&self, mission_id: &str) -> Result<Vec<String>, AppError> {
        let rows = sqlx::query(
            r#"SELECT DISTINCT r.user_id AS user_id FROM mission_requests mr
               JOIN help_requests r ON r.id = mr.request_id
               WHERE mr.mission_id = ?"#,
        )
        .bind(mission_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|r| r.get("user_id")).collect())
    }

    async fn list_missions_where(
        &self,
        column: &str,
        values: &[String],
    ) -> Result<Vec<Mission>, AppError> {
        if values.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {} FROM missions m JOIN teams t ON t.id = m.team_id WHERE {} IN ({}) ORDER BY m.created_at DESC, m.rowid DESC",
            MISSION_COLUMNS,
            column,
            placeholders(values.len())
        );
        let mut query = sqlx::query(&sql);
        for value in values {
            query = query.bind(value);
        }
        let rows = query.fetch_all(&self.pool).await?;

        self.missions_with_children(&rows).await
    }

    async fn require_mission(&self, id: &str) -> Result<Mission, AppError> {
        self.get_mission(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Mission {} not found", id)))
    }

    async fn mission_with_children(&self, row: &sqlx::sqlite::SqliteRow) -> Result<Mission, AppError> {
        let mut mission = mission_from_row(row)?;

        let links = sqlx::query(
            "SELECT request_id FROM mission_requests WHERE mission_id = ? ORDER BY created_at, rowid",
        )
        .bind(&mission.id)
        .fetch_all(&self.pool)
        .await?;
        mission.request_ids = links.iter().map(|r| r.get("request_id")).collect();

        let updates = sqlx::query(
            "SELECT status, timestamp FROM mission_status_updates WHERE mission_id = ? ORDER BY seq",
        )
        .bind(&mission.id)
        .fetch_all(&self.pool)
        .await?;
        mission.status_updates = updates
            .iter()
            .map(|r| {
                Ok(StatusUpdate {
                    status: parse_column(r, "status")?,
                    timestamp: r.get("timestamp"),
                })
            })
            .collect::<Result<_, AppError>>()?;

        Ok(mission)
    }

    async fn missions_with_children(
        &self,
        rows: &[sqlx::sqlite::SqliteRow],
    ) -> Result<Vec<Mission>, AppError> {
        let mut missions = Vec::with_capacity(rows.len());
        for row in rows {
            missions.push(self.mission_with_children(row).await?);
        }
        Ok(missions)
    }
}

/// Append a history entry. The timestamp never precedes the previous entry's,
/// even if the wall clock stepped backwards.
async fn append_status_update(
    conn: &mut SqliteConnection,
    mission_id: &str,
    status: MissionStatus,
) -> Result<(), AppError> {
    let last = sqlx::query(
        "SELECT seq, timestamp FROM mission_status_updates WHERE mission_id = ? ORDER BY seq DESC LIMIT 1",
    )
    .bind(mission_id)
    .fetch_optional(&mut *conn)
    .await?;

    let now = now_timestamp();
    let (seq, timestamp) = match last {
        Some(row) => {
            let seq: i64 = row.get("seq");
            let previous: String = row.get("timestamp");
            (seq + 1, previous.max(now))
        }
        None => (0, now),
    };

    sqlx::query(
        "INSERT INTO mission_status_updates (id, mission_id, seq, status, timestamp) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(mission_id)
    .bind(seq)
    .bind(status.as_str())
    .bind(&timestamp)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Move actively linked requests from one status to another. Requests that
/// left `from` in the meantime (for example cancelled) are skipped.
async fn move_linked_requests(
    conn: &mut SqliteConnection,
    mission_id: &str,
    from: RequestStatus,
    to: RequestStatus,
) -> Result<u64, AppError> {
    let result = sqlx::query(
        r#"UPDATE help_requests SET status = ?
           WHERE status = ?
             AND id IN (SELECT request_id FROM mission_requests WHERE mission_id = ? AND active = 1)"#,
    )
    .bind(to.as_str())
    .bind(from.as_str())
    .bind(mission_id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

async fn deactivate_links(conn: &mut SqliteConnection, mission_id: &str) -> Result<(), AppError> {
    sqlx::query("UPDATE mission_requests SET active = 0 WHERE mission_id = ? AND active = 1")
        .bind(mission_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

// Helper functions for row conversion

fn mission_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Mission, AppError> {
    Ok(Mission {
        id: row.get("id"),
        team_id: row.get("team_id"),
        organization_id: row.get("organization_id"),
        status: parse_column(row, "status")?,
        start_time: row.get("start_time"),
        end_time: row.get("end_time"),
        cancel_reason: row.get("cancel_reason"),
        request_ids: Vec::new(),
        status_updates: Vec::new(),
        created_at: row.get("created_at"),
    })
}
