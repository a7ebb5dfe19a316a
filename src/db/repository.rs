//! Database repository shared state and cross-entity queries.
//!
//! Entity operations live in sibling modules as further `impl Repository` blocks.
//! Multi-row writes run inside a transaction whose first statement is a write, so
//! SQLite takes the write lock up front and concurrent writers queue on the busy
//! timeout instead of racing.

use chrono::{SecondsFormat, Utc};
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::access::Scope;
use crate::errors::AppError;
use crate::models::{RevisionInfo, Role, Session};

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pub(super) pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get the current revision ID.
    pub async fn get_revision_id(&self) -> Result<i64, AppError> {
        let row = sqlx::query("SELECT revision_id FROM meta WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("revision_id"))
    }

    /// Get revision info.
    pub async fn get_revision_info(&self) -> Result<RevisionInfo, AppError> {
        let row = sqlx::query("SELECT revision_id, generated_at FROM meta WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(RevisionInfo {
            revision_id: row.get("revision_id"),
            generated_at: row.get("generated_at"),
        })
    }

    /// Load the affiliations the view gate needs for this principal.
    pub async fn load_scope(&self, session: &Session) -> Result<Scope, AppError> {
        let mut scope = Scope::default();

        match session.role {
            Role::Organization => {
                let rows = sqlx::query("SELECT id FROM organizations WHERE user_id = ?")
                    .bind(&session.principal_id)
                    .fetch_all(&self.pool)
                    .await?;
                scope.organization_ids = rows.iter().map(|r| r.get::<String, _>("id")).collect();

                let rows = sqlx::query(
                    r#"SELECT z.zone FROM organization_zones z
                       JOIN organizations o ON o.id = z.organization_id
                       WHERE o.user_id = ?"#,
                )
                .bind(&session.principal_id)
                .fetch_all(&self.pool)
                .await?;
                scope.zones = rows.iter().map(|r| r.get::<String, _>("zone")).collect();
            }
            Role::Rescuer => {
                let rows = sqlx::query("SELECT team_id, is_leader FROM team_members WHERE user_id = ?")
                    .bind(&session.principal_id)
                    .fetch_all(&self.pool)
                    .await?;
                for row in rows {
                    let team_id: String = row.get("team_id");
                    let is_leader: i32 = row.get("is_leader");
                    if is_leader != 0 {
                        scope.led_team_ids.insert(team_id.clone());
                    }
                    scope.team_ids.insert(team_id);
                }
            }
            Role::Victim | Role::Admin => {}
        }

        Ok(scope)
    }
}

/// Current time as a fixed-width RFC 3339 string, so stored timestamps sort
/// lexicographically.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Increment the revision inside the caller's transaction.
pub(super) async fn bump_revision(conn: &mut SqliteConnection) -> Result<(), AppError> {
    sqlx::query("UPDATE meta SET revision_id = revision_id + 1, generated_at = ? WHERE id = 1")
        .bind(now_timestamp())
        .execute(conn)
        .await?;
    Ok(())
}

pub(super) fn flag(row: &sqlx::sqlite::SqliteRow, column: &str) -> bool {
    let value: i32 = row.get(column);
    value != 0
}

/// Parse a stored enum column, surfacing corrupt values as store errors.
pub(super) fn parse_column<T>(row: &sqlx::sqlite::SqliteRow, column: &str) -> Result<T, AppError>
where
    T: std::str::FromStr<Err = AppError>,
{
    let raw: String = row.get(column);
    raw.parse()
        .map_err(|_| AppError::Store(format!("Unexpected value '{}' in column {}", raw, column)))
}
