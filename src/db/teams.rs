//! Team and membership persistence.

use sqlx::Row;

use super::repository::{bump_revision, flag, now_timestamp};
use super::Repository;
use crate::errors::AppError;
use crate::models::{Team, TeamMember};

impl Repository {
    /// Get a team with its members.
    pub async fn get_team(&self, id: &str) -> Result<Option<Team>, AppError> {
        let row = sqlx::query(
            "SELECT id, organization_id, leader_id, name, is_active, created_at FROM teams WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let mut team = team_from_row(&row);
                team.members = self.list_team_members(id).await?;
                Ok(Some(team))
            }
            None => Ok(None),
        }
    }

    /// List every team, by name.
    pub async fn list_all_teams(&self) -> Result<Vec<Team>, AppError> {
        let rows = sqlx::query(
            "SELECT id, organization_id, leader_id, name, is_active, created_at FROM teams ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        self.teams_with_members(&rows).await
    }

    /// List the teams of one organization, by name.
    pub async fn list_teams_for_organization(
        &self,
        organization_id: &str,
    ) -> Result<Vec<Team>, AppError> {
        let rows = sqlx::query(
            "SELECT id, organization_id, leader_id, name, is_active, created_at FROM teams WHERE organization_id = ? ORDER BY name",
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;

        self.teams_with_members(&rows).await
    }

    /// List the teams a rescuer belongs to, by name.
    pub async fn list_teams_for_member(&self, user_id: &str) -> Result<Vec<Team>, AppError> {
        let rows = sqlx::query(
            r#"SELECT t.id, t.organization_id, t.leader_id, t.name, t.is_active, t.created_at
               FROM teams t JOIN team_members m ON m.team_id = t.id
               WHERE m.user_id = ? ORDER BY t.name"#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        self.teams_with_members(&rows).await
    }

    /// Create an active team without a leader.
    pub async fn create_team(&self, organization_id: &str, name: &str) -> Result<Team, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = now_timestamp();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO teams (id, organization_id, leader_id, name, is_active, created_at) VALUES (?, ?, NULL, ?, 1, ?)",
        )
        .bind(&id)
        .bind(organization_id)
        .bind(name)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        bump_revision(&mut tx).await?;
        tx.commit().await?;

        Ok(Team {
            id,
            organization_id: organization_id.to_string(),
            leader_id: None,
            name: name.to_string(),
            is_active: true,
            members: Vec::new(),
            created_at: now,
        })
    }

    /// Overwrite name and active flag.
    pub async fn update_team(&self, id: &str, name: &str, is_active: bool) -> Result<Team, AppError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("UPDATE teams SET name = ?, is_active = ? WHERE id = ?")
            .bind(name)
            .bind(is_active as i32)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Team {} not found", id)));
        }

        bump_revision(&mut tx).await?;
        tx.commit().await?;

        self.require_team(id).await
    }

    /// Add or update a membership. Promoting a leader demotes the previous one
    /// in the same transaction, so at most one leader row exists at any time.
    pub async fn upsert_team_member(
        &self,
        team_id: &str,
        user_id: &str,
        is_leader: bool,
    ) -> Result<Team, AppError> {
        let mut tx = self.pool.begin().await?;

        if is_leader {
            sqlx::query(
                "UPDATE team_members SET is_leader = 0 WHERE team_id = ? AND is_leader = 1 AND user_id != ?",
            )
            .bind(team_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"INSERT INTO team_members (id, team_id, user_id, is_leader, created_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT (team_id, user_id) DO UPDATE SET is_leader = excluded.is_leader"#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(team_id)
        .bind(user_id)
        .bind(is_leader as i32)
        .bind(now_timestamp())
        .execute(&mut *tx)
        .await?;

        if is_leader {
            sqlx::query("UPDATE teams SET leader_id = ? WHERE id = ?")
                .bind(user_id)
                .bind(team_id)
                .execute(&mut *tx)
                .await?;
        } else {
            sqlx::query("UPDATE teams SET leader_id = NULL WHERE id = ? AND leader_id = ?")
                .bind(team_id)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
        }

        bump_revision(&mut tx).await?;
        tx.commit().await?;

        self.require_team(team_id).await
    }

    /// Remove a membership. Removing the leader leaves the team leaderless.
    pub async fn remove_team_member(&self, team_id: &str, user_id: &str) -> Result<Team, AppError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM team_members WHERE team_id = ? AND user_id = ?")
            .bind(team_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "User {} is not a member of team {}",
                user_id, team_id
            )));
        }

        sqlx::query("UPDATE teams SET leader_id = NULL WHERE id = ? AND leader_id = ?")
            .bind(team_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        bump_revision(&mut tx).await?;
        tx.commit().await?;

        self.require_team(team_id).await
    }

    async fn require_team(&self, id: &str) -> Result<Team, AppError> {
        self.get_team(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Team {} not found", id)))
    }

    async fn list_team_members(&self, team_id: &str) -> Result<Vec<TeamMember>, AppError> {
        let rows = sqlx::query(
            "SELECT id, team_id, user_id, is_leader, created_at FROM team_members WHERE team_id = ? ORDER BY created_at, rowid",
        )
        .bind(team_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(member_from_row).collect())
    }

    async fn teams_with_members(
        &self,
        rows: &[sqlx::sqlite::SqliteRow],
    ) -> Result<Vec<Team>, AppError> {
        let mut teams = Vec::with_capacity(rows.len());
        for row in rows {
            let mut team = team_from_row(row);
            team.members = self.list_team_members(&team.id).await?;
            teams.push(team);
        }
        Ok(teams)
    }
}

// Helper functions for row conversion

fn team_from_row(row: &sqlx::sqlite::SqliteRow) -> Team {
    Team {
        id: row.get("id"),
        organization_id: row.get("organization_id"),
        leader_id: row.get("leader_id"),
        name: row.get("name"),
        is_active: flag(row, "is_active"),
        members: Vec::new(),
        created_at: row.get("created_at"),
    }
}

fn member_from_row(row: &sqlx::sqlite::SqliteRow) -> TeamMember {
    TeamMember {
        id: row.get("id"),
        team_id: row.get("team_id"),
        user_id: row.get("user_id"),
        is_leader: flag(row, "is_leader"),
        created_at: row.get("created_at"),
    }
}
