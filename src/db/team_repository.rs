//! Team, membership and secret grant repository

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::warn;
use uuid::Uuid;

use super::{format_db_timestamp, parse_db_timestamp, parse_uuid};
use crate::models::{MembershipStatus, SecretTeamGrant, Team, TeamMembership, TeamRole, TeamSummary};

#[derive(Debug, sqlx::FromRow)]
struct TeamRow {
    id: String,
    name: String,
    description: Option<String>,
    owner_id: String,
    created_at: String,
}

#[derive(Debug, sqlx::FromRow)]
struct MembershipDbRow {
    team_id: String,
    user_id: String,
    role: String,
    status: String,
    created_at: String,
}

#[derive(Debug, sqlx::FromRow)]
struct GrantRow {
    team_id: String,
    secret_id: String,
    granted_by: Option<String>,
    created_at: String,
}

#[derive(Debug, sqlx::FromRow)]
struct TeamSummaryRow {
    #[sqlx(flatten)]
    team: TeamRow,
    role: String,
    status: String,
    member_count: i64,
    key_count: i64,
}

/// Role and status exactly as stored, for callers that must decide how to
/// treat values they do not recognise
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct MembershipRow {
    pub team_id: String,
    pub role: String,
    pub status: String,
}

impl TryFrom<TeamRow> for Team {
    type Error = anyhow::Error;

    fn try_from(row: TeamRow) -> Result<Self> {
        Ok(Team {
            id: parse_uuid(&row.id)?,
            name: row.name,
            description: row.description,
            owner_id: parse_uuid(&row.owner_id)?,
            created_at: parse_db_timestamp(&row.created_at),
        })
    }
}

impl TryFrom<MembershipDbRow> for TeamMembership {
    type Error = anyhow::Error;

    fn try_from(row: MembershipDbRow) -> Result<Self> {
        Ok(TeamMembership {
            team_id: parse_uuid(&row.team_id)?,
            user_id: parse_uuid(&row.user_id)?,
            role: row.role.parse::<TeamRole>().map_err(anyhow::Error::msg)?,
            status: row.status.parse::<MembershipStatus>().map_err(anyhow::Error::msg)?,
            created_at: parse_db_timestamp(&row.created_at),
        })
    }
}

impl TryFrom<TeamSummaryRow> for TeamSummary {
    type Error = anyhow::Error;

    fn try_from(row: TeamSummaryRow) -> Result<Self> {
        let status = row.status.parse::<MembershipStatus>().map_err(anyhow::Error::msg)?;
        let active = status == MembershipStatus::Active;
        let team = Team::try_from(row.team)?;
        Ok(TeamSummary {
            id: team.id,
            name: team.name,
            description: team.description,
            owner_id: team.owner_id,
            role: row.role.parse::<TeamRole>().map_err(anyhow::Error::msg)?,
            status,
            member_count: active.then_some(row.member_count),
            key_count: active.then_some(row.key_count),
            created_at: team.created_at,
        })
    }
}

impl TryFrom<GrantRow> for SecretTeamGrant {
    type Error = anyhow::Error;

    fn try_from(row: GrantRow) -> Result<Self> {
        Ok(SecretTeamGrant {
            team_id: parse_uuid(&row.team_id)?,
            secret_id: parse_uuid(&row.secret_id)?,
            granted_by: row.granted_by.as_deref().map(parse_uuid).transpose()?,
            created_at: parse_db_timestamp(&row.created_at),
        })
    }
}

pub struct TeamRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> TeamRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a team and the creator's active owner membership together
    pub async fn create_with_owner(&self, team: &Team) -> Result<TeamMembership> {
        let created_at = format_db_timestamp(&team.created_at);
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query(
            "INSERT INTO teams (id, name, description, owner_id, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(team.id.to_string())
        .bind(&team.name)
        .bind(team.description.as_deref())
        .bind(team.owner_id.to_string())
        .bind(&created_at)
        .execute(&mut *tx)
        .await
        .context("Failed to insert team")?;

        sqlx::query(
            "INSERT INTO team_memberships (team_id, user_id, role, status, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(team.id.to_string())
        .bind(team.owner_id.to_string())
        .bind(TeamRole::Owner.as_str())
        .bind(MembershipStatus::Active.as_str())
        .bind(&created_at)
        .execute(&mut *tx)
        .await
        .context("Failed to insert owner membership")?;

        tx.commit().await.context("Failed to commit team creation")?;

        Ok(TeamMembership {
            team_id: team.id,
            user_id: team.owner_id,
            role: TeamRole::Owner,
            status: MembershipStatus::Active,
            created_at: team.created_at,
        })
    }

    pub async fn find_team(&self, id: Uuid) -> Result<Option<Team>> {
        let row = sqlx::query_as::<_, TeamRow>(
            "SELECT id, name, description, owner_id, created_at FROM teams WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(self.pool)
        .await
        .context("Failed to fetch team")?;

        row.map(Team::try_from).transpose()
    }

    pub async fn insert_membership(&self, membership: &TeamMembership) -> Result<()> {
        sqlx::query(
            "INSERT INTO team_memberships (team_id, user_id, role, status, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(membership.team_id.to_string())
        .bind(membership.user_id.to_string())
        .bind(membership.role.as_str())
        .bind(membership.status.as_str())
        .bind(format_db_timestamp(&membership.created_at))
        .execute(self.pool)
        .await
        .context("Failed to insert team membership")?;

        Ok(())
    }

    pub async fn find_membership(&self, team_id: Uuid, user_id: Uuid) -> Result<Option<TeamMembership>> {
        let row = sqlx::query_as::<_, MembershipDbRow>(
            "SELECT team_id, user_id, role, status, created_at FROM team_memberships WHERE team_id = ? AND user_id = ?",
        )
        .bind(team_id.to_string())
        .bind(user_id.to_string())
        .fetch_optional(self.pool)
        .await
        .context("Failed to fetch team membership")?;

        row.map(TeamMembership::try_from).transpose()
    }

    /// The user's memberships in every team that holds a grant on the secret
    pub async fn memberships_for_secret(&self, user_id: Uuid, secret_id: Uuid) -> Result<Vec<MembershipRow>> {
        sqlx::query_as::<_, MembershipRow>(
            r#"
            SELECT m.team_id, m.role, m.status
            FROM team_memberships m
            INNER JOIN secret_team_grants g ON g.team_id = m.team_id
            WHERE m.user_id = ? AND g.secret_id = ?
            "#,
        )
        .bind(user_id.to_string())
        .bind(secret_id.to_string())
        .fetch_all(self.pool)
        .await
        .context("Failed to fetch memberships for secret")
    }

    /// Raw membership of a user in one team
    pub async fn membership_row(&self, team_id: Uuid, user_id: Uuid) -> Result<Option<MembershipRow>> {
        sqlx::query_as::<_, MembershipRow>(
            "SELECT team_id, role, status FROM team_memberships WHERE team_id = ? AND user_id = ?",
        )
        .bind(team_id.to_string())
        .bind(user_id.to_string())
        .fetch_optional(self.pool)
        .await
        .context("Failed to fetch team membership")
    }

    /// Move a pending membership to active
    pub async fn activate_membership(&self, team_id: Uuid, user_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE team_memberships SET status = 'active' WHERE team_id = ? AND user_id = ? AND status = 'pending'",
        )
        .bind(team_id.to_string())
        .bind(user_id.to_string())
        .execute(self.pool)
        .await
        .context("Failed to activate team membership")?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn delete_membership(&self, team_id: Uuid, user_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM team_memberships WHERE team_id = ? AND user_id = ?")
            .bind(team_id.to_string())
            .bind(user_id.to_string())
            .execute(self.pool)
            .await
            .context("Failed to delete team membership")?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn list_members(&self, team_id: Uuid) -> Result<Vec<TeamMembership>> {
        let rows = sqlx::query_as::<_, MembershipDbRow>(
            "SELECT team_id, user_id, role, status, created_at FROM team_memberships WHERE team_id = ? ORDER BY created_at",
        )
        .bind(team_id.to_string())
        .fetch_all(self.pool)
        .await
        .context("Failed to list team members")?;

        Ok(rows
            .into_iter()
            .filter_map(|row| match TeamMembership::try_from(row) {
                Ok(m) => Some(m),
                Err(e) => {
                    warn!("Skipping unreadable team membership: {}", e);
                    None
                }
            })
            .collect())
    }

    /// Every team the user belongs to or is invited to, newest first
    pub async fn teams_for_user(&self, user_id: Uuid) -> Result<Vec<TeamSummary>> {
        let rows = sqlx::query_as::<_, TeamSummaryRow>(
            r#"
            SELECT t.id, t.name, t.description, t.owner_id, t.created_at, m.role, m.status,
                   (SELECT COUNT(*) FROM team_memberships a
                     WHERE a.team_id = t.id AND a.status = 'active') AS member_count,
                   (SELECT COUNT(*) FROM secret_team_grants g WHERE g.team_id = t.id) AS key_count
            FROM teams t
            INNER JOIN team_memberships m ON m.team_id = t.id
            WHERE m.user_id = ?
            ORDER BY t.created_at DESC
            "#,
        )
        .bind(user_id.to_string())
        .fetch_all(self.pool)
        .await
        .context("Failed to list teams for user")?;

        Ok(rows
            .into_iter()
            .filter_map(|row| match TeamSummary::try_from(row) {
                Ok(t) => Some(t),
                Err(e) => {
                    warn!("Skipping unreadable team membership: {}", e);
                    None
                }
            })
            .collect())
    }

    pub async fn count_active_teams(&self, user_id: Uuid) -> Result<i64> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM team_memberships WHERE user_id = ? AND status = 'active'",
        )
        .bind(user_id.to_string())
        .fetch_one(self.pool)
        .await
        .context("Failed to count teams")
    }

    pub async fn insert_grant(&self, grant: &SecretTeamGrant) -> Result<()> {
        sqlx::query(
            "INSERT INTO secret_team_grants (team_id, secret_id, granted_by, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(grant.team_id.to_string())
        .bind(grant.secret_id.to_string())
        .bind(grant.granted_by.map(|u| u.to_string()))
        .bind(format_db_timestamp(&grant.created_at))
        .execute(self.pool)
        .await
        .context("Failed to insert secret grant")?;

        Ok(())
    }

    pub async fn delete_grant(&self, team_id: Uuid, secret_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM secret_team_grants WHERE team_id = ? AND secret_id = ?")
            .bind(team_id.to_string())
            .bind(secret_id.to_string())
            .execute(self.pool)
            .await
            .context("Failed to delete secret grant")?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn list_grants(&self, team_id: Uuid) -> Result<Vec<SecretTeamGrant>> {
        let rows = sqlx::query_as::<_, GrantRow>(
            "SELECT team_id, secret_id, granted_by, created_at FROM secret_team_grants WHERE team_id = ? ORDER BY created_at",
        )
        .bind(team_id.to_string())
        .fetch_all(self.pool)
        .await
        .context("Failed to list secret grants")?;

        rows.into_iter().map(SecretTeamGrant::try_from).collect()
    }

    pub async fn count_grants_for_secret(&self, secret_id: Uuid) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM secret_team_grants WHERE secret_id = ?")
            .bind(secret_id.to_string())
            .fetch_one(self.pool)
            .await
            .context("Failed to count secret grants")
    }
}

/// Convenience constructor for a freshly invited membership
#[cfg(test)]
pub(crate) fn pending_membership(team_id: Uuid, user_id: Uuid, role: TeamRole) -> TeamMembership {
    TeamMembership {
        team_id,
        user_id,
        role,
        status: MembershipStatus::Pending,
        created_at: chrono::Utc::now(),
    }
}
