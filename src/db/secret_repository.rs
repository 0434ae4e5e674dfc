//! Secret repository
//!
//! Rows hold the sealed value only; nothing here ever sees plaintext.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{format_db_timestamp, parse_db_timestamp, parse_uuid};
use crate::models::Secret;

#[derive(Debug, sqlx::FromRow)]
struct SecretRow {
    id: String,
    owner_id: String,
    name: String,
    description: Option<String>,
    tags: String,
    ciphertext: String,
    nonce: String,
    created_at: String,
    updated_at: String,
}

#[derive(Debug, sqlx::FromRow)]
struct SharedSecretRow {
    #[sqlx(flatten)]
    secret: SecretRow,
    role: String,
}

impl TryFrom<SecretRow> for Secret {
    type Error = anyhow::Error;

    fn try_from(row: SecretRow) -> Result<Self> {
        Ok(Secret {
            id: parse_uuid(&row.id)?,
            owner_id: parse_uuid(&row.owner_id)?,
            name: row.name,
            description: row.description,
            tags: serde_json::from_str(&row.tags).unwrap_or_default(),
            ciphertext: row.ciphertext,
            nonce: row.nonce,
            created_at: parse_db_timestamp(&row.created_at),
            updated_at: parse_db_timestamp(&row.updated_at),
        })
    }
}

const SECRET_COLUMNS: &str = "s.id, s.owner_id, s.name, s.description, s.tags, s.ciphertext, \
     s.nonce, s.created_at, s.updated_at";

pub struct SecretRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> SecretRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, secret: &Secret) -> Result<()> {
        let tags = serde_json::to_string(&secret.tags).context("Failed to encode tags")?;

        sqlx::query(
            r#"
            INSERT INTO secrets (id, owner_id, name, description, tags, ciphertext, nonce, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(secret.id.to_string())
        .bind(secret.owner_id.to_string())
        .bind(&secret.name)
        .bind(secret.description.as_deref())
        .bind(tags)
        .bind(&secret.ciphertext)
        .bind(&secret.nonce)
        .bind(format_db_timestamp(&secret.created_at))
        .bind(format_db_timestamp(&secret.updated_at))
        .execute(self.pool)
        .await
        .context("Failed to insert secret")?;

        Ok(())
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Secret>> {
        let row = sqlx::query_as::<_, SecretRow>(&format!(
            "SELECT {} FROM secrets s WHERE s.id = ?",
            SECRET_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(self.pool)
        .await
        .context("Failed to fetch secret")?;

        row.map(Secret::try_from).transpose()
    }

    pub async fn find_by_owner_and_name(&self, owner_id: Uuid, name: &str) -> Result<Option<Secret>> {
        let row = sqlx::query_as::<_, SecretRow>(&format!(
            "SELECT {} FROM secrets s WHERE s.owner_id = ? AND s.name = ?",
            SECRET_COLUMNS
        ))
        .bind(owner_id.to_string())
        .bind(name)
        .fetch_optional(self.pool)
        .await
        .context("Failed to fetch secret by name")?;

        row.map(Secret::try_from).transpose()
    }

    /// Secrets with this name that other users shared with one of the
    /// user's active teams
    pub async fn find_shared_by_name(&self, user_id: Uuid, name: &str) -> Result<Vec<Secret>> {
        let rows = sqlx::query_as::<_, SecretRow>(&format!(
            r#"
            SELECT DISTINCT {}
            FROM secrets s
            INNER JOIN secret_team_grants g ON g.secret_id = s.id
            INNER JOIN team_memberships m ON m.team_id = g.team_id
            WHERE m.user_id = ? AND m.status = 'active' AND s.name = ? AND s.owner_id != ?
            ORDER BY s.created_at
            "#,
            SECRET_COLUMNS
        ))
        .bind(user_id.to_string())
        .bind(name)
        .bind(user_id.to_string())
        .fetch_all(self.pool)
        .await
        .context("Failed to look up shared secrets")?;

        rows.into_iter().map(Secret::try_from).collect()
    }

    pub async fn list_owned(&self, owner_id: Uuid) -> Result<Vec<Secret>> {
        let rows = sqlx::query_as::<_, SecretRow>(&format!(
            "SELECT {} FROM secrets s WHERE s.owner_id = ? ORDER BY s.created_at DESC",
            SECRET_COLUMNS
        ))
        .bind(owner_id.to_string())
        .fetch_all(self.pool)
        .await
        .context("Failed to list owned secrets")?;

        rows.into_iter().map(Secret::try_from).collect()
    }

    /// Secrets reachable through the user's active team memberships, one
    /// row per (secret, role) pair; the role is returned unparsed
    pub async fn list_shared_with(&self, user_id: Uuid) -> Result<Vec<(Secret, String)>> {
        let rows = sqlx::query_as::<_, SharedSecretRow>(&format!(
            r#"
            SELECT {}, m.role AS role
            FROM secrets s
            INNER JOIN secret_team_grants g ON g.secret_id = s.id
            INNER JOIN team_memberships m ON m.team_id = g.team_id
            WHERE m.user_id = ? AND m.status = 'active' AND s.owner_id != ?
            ORDER BY s.created_at DESC
            "#,
            SECRET_COLUMNS
        ))
        .bind(user_id.to_string())
        .bind(user_id.to_string())
        .fetch_all(self.pool)
        .await
        .context("Failed to list shared secrets")?;

        rows.into_iter()
            .map(|row| Ok((Secret::try_from(row.secret)?, row.role)))
            .collect()
    }

    pub async fn owner_of(&self, id: Uuid) -> Result<Option<Uuid>> {
        let owner: Option<String> = sqlx::query_scalar("SELECT owner_id FROM secrets WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(self.pool)
            .await
            .context("Failed to fetch secret owner")?;

        owner.as_deref().map(parse_uuid).transpose()
    }

    /// Delete a secret and every team grant pointing at it, atomically
    pub async fn delete_with_grants(&self, id: Uuid) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query("DELETE FROM secret_team_grants WHERE secret_id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .context("Failed to delete secret grants")?;

        let result = sqlx::query("DELETE FROM secrets WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .context("Failed to delete secret")?;

        tx.commit().await.context("Failed to commit secret deletion")?;

        Ok(result.rows_affected() == 1)
    }
}
