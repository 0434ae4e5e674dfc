//! User repository

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{format_db_timestamp, parse_db_timestamp, parse_uuid};
use crate::models::User;

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: String,
    email: String,
    full_name: String,
    password_hash: String,
    password_salt: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(User {
            id: parse_uuid(&row.id)?,
            email: row.email,
            full_name: row.full_name,
            password_hash: row.password_hash,
            password_salt: row.password_salt,
            created_at: parse_db_timestamp(&row.created_at),
            updated_at: parse_db_timestamp(&row.updated_at),
        })
    }
}

const USER_COLUMNS: &str =
    "id, email, full_name, password_hash, password_salt, created_at, updated_at";

pub struct UserRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UserRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, full_name, password_hash, password_salt, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user.id.to_string())
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(&user.password_hash)
        .bind(&user.password_salt)
        .bind(format_db_timestamp(&user.created_at))
        .bind(format_db_timestamp(&user.updated_at))
        .execute(self.pool)
        .await
        .context("Failed to insert user")?;

        Ok(())
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE email = ?",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(self.pool)
        .await
        .context("Failed to fetch user by email")?;

        row.map(User::try_from).transpose()
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE id = ?",
            USER_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(self.pool)
        .await
        .context("Failed to fetch user by ID")?;

        row.map(User::try_from).transpose()
    }

    /// Replace the stored credential; the only mutation of a user's hash and salt
    pub async fn update_password(
        &self,
        id: Uuid,
        password_hash: &str,
        password_salt: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE users SET password_hash = ?, password_salt = ?, updated_at = ? WHERE id = ?",
        )
        .bind(password_hash)
        .bind(password_salt)
        .bind(format_db_timestamp(&updated_at))
        .bind(id.to_string())
        .execute(self.pool)
        .await
        .context("Failed to update password")?;

        Ok(result.rows_affected() == 1)
    }
}
