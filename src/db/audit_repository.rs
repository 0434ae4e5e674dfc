//! Audit log repository
//!
//! Insert and read only. The table rejects UPDATE and DELETE through
//! triggers.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{format_db_timestamp, parse_db_timestamp, parse_uuid};
use crate::models::{AuditEntry, NewAuditEntry, SecurityEvent};

#[derive(Debug, sqlx::FromRow)]
struct AuditRow {
    id: String,
    actor_user_id: Option<String>,
    action: String,
    resource_type: String,
    resource_id: Option<String>,
    event: Option<String>,
    severity: Option<String>,
    outcome: String,
    details: String,
    ip_address: Option<String>,
    user_agent: Option<String>,
    created_at: String,
}

const AUDIT_COLUMNS: &str = "id, actor_user_id, action, resource_type, resource_id, event, \
     severity, outcome, details, ip_address, user_agent, created_at";

pub struct AuditRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> AuditRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Append one entry as a single statement
    pub async fn insert(&self, entry: &NewAuditEntry, created_at: DateTime<Utc>) -> Result<AuditEntry> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO audit_log (id, actor_user_id, action, resource_type, resource_id, event,
                                   severity, outcome, details, ip_address, user_agent, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(entry.actor_user_id.map(|u| u.to_string()))
        .bind(entry.action.as_str())
        .bind(entry.resource_type.as_str())
        .bind(entry.resource_id.as_deref())
        .bind(entry.event.map(|e| e.as_str()))
        .bind(entry.severity.map(|s| s.as_str()))
        .bind(entry.outcome.as_str())
        .bind(entry.details.to_string())
        .bind(entry.ip_address.as_deref())
        .bind(entry.user_agent.as_deref())
        .bind(format_db_timestamp(&created_at))
        .execute(self.pool)
        .await
        .context("Failed to insert audit log entry")?;

        Ok(AuditEntry {
            id,
            actor_user_id: entry.actor_user_id,
            action: entry.action,
            resource_type: entry.resource_type,
            resource_id: entry.resource_id.clone(),
            event: entry.event,
            severity: entry.severity,
            outcome: entry.outcome,
            details: entry.details.clone(),
            ip_address: entry.ip_address.clone(),
            user_agent: entry.user_agent.clone(),
            created_at,
        })
    }

    /// Entries recorded for an actor, newest first
    pub async fn list_for_actor(&self, actor: Uuid, limit: u32, offset: u32) -> Result<Vec<AuditEntry>> {
        let rows = sqlx::query_as::<_, AuditRow>(&format!(
            "SELECT {} FROM audit_log WHERE actor_user_id = ? ORDER BY created_at DESC LIMIT ? OFFSET ?",
            AUDIT_COLUMNS
        ))
        .bind(actor.to_string())
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(self.pool)
        .await
        .context("Failed to list audit log entries")?;

        rows.into_iter().map(row_to_audit).collect()
    }

    /// Entries carrying a given security event, oldest first
    pub async fn list_by_event(&self, event: SecurityEvent) -> Result<Vec<AuditEntry>> {
        let rows = sqlx::query_as::<_, AuditRow>(&format!(
            "SELECT {} FROM audit_log WHERE event = ? ORDER BY created_at",
            AUDIT_COLUMNS
        ))
        .bind(event.as_str())
        .fetch_all(self.pool)
        .await
        .context("Failed to list audit log entries by event")?;

        rows.into_iter().map(row_to_audit).collect()
    }

    /// Number of entries for an actor, optionally only those at or after `since`
    pub async fn count_for_actor(&self, actor: Uuid, since: Option<DateTime<Utc>>) -> Result<i64> {
        let since = since.map(|s| format_db_timestamp(&s));
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM audit_log WHERE actor_user_id = ? AND (? IS NULL OR created_at >= ?)",
        )
        .bind(actor.to_string())
        .bind(since.as_deref())
        .bind(since.as_deref())
        .fetch_one(self.pool)
        .await
        .context("Failed to count audit log entries")
    }

    pub async fn count_security_events_for_actor(&self, actor: Uuid) -> Result<i64> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM audit_log WHERE actor_user_id = ? AND event IS NOT NULL",
        )
        .bind(actor.to_string())
        .fetch_one(self.pool)
        .await
        .context("Failed to count security events")
    }

    /// Secrets the actor revealed successfully, most recent reveal first
    pub async fn recently_revealed(&self, actor: Uuid, limit: u32) -> Result<Vec<Uuid>> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT resource_id
            FROM audit_log
            WHERE actor_user_id = ? AND action = 'read' AND resource_type = 'secret'
              AND outcome = 'success' AND resource_id IS NOT NULL
            GROUP BY resource_id
            ORDER BY MAX(created_at) DESC
            LIMIT ?
            "#,
        )
        .bind(actor.to_string())
        .bind(limit as i64)
        .fetch_all(self.pool)
        .await
        .context("Failed to list recently revealed secrets")?;

        ids.iter().map(|id| parse_uuid(id)).collect()
    }

    /// Entry counts per `action:resource_type` pair for an actor
    pub async fn counts_by_action(&self, actor: Uuid) -> Result<BTreeMap<String, i64>> {
        let rows: Vec<(String, String, i64)> = sqlx::query_as(
            r#"
            SELECT action, resource_type, COUNT(*)
            FROM audit_log
            WHERE actor_user_id = ?
            GROUP BY action, resource_type
            "#,
        )
        .bind(actor.to_string())
        .fetch_all(self.pool)
        .await
        .context("Failed to count audit log entries by action")?;

        Ok(rows
            .into_iter()
            .map(|(action, resource, count)| (format!("{}:{}", action, resource), count))
            .collect())
    }
}

fn row_to_audit(row: AuditRow) -> Result<AuditEntry> {
    Ok(AuditEntry {
        id: parse_uuid(&row.id)?,
        actor_user_id: row.actor_user_id.as_deref().map(parse_uuid).transpose()?,
        action: row.action.parse().map_err(anyhow::Error::msg)?,
        resource_type: row.resource_type.parse().map_err(anyhow::Error::msg)?,
        resource_id: row.resource_id,
        event: row.event.and_then(|e| e.parse().ok()),
        severity: row.severity.and_then(|s| s.parse().ok()),
        outcome: row.outcome.parse().map_err(anyhow::Error::msg)?,
        details: serde_json::from_str(&row.details).unwrap_or(serde_json::Value::Null),
        ip_address: row.ip_address,
        user_agent: row.user_agent,
        created_at: parse_db_timestamp(&row.created_at),
    })
}
