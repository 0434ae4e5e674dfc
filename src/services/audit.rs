//! Audit log writer and activity queries
//!
//! Recording never fails from the caller's point of view: a write that does
//! not land (or does not land before the store deadline) is logged and
//! escalated through the alert channel instead.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Duration as ChronoDuration, DurationRound, TimeZone, Utc};
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::error;
use uuid::Uuid;

use super::alerting::{AlertChannel, AlertKind, OpsAlert};
use super::error::{bounded, VaultResult};
use crate::db::AuditRepository;
use crate::models::{
    ActivityDashboard, ActivityDetail, ActivityQuery, ActivitySummary, AuditEntry, NewAuditEntry,
};

const DEFAULT_PAGE: u32 = 10;
const MAX_PAGE: u32 = 100;

#[derive(Clone)]
pub struct AuditLog {
    pool: SqlitePool,
    alerts: AlertChannel,
    timeout: Duration,
    last: Arc<Mutex<DateTime<Utc>>>,
}

impl AuditLog {
    pub fn new(pool: SqlitePool, alerts: AlertChannel, timeout: Duration) -> Self {
        Self {
            pool,
            alerts,
            timeout,
            last: Arc::new(Mutex::new(DateTime::<Utc>::MIN_UTC)),
        }
    }

    /// Append an entry; returns the stored entry, or `None` if the write failed
    pub async fn record(&self, entry: NewAuditEntry) -> Option<AuditEntry> {
        // Held across the insert so stored order matches timestamp order
        let mut last = self.last.lock().await;
        let created_at = next_timestamp(*last, Utc::now());

        let repo = AuditRepository::new(&self.pool);
        match bounded(self.timeout, "audit write", repo.insert(&entry, created_at)).await {
            Ok(stored) => {
                *last = created_at;
                Some(stored)
            }
            Err(e) => {
                error!(
                    action = entry.action.as_str(),
                    resource_type = entry.resource_type.as_str(),
                    "Failed to write audit entry: {:#}",
                    e
                );
                self.alerts.raise(
                    OpsAlert::new(AlertKind::AuditWriteFailed, "Audit log write failed")
                        .with_context(serde_json::json!({
                            "action": entry.action.as_str(),
                            "resourceType": entry.resource_type.as_str(),
                            "resourceId": entry.resource_id,
                            "event": entry.event.map(|e| e.as_str()),
                            "error": format!("{:#}", e),
                        })),
                );
                None
            }
        }
    }

    /// Summary counts plus a page of the actor's own entries
    pub async fn dashboard(&self, actor: Uuid, query: &ActivityQuery) -> VaultResult<ActivityDashboard> {
        let repo = AuditRepository::new(&self.pool);
        let limit = query.limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE);
        let offset = query.offset.unwrap_or(0);

        let queries = async {
            let summary = ActivitySummary {
                total_actions: repo.count_for_actor(actor, None).await?,
                todays_activity: repo.count_for_actor(actor, Some(start_of_day(Utc::now()))).await?,
                security_events: repo.count_security_events_for_actor(actor).await?,
            };
            let records = repo.list_for_actor(actor, limit, offset).await?;
            Ok::<_, anyhow::Error>(ActivityDashboard { summary, records })
        };
        bounded(self.timeout, "activity dashboard", queries).await
    }

    pub async fn detail(&self, actor: Uuid) -> VaultResult<ActivityDetail> {
        let repo = AuditRepository::new(&self.pool);
        let now = Utc::now();

        let queries = async {
            Ok::<_, anyhow::Error>(ActivityDetail {
                total_activities: repo.count_for_actor(actor, None).await?,
                activities_today: repo.count_for_actor(actor, Some(start_of_day(now))).await?,
                activities_this_week: repo.count_for_actor(actor, Some(start_of_week(now))).await?,
                security_events: repo.count_security_events_for_actor(actor).await?,
                activity_types: repo.counts_by_action(actor).await?,
            })
        };
        bounded(self.timeout, "activity detail", queries).await
    }

    /// Entries of the actor's since `since`
    pub async fn count_since(&self, actor: Uuid, since: DateTime<Utc>) -> VaultResult<i64> {
        bounded(
            self.timeout,
            "activity count",
            AuditRepository::new(&self.pool).count_for_actor(actor, Some(since)),
        )
        .await
    }
}

/// Strictly after `last`, at the microsecond precision stored in the table
fn next_timestamp(last: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    let now = now
        .duration_trunc(ChronoDuration::microseconds(1))
        .unwrap_or(now);
    if now > last {
        now
    } else {
        last + ChronoDuration::microseconds(1)
    }
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.from_utc_datetime(&now.date_naive().and_time(chrono::NaiveTime::MIN))
}

fn start_of_week(now: DateTime<Utc>) -> DateTime<Utc> {
    let days_since_monday = i64::from(now.weekday().num_days_from_monday());
    start_of_day(now) - ChronoDuration::days(days_since_monday)
}
