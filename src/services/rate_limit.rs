//! Fixed-window rate limiting
//!
//! A counter per identifier is opened with `count = 1` and
//! `reset = now + window`. Later hits inside the window increment it until
//! it reaches the limit, after which requests are denied without touching
//! the counter. Once `now > reset` the next hit opens a fresh window.
//!
//! Counters live behind [`CounterStore`]: an in-process map for a single
//! instance, or a shared SQL table when several instances front the same
//! database.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::alerting::{AlertChannel, AlertKind, OpsAlert};
use crate::config::{RateLimitBackend, RateLimitConfig, TierConfig};
use crate::models::{AuditAction, ClientMeta, NewAuditEntry, ResourceType, SecurityEvent, Severity};

/// Rate limit budget a request is charged against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Every request, keyed by client IP
    General,
    /// Authentication and reveal, keyed by `sensitive:<ip>`
    Sensitive,
}

impl Tier {
    pub fn identifier(&self, ip: &str) -> String {
        match self {
            Tier::General => ip.to_string(),
            Tier::Sensitive => format!("sensitive:{}", ip),
        }
    }

    /// Severity of the audit entry written when this tier denies
    pub fn severity(&self) -> Severity {
        match self {
            Tier::General => Severity::Medium,
            Tier::Sensitive => Severity::High,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::General => "general",
            Tier::Sensitive => "sensitive",
        }
    }

    /// Audit entry recording that this tier turned a request away
    pub fn denial_entry(&self, client: &ClientMeta) -> NewAuditEntry {
        NewAuditEntry::new(AuditAction::Access, ResourceType::Endpoint)
            .resource(&client.path)
            .security(SecurityEvent::RateLimitExceeded, self.severity())
            .client(client)
            .details(serde_json::json!({
                "path": client.path,
                "method": client.method,
                "identifier": self.identifier(&client.ip),
                "tier": self.as_str(),
            }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowLimit {
    pub window: Duration,
    pub max_requests: u32,
}

impl WindowLimit {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
        }
    }

    fn window_ms(&self) -> i64 {
        i64::try_from(self.window.as_millis()).unwrap_or(i64::MAX)
    }
}

impl From<TierConfig> for WindowLimit {
    fn from(tier: TierConfig) -> Self {
        Self::new(Duration::from_secs(tier.window_secs), tier.max_requests)
    }
}

/// Result of charging one request to a counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    /// End of the current window, epoch milliseconds
    pub reset_at_ms: i64,
}

/// Storage for fixed-window counters
///
/// `hit` must check and increment as one atomic step.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn hit(&self, key: &str, limit: WindowLimit, now_ms: i64) -> Result<Decision>;

    /// Drop windows that ended before `now_ms`; returns how many went
    async fn purge_expired(&self, now_ms: i64) -> Result<u64>;
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at_ms: i64,
}

/// Single-instance counter store
#[derive(Default)]
pub struct MemoryCounterStore {
    windows: Mutex<HashMap<String, Window>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn hit(&self, key: &str, limit: WindowLimit, now_ms: i64) -> Result<Decision> {
        let mut windows = self.windows.lock().await;

        match windows.get_mut(key) {
            Some(w) if now_ms <= w.reset_at_ms => {
                if w.count >= limit.max_requests {
                    return Ok(Decision {
                        allowed: false,
                        reset_at_ms: w.reset_at_ms,
                    });
                }
                w.count += 1;
                Ok(Decision {
                    allowed: true,
                    reset_at_ms: w.reset_at_ms,
                })
            }
            _ => {
                let reset_at_ms = now_ms.saturating_add(limit.window_ms());
                windows.insert(
                    key.to_string(),
                    Window {
                        count: 1,
                        reset_at_ms,
                    },
                );
                Ok(Decision {
                    allowed: true,
                    reset_at_ms,
                })
            }
        }
    }

    async fn purge_expired(&self, now_ms: i64) -> Result<u64> {
        let mut windows = self.windows.lock().await;
        let before = windows.len();
        windows.retain(|_, w| w.reset_at_ms >= now_ms);
        Ok((before - windows.len()) as u64)
    }
}

/// Counter store shared through the `rate_limit_counters` table
///
/// Every step is a single conditional statement, so concurrent instances
/// never both take the last slot of a window.
pub struct SqlCounterStore {
    pool: SqlitePool,
}

impl SqlCounterStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn increment_live(&self, key: &str, limit: WindowLimit, now_ms: i64) -> Result<Option<i64>> {
        sqlx::query_scalar(
            r#"
            UPDATE rate_limit_counters
            SET count = count + 1
            WHERE key = ? AND reset_at_ms >= ? AND count < ?
            RETURNING reset_at_ms
            "#,
        )
        .bind(key)
        .bind(now_ms)
        .bind(i64::from(limit.max_requests))
        .fetch_optional(&self.pool)
        .await
        .context("Failed to increment rate limit counter")
    }
}

#[async_trait]
impl CounterStore for SqlCounterStore {
    async fn hit(&self, key: &str, limit: WindowLimit, now_ms: i64) -> Result<Decision> {
        if let Some(reset_at_ms) = self.increment_live(key, limit, now_ms).await? {
            return Ok(Decision {
                allowed: true,
                reset_at_ms,
            });
        }

        // No live window: open one, replacing an expired row if present
        let opened: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO rate_limit_counters (key, count, reset_at_ms)
            VALUES (?, 1, ?)
            ON CONFLICT(key) DO UPDATE
                SET count = 1, reset_at_ms = excluded.reset_at_ms
                WHERE rate_limit_counters.reset_at_ms < ?
            RETURNING reset_at_ms
            "#,
        )
        .bind(key)
        .bind(now_ms.saturating_add(limit.window_ms()))
        .bind(now_ms)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to open rate limit window")?;

        if let Some(reset_at_ms) = opened {
            return Ok(Decision {
                allowed: true,
                reset_at_ms,
            });
        }

        // Another writer opened the window between the two statements
        if let Some(reset_at_ms) = self.increment_live(key, limit, now_ms).await? {
            return Ok(Decision {
                allowed: true,
                reset_at_ms,
            });
        }

        let reset_at_ms: Option<i64> =
            sqlx::query_scalar("SELECT reset_at_ms FROM rate_limit_counters WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .context("Failed to read rate limit counter")?;

        Ok(Decision {
            allowed: false,
            reset_at_ms: reset_at_ms.unwrap_or(now_ms),
        })
    }

    async fn purge_expired(&self, now_ms: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM rate_limit_counters WHERE reset_at_ms < ?")
            .bind(now_ms)
            .execute(&self.pool)
            .await
            .context("Failed to purge rate limit counters")?;

        Ok(result.rows_affected())
    }
}

/// Outcome of a tier check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateCheck {
    pub allowed: bool,
    pub retry_after_secs: u64,
}

/// Tiered rate limiter shared by the HTTP layer and the vault service
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    general: WindowLimit,
    sensitive: WindowLimit,
    alerts: AlertChannel,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, config: &RateLimitConfig, alerts: AlertChannel) -> Self {
        Self {
            store,
            general: config.general.into(),
            sensitive: config.sensitive.into(),
            alerts,
        }
    }

    /// Build a limiter over the configured backend
    pub fn from_config(config: &RateLimitConfig, pool: &SqlitePool, alerts: AlertChannel) -> Self {
        let store: Arc<dyn CounterStore> = match config.backend {
            RateLimitBackend::Memory => Arc::new(MemoryCounterStore::new()),
            RateLimitBackend::Database => Arc::new(SqlCounterStore::new(pool.clone())),
        };
        info!(backend = ?config.backend, "Rate limiter initialized");
        Self::new(store, config, alerts)
    }

    pub fn limit(&self, tier: Tier) -> WindowLimit {
        match tier {
            Tier::General => self.general,
            Tier::Sensitive => self.sensitive,
        }
    }

    /// Charge one request to `identifier` now
    pub async fn allow(&self, identifier: &str, window: Duration, max_requests: u32) -> bool {
        self.allow_at(identifier, WindowLimit::new(window, max_requests), Utc::now().timestamp_millis())
            .await
            .allowed
    }

    /// Charge one request at an explicit time; a store failure denies
    pub async fn allow_at(&self, identifier: &str, limit: WindowLimit, now_ms: i64) -> RateCheck {
        match self.store.hit(identifier, limit, now_ms).await {
            Ok(decision) => {
                let remaining_ms = (decision.reset_at_ms - now_ms).max(0) as u64;
                RateCheck {
                    allowed: decision.allowed,
                    retry_after_secs: remaining_ms.div_ceil(1000).max(1),
                }
            }
            Err(e) => {
                warn!(identifier = %identifier, "Rate limit store failed, denying: {:#}", e);
                self.alerts.raise(
                    OpsAlert::new(AlertKind::RateLimitStoreFailure, "Rate limit counter store failed")
                        .with_context(serde_json::json!({
                            "identifier": identifier,
                            "error": format!("{:#}", e),
                        })),
                );
                RateCheck {
                    allowed: false,
                    retry_after_secs: limit.window.as_secs().max(1),
                }
            }
        }
    }

    /// Charge a request from `ip` to a tier
    pub async fn check(&self, tier: Tier, ip: &str) -> RateCheck {
        let identifier = tier.identifier(ip);
        let check = self
            .allow_at(&identifier, self.limit(tier), Utc::now().timestamp_millis())
            .await;
        if !check.allowed {
            debug!(tier = tier.as_str(), identifier = %identifier, "Rate limit exceeded");
        }
        check
    }

    pub async fn purge_expired(&self) -> Result<u64> {
        self.store.purge_expired(Utc::now().timestamp_millis()).await
    }

    /// Periodically drop expired windows
    pub fn spawn_cleanup(&self, interval: Duration) -> JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match limiter.purge_expired().await {
                    Ok(0) => {}
                    Ok(n) => debug!("Rate limiter cleanup removed {} expired windows", n),
                    Err(e) => warn!("Rate limiter cleanup failed: {:#}", e),
                }
            }
        })
    }
}
