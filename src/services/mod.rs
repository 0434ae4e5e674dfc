//! Business logic services

pub mod access;
pub mod accounts;
pub mod alerting;
pub mod audit;
pub mod cipher;
pub mod error;
pub mod hasher;
pub mod rate_limit;
pub mod teams;
pub mod vault;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::SqlitePool;

use crate::config::AppConfig;

pub use access::{AccessPolicy, AccessResolver, MembershipStore, SqlMembershipStore};
pub use accounts::AccountService;
pub use alerting::{AlertChannel, AlertKind, OpsAlert};
pub use audit::AuditLog;
pub use cipher::{MasterKey, SecretCipher};
pub use error::{VaultError, VaultResult};
pub use hasher::CredentialHasher;
pub use rate_limit::{CounterStore, MemoryCounterStore, RateLimiter, SqlCounterStore, Tier};
pub use teams::{MemberRef, TeamService};
pub use vault::{RequestContext, VaultService};

/// Every service wired to one database and configuration
#[derive(Clone)]
pub struct Services {
    pub vault: Arc<VaultService>,
    pub accounts: Arc<AccountService>,
    pub teams: Arc<TeamService>,
    pub audit: AuditLog,
    pub limiter: RateLimiter,
    pub alerts: AlertChannel,
}

impl Services {
    pub fn build(config: &AppConfig, pool: &SqlitePool) -> Result<Self> {
        let alerts = AlertChannel::new(&config.alerts)?;
        let timeout = Duration::from_secs(config.vault.store_timeout_secs);
        let audit = AuditLog::new(pool.clone(), alerts.clone(), timeout);
        let limiter = RateLimiter::from_config(&config.rate_limit, pool, alerts.clone());

        let access = AccessResolver::new(
            Arc::new(SqlMembershipStore::new(pool.clone())),
            AccessPolicy::from_config(&config.access),
            timeout,
            alerts.clone(),
        );
        let cipher = SecretCipher::new(&config.vault.master_key()?);

        let vault = VaultService::new(
            pool.clone(),
            cipher,
            access.clone(),
            limiter.clone(),
            audit.clone(),
            alerts.clone(),
            timeout,
        );
        let accounts = AccountService::new(pool.clone(), &config.auth, audit.clone(), timeout)
            .context("Failed to initialize account service")?;
        let teams = TeamService::new(pool.clone(), access, audit.clone(), timeout);

        Ok(Self {
            vault: Arc::new(vault),
            accounts: Arc::new(accounts),
            teams: Arc::new(teams),
            audit,
            limiter,
            alerts,
        })
    }
}
