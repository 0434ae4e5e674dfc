//! Shared fixtures for service tests

use std::sync::Arc;

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;
use zeroize::Zeroizing;

use super::{
    AccountService, AlertChannel, RequestContext, Services, TeamService, VaultService,
};
use crate::config::{AppConfig, Argon2Settings};
use crate::db::{test_pool, AuditRepository, TeamRepository, UserRepository};
use crate::models::{AuditEntry, ClientMeta, NewSecret, SecurityEvent, TeamRole, User};

pub(crate) const TEST_MASTER_KEY: &str = "MDEyMzQ1Njc4OWFiY2RlZjAxMjM0NTY3ODlhYmNkZWY=";

pub(crate) fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.vault.master_key = TEST_MASTER_KEY.to_string();
    config.auth.argon2 = Argon2Settings {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    };
    config
}

pub(crate) struct Harness {
    pub pool: SqlitePool,
    pub config: AppConfig,
    pub vault: Arc<VaultService>,
    pub accounts: Arc<AccountService>,
    pub teams: Arc<TeamService>,
    pub alerts: AlertChannel,
}

impl Harness {
    pub async fn new() -> Self {
        let pool = test_pool().await;
        let config = test_config();
        let services = Services::build(&config, &pool).expect("services");

        Self {
            pool,
            config,
            vault: services.vault,
            accounts: services.accounts,
            teams: services.teams,
            alerts: services.alerts,
        }
    }

    pub fn ctx(&self, actor: Uuid) -> RequestContext {
        RequestContext::new(
            actor,
            ClientMeta::new("198.51.100.7", "POST", "/apikeys/reveal").with_user_agent("keyvault-tests"),
        )
    }

    /// Insert a user directly, skipping password hashing
    pub async fn user(&self, email: &str) -> Uuid {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            full_name: email.split('@').next().unwrap_or(email).to_string(),
            password_hash: "00".repeat(32),
            password_salt: "11".repeat(32),
            created_at: now,
            updated_at: now,
        };
        UserRepository::new(&self.pool).insert(&user).await.unwrap();
        user.id
    }

    pub fn new_secret(&self, name: &str, value: &str) -> NewSecret {
        NewSecret {
            name: name.to_string(),
            value: Zeroizing::new(value.to_string()),
            description: None,
            tags: vec![],
        }
    }

    pub async fn team(&self, owner: Uuid, name: &str) -> Uuid {
        self.teams
            .create_team(&self.ctx(owner), name, None)
            .await
            .unwrap()
            .id
    }

    /// Pending membership
    pub async fn invite(&self, team: Uuid, user: Uuid, role: TeamRole) {
        TeamRepository::new(&self.pool)
            .insert_membership(&crate::db::pending_membership(team, user, role))
            .await
            .unwrap();
    }

    /// Active membership
    pub async fn member(&self, team: Uuid, user: Uuid, role: TeamRole) {
        self.invite(team, user, role).await;
        assert!(TeamRepository::new(&self.pool)
            .activate_membership(team, user)
            .await
            .unwrap());
    }

    pub async fn events(&self, event: SecurityEvent) -> Vec<AuditEntry> {
        AuditRepository::new(&self.pool)
            .list_by_event(event)
            .await
            .unwrap()
    }
}
