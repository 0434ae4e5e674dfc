//! Access scope resolution
//!
//! Decides whether a user may read, reveal, modify or delete a secret. A
//! user relates to a secret as its owner or through an active membership in
//! a team the secret is granted to; the most permissive relation wins.
//! Anything that cannot be established (lookup errors, timeouts, pending
//! memberships, role strings we do not recognise) grants nothing.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::warn;
use uuid::Uuid;

use super::alerting::{AlertChannel, AlertKind, OpsAlert};
use super::error::bounded;
use crate::config::AccessConfig;
use crate::db::{MembershipRow, SecretRepository, TeamRepository};
use crate::models::{AccessLevel, MembershipStatus, Relation, TeamRole};

/// Levels granted to each relation
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    roles: HashMap<TeamRole, HashSet<AccessLevel>>,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        use AccessLevel::*;

        let team_write: HashSet<_> = [Read, Reveal, Modify].into_iter().collect();
        let roles = HashMap::from([
            (TeamRole::Owner, team_write.clone()),
            (TeamRole::Admin, team_write.clone()),
            (TeamRole::Member, team_write),
            (TeamRole::Viewer, [Read].into_iter().collect()),
        ]);

        Self { roles }
    }
}

impl AccessPolicy {
    /// Default table with per-role overrides applied
    pub fn from_config(config: &AccessConfig) -> Self {
        let mut policy = Self::default();
        for (role, levels) in &config.roles {
            policy
                .roles
                .insert(*role, levels.iter().copied().collect());
        }
        policy
    }

    pub fn permits(&self, relation: Relation, level: AccessLevel) -> bool {
        match relation {
            Relation::Owner => true,
            Relation::Team(role) => self
                .roles
                .get(&role)
                .is_some_and(|levels| levels.contains(&level)),
        }
    }

    /// Number of levels a relation grants, used to pick the most permissive
    fn rank(&self, relation: Relation) -> usize {
        AccessLevel::ALL
            .iter()
            .filter(|level| self.permits(relation, **level))
            .count()
    }
}

/// Source of ownership and membership facts
#[async_trait]
pub trait MembershipStore: Send + Sync {
    async fn secret_owner(&self, secret_id: Uuid) -> Result<Option<Uuid>>;

    /// The user's memberships in teams holding a grant on the secret
    async fn memberships_for_secret(&self, user_id: Uuid, secret_id: Uuid) -> Result<Vec<MembershipRow>>;

    async fn team_membership(&self, team_id: Uuid, user_id: Uuid) -> Result<Option<MembershipRow>>;
}

pub struct SqlMembershipStore {
    pool: SqlitePool,
}

impl SqlMembershipStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MembershipStore for SqlMembershipStore {
    async fn secret_owner(&self, secret_id: Uuid) -> Result<Option<Uuid>> {
        SecretRepository::new(&self.pool).owner_of(secret_id).await
    }

    async fn memberships_for_secret(&self, user_id: Uuid, secret_id: Uuid) -> Result<Vec<MembershipRow>> {
        TeamRepository::new(&self.pool)
            .memberships_for_secret(user_id, secret_id)
            .await
    }

    async fn team_membership(&self, team_id: Uuid, user_id: Uuid) -> Result<Option<MembershipRow>> {
        TeamRepository::new(&self.pool)
            .membership_row(team_id, user_id)
            .await
    }
}

/// Role of an active membership; anything else yields `None`
fn active_role(row: &MembershipRow) -> Option<TeamRole> {
    match row.status.parse::<MembershipStatus>() {
        Ok(MembershipStatus::Active) => {}
        Ok(MembershipStatus::Pending) => return None,
        Err(_) => {
            warn!(team_id = %row.team_id, status = %row.status, "Ignoring membership with unknown status");
            return None;
        }
    }

    match row.role.parse::<TeamRole>() {
        Ok(role) => Some(role),
        Err(_) => {
            warn!(team_id = %row.team_id, role = %row.role, "Ignoring membership with unknown role");
            None
        }
    }
}

#[derive(Clone)]
pub struct AccessResolver {
    store: Arc<dyn MembershipStore>,
    policy: Arc<AccessPolicy>,
    timeout: Duration,
    alerts: AlertChannel,
}

impl AccessResolver {
    pub fn new(
        store: Arc<dyn MembershipStore>,
        policy: AccessPolicy,
        timeout: Duration,
        alerts: AlertChannel,
    ) -> Self {
        Self {
            store,
            policy: Arc::new(policy),
            timeout,
            alerts,
        }
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    /// Every relation the actor holds to the secret
    ///
    /// Owner and team lookups fail independently; a failed lookup
    /// contributes no relation.
    pub async fn relations(&self, actor: Uuid, secret_id: Uuid) -> Vec<Relation> {
        let mut relations = Vec::new();

        match bounded(self.timeout, "secret owner lookup", self.store.secret_owner(secret_id)).await {
            Ok(Some(owner)) if owner == actor => relations.push(Relation::Owner),
            Ok(_) => {}
            Err(e) => self.lookup_failed(actor, secret_id, &e),
        }

        match bounded(
            self.timeout,
            "membership lookup",
            self.store.memberships_for_secret(actor, secret_id),
        )
        .await
        {
            Ok(rows) => relations.extend(rows.iter().filter_map(active_role).map(Relation::Team)),
            Err(e) => self.lookup_failed(actor, secret_id, &e),
        }

        relations
    }

    pub async fn can_access(&self, actor: Uuid, secret_id: Uuid, level: AccessLevel) -> bool {
        self.relations(actor, secret_id)
            .await
            .into_iter()
            .any(|relation| self.policy.permits(relation, level))
    }

    /// The actor's most permissive relation to the secret
    pub async fn resolve(&self, actor: Uuid, secret_id: Uuid) -> Option<Relation> {
        self.best(self.relations(actor, secret_id).await)
    }

    pub(crate) fn best(&self, relations: impl IntoIterator<Item = Relation>) -> Option<Relation> {
        relations
            .into_iter()
            .filter(|r| self.policy.rank(*r) > 0)
            .max_by_key(|r| (self.policy.rank(*r), matches!(r, Relation::Owner)))
    }

    /// The actor's role in a team, only if the membership is active
    pub async fn team_role(&self, actor: Uuid, team_id: Uuid) -> Option<TeamRole> {
        match bounded(
            self.timeout,
            "team membership lookup",
            self.store.team_membership(team_id, actor),
        )
        .await
        {
            Ok(row) => row.as_ref().and_then(active_role),
            Err(e) => {
                warn!(actor = %actor, team_id = %team_id, "Team membership lookup failed: {}", e);
                self.alerts.raise(
                    OpsAlert::new(AlertKind::MembershipLookupFailure, "Team membership lookup failed")
                        .with_context(serde_json::json!({
                            "actor": actor,
                            "teamId": team_id,
                            "error": e.to_string(),
                        })),
                );
                None
            }
        }
    }

    fn lookup_failed(&self, actor: Uuid, secret_id: Uuid, e: &super::VaultError) {
        warn!(actor = %actor, secret_id = %secret_id, "Access lookup failed, denying: {}", e);
        self.alerts.raise(
            OpsAlert::new(AlertKind::MembershipLookupFailure, "Access scope lookup failed")
                .with_context(serde_json::json!({
                    "actor": actor,
                    "secretId": secret_id,
                    "error": e.to_string(),
                })),
        );
    }
}
