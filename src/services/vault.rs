//! Vault service
//!
//! Every secret operation walks the same stages:
//!
//! ```text
//! Received -> RateChecked -> ScopeChecked -> Executed -> Audited -> Responded
//! ```
//!
//! A failed check jumps straight to `Audited`, so each denial is on record
//! (with the stage it failed at) before the caller hears about it.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::access::AccessResolver;
use super::alerting::{AlertChannel, AlertKind, OpsAlert};
use super::audit::AuditLog;
use super::cipher::{record_binding, SealedSecret, SecretCipher};
use super::error::{bounded, VaultError, VaultResult};
use super::rate_limit::{RateLimiter, Tier};
use crate::db::{is_unique_violation, AuditRepository, SecretRepository, TeamRepository};
use crate::models::{
    AccessLevel, AuditAction, ClientMeta, DashboardOverview, NewAuditEntry, NewSecret, Outcome,
    Relation, ResourceType, RevealedSecret, Secret, SecretMetadata, SecretRef, SecretTeamGrant,
    SecurityEvent, Severity, TeamRole,
};
use crate::utils::validation::{is_valid_secret_name, normalize_tags};

/// Keys shown in each list of the overview
const OVERVIEW_KEYS: usize = 5;

/// Who is asking, and from where
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub actor: Uuid,
    pub client: ClientMeta,
}

impl RequestContext {
    pub fn new(actor: Uuid, client: ClientMeta) -> Self {
        Self { actor, client }
    }

    fn entry(&self, action: AuditAction, resource_type: ResourceType) -> NewAuditEntry {
        NewAuditEntry::new(action, resource_type)
            .actor(self.actor)
            .client(&self.client)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Received,
    RateChecked,
    ScopeChecked,
    Executed,
    Audited,
    Responded,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::RateChecked => "rate_checked",
            Stage::ScopeChecked => "scope_checked",
            Stage::Executed => "executed",
            Stage::Audited => "audited",
            Stage::Responded => "responded",
        }
    }
}

/// Stage progression of one request; stages only move forward
#[derive(Debug)]
pub struct RequestTrace {
    id: Uuid,
    operation: &'static str,
    stages: Vec<Stage>,
}

impl RequestTrace {
    pub fn new(operation: &'static str) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation,
            stages: vec![Stage::Received],
        }
    }

    pub fn current(&self) -> Stage {
        self.stages.last().copied().unwrap_or(Stage::Received)
    }

    pub fn advance(&mut self, stage: Stage) {
        if stage > self.current() {
            self.stages.push(stage);
        } else {
            warn!(
                request = %self.id,
                operation = self.operation,
                from = self.current().as_str(),
                to = stage.as_str(),
                "Ignoring backwards stage transition"
            );
        }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Mark the request answered
    pub fn respond(mut self) -> Vec<Stage> {
        self.advance(Stage::Responded);
        debug!(
            request = %self.id,
            operation = self.operation,
            stages = ?self.stages,
            "Request completed"
        );
        self.stages
    }
}

pub struct VaultService {
    pool: SqlitePool,
    cipher: SecretCipher,
    access: AccessResolver,
    limiter: RateLimiter,
    audit: AuditLog,
    alerts: AlertChannel,
    timeout: Duration,
}

impl VaultService {
    pub fn new(
        pool: SqlitePool,
        cipher: SecretCipher,
        access: AccessResolver,
        limiter: RateLimiter,
        audit: AuditLog,
        alerts: AlertChannel,
        timeout: Duration,
    ) -> Self {
        Self {
            pool,
            cipher,
            access,
            limiter,
            audit,
            alerts,
            timeout,
        }
    }

    pub fn access(&self) -> &AccessResolver {
        &self.access
    }

    /// Seal and reopen a canary value with the configured master key
    pub fn cipher_ready(&self) -> bool {
        const CANARY: &str = "keyvault-readiness";
        let aad = record_binding(Uuid::nil(), Uuid::nil());
        self.cipher
            .encrypt(CANARY, &aad)
            .and_then(|sealed| self.cipher.decrypt(&sealed, &aad))
            .map(|opened| opened.as_str() == CANARY)
            .unwrap_or(false)
    }

    /// Encrypt and store a new secret owned by the caller
    pub async fn create_secret(&self, ctx: &RequestContext, new: NewSecret) -> VaultResult<SecretMetadata> {
        let mut trace = RequestTrace::new("create_secret");

        let name = new.name.trim().to_string();
        if !is_valid_secret_name(&name) {
            return Err(VaultError::validation(
                "Name must be 1-100 characters of letters, digits, spaces, '-', '_' or '.'",
            ));
        }
        if new.value.is_empty() {
            return Err(VaultError::validation("Key value must not be empty"));
        }
        let tags = normalize_tags(new.tags).map_err(VaultError::Validation)?;
        let description = new
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        trace.advance(Stage::RateChecked);
        trace.advance(Stage::ScopeChecked);

        let secrets = SecretRepository::new(&self.pool);
        let existing = bounded(
            self.timeout,
            "secret lookup",
            secrets.find_by_owner_and_name(ctx.actor, &name),
        )
        .await?;
        if existing.is_some() {
            return Err(VaultError::Conflict(format!(
                "An API key named '{}' already exists",
                name
            )));
        }

        let id = Uuid::new_v4();
        let sealed = self
            .cipher
            .encrypt(&new.value, &record_binding(id, ctx.actor))
            .map_err(|e| VaultError::Storage(e.into()))?;

        let now = Utc::now();
        let secret = Secret {
            id,
            owner_id: ctx.actor,
            name,
            description,
            tags,
            ciphertext: sealed.ciphertext_base64(),
            nonce: sealed.nonce_base64(),
            created_at: now,
            updated_at: now,
        };

        match bounded(self.timeout, "secret insert", secrets.insert(&secret)).await {
            Ok(()) => {}
            Err(VaultError::Storage(e)) if is_unique_violation(&e) => {
                return Err(VaultError::Conflict(format!(
                    "An API key named '{}' already exists",
                    secret.name
                )));
            }
            Err(e) => return Err(e),
        }
        trace.advance(Stage::Executed);

        self.audit
            .record(
                ctx.entry(AuditAction::Create, ResourceType::Secret)
                    .resource(secret.id)
                    .details(serde_json::json!({
                        "name": secret.name,
                        "tags": secret.tags,
                    })),
            )
            .await;
        trace.advance(Stage::Audited);
        trace.respond();

        info!(secret_id = %secret.id, owner = %ctx.actor, "API key stored");
        Ok(secret.metadata(Relation::Owner))
    }

    /// Metadata of every secret the caller may read, owned ones first
    pub async fn list_secrets(&self, ctx: &RequestContext) -> VaultResult<Vec<SecretMetadata>> {
        let secrets = SecretRepository::new(&self.pool);

        let owned = bounded(self.timeout, "secret listing", secrets.list_owned(ctx.actor)).await?;
        let shared = bounded(
            self.timeout,
            "shared secret listing",
            secrets.list_shared_with(ctx.actor),
        )
        .await?;

        let mut listed: Vec<SecretMetadata> = owned
            .iter()
            .map(|s| s.metadata(Relation::Owner))
            .collect();

        let mut by_id: HashMap<Uuid, (Secret, Vec<Relation>)> = HashMap::new();
        for (secret, role) in shared {
            let relation = match role.parse::<TeamRole>() {
                Ok(role) => Relation::Team(role),
                Err(_) => {
                    warn!(secret_id = %secret.id, role = %role, "Ignoring grant with unknown role");
                    continue;
                }
            };
            by_id
                .entry(secret.id)
                .or_insert_with(|| (secret, Vec::new()))
                .1
                .push(relation);
        }

        let policy = self.access.policy();
        let mut shared: Vec<SecretMetadata> = by_id
            .into_values()
            .filter_map(|(secret, relations)| {
                let best = self.access.best(relations)?;
                policy
                    .permits(best, AccessLevel::Read)
                    .then(|| secret.metadata(best))
            })
            .collect();
        shared.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        listed.extend(shared);
        Ok(listed)
    }

    /// Key and team counts plus the newest and most recently revealed keys
    pub async fn overview(&self, ctx: &RequestContext) -> VaultResult<DashboardOverview> {
        let mut visible = self.list_secrets(ctx).await?;
        let total_teams = bounded(
            self.timeout,
            "team count",
            TeamRepository::new(&self.pool).count_active_teams(ctx.actor),
        )
        .await?;
        let activities_this_week = self
            .audit
            .count_since(ctx.actor, Utc::now() - ChronoDuration::days(7))
            .await?;
        let revealed = bounded(
            self.timeout,
            "recent reveals",
            AuditRepository::new(&self.pool).recently_revealed(ctx.actor, OVERVIEW_KEYS as u32),
        )
        .await?;

        // Only keys the caller can still see
        let recently_used_keys = revealed
            .iter()
            .filter_map(|id| visible.iter().find(|s| s.id == *id).cloned())
            .collect();

        let total_api_keys = visible.len();
        visible.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        visible.truncate(OVERVIEW_KEYS);

        Ok(DashboardOverview {
            total_api_keys,
            total_teams,
            activities_this_week,
            recent_api_keys: visible,
            recently_used_keys,
        })
    }

    /// Decrypt a secret the caller may reveal
    pub async fn reveal_secret(&self, ctx: &RequestContext, secret_ref: &SecretRef) -> VaultResult<RevealedSecret> {
        let mut trace = RequestTrace::new("reveal_secret");

        let check = self.limiter.check(Tier::Sensitive, &ctx.client.ip).await;
        if !check.allowed {
            let entry = Tier::Sensitive
                .denial_entry(&ctx.client)
                .actor(ctx.actor);
            self.record_denial(&mut trace, entry).await;
            return Err(VaultError::RateLimited {
                tier: Tier::Sensitive,
                retry_after_secs: check.retry_after_secs,
            });
        }
        trace.advance(Stage::RateChecked);

        let secret = self.lookup(ctx, secret_ref).await?;
        self.require(ctx, &mut trace, &secret, AccessLevel::Reveal).await?;

        let opened = SealedSecret::from_base64(&secret.ciphertext, &secret.nonce)
            .and_then(|sealed| {
                self.cipher
                    .decrypt(&sealed, &record_binding(secret.id, secret.owner_id))
            });
        let key = match opened {
            Ok(key) => key,
            Err(e) => {
                warn!(secret_id = %secret.id, "Stored API key failed to decrypt: {}", e);
                self.alerts.raise(
                    OpsAlert::new(AlertKind::DecryptionFailure, "Stored API key failed to decrypt")
                        .with_context(serde_json::json!({ "secretId": secret.id })),
                );
                let entry = ctx
                    .entry(AuditAction::Read, ResourceType::Secret)
                    .resource(secret.id)
                    .security(SecurityEvent::DecryptionFailure, Severity::Critical)
                    .outcome(Outcome::Failed)
                    .details(serde_json::json!({ "name": secret.name }));
                self.record_denial(&mut trace, entry).await;
                return Err(VaultError::Decryption);
            }
        };
        trace.advance(Stage::Executed);

        self.audit
            .record(
                ctx.entry(AuditAction::Read, ResourceType::Secret)
                    .resource(secret.id)
                    .severity(Severity::Low)
                    .details(serde_json::json!({
                        "name": secret.name,
                        "ownerId": secret.owner_id,
                    })),
            )
            .await;
        trace.advance(Stage::Audited);
        trace.respond();

        Ok(RevealedSecret {
            name: secret.name,
            key,
        })
    }

    /// Delete a secret and its team grants
    pub async fn delete_secret(&self, ctx: &RequestContext, secret_ref: &SecretRef) -> VaultResult<()> {
        let mut trace = RequestTrace::new("delete_secret");
        trace.advance(Stage::RateChecked);

        let secret = self.lookup(ctx, secret_ref).await?;
        self.require(ctx, &mut trace, &secret, AccessLevel::Delete).await?;

        let deleted = bounded(
            self.timeout,
            "secret delete",
            SecretRepository::new(&self.pool).delete_with_grants(secret.id),
        )
        .await?;
        if !deleted {
            return Err(VaultError::not_found("API key not found"));
        }
        trace.advance(Stage::Executed);

        self.audit
            .record(
                ctx.entry(AuditAction::Delete, ResourceType::Secret)
                    .resource(secret.id)
                    .details(serde_json::json!({ "name": secret.name })),
            )
            .await;
        trace.advance(Stage::Audited);
        trace.respond();

        info!(secret_id = %secret.id, actor = %ctx.actor, "API key deleted");
        Ok(())
    }

    /// Grant a team visibility of a secret
    pub async fn attach_to_team(
        &self,
        ctx: &RequestContext,
        secret_id: Uuid,
        team_id: Uuid,
    ) -> VaultResult<SecretTeamGrant> {
        let mut trace = RequestTrace::new("attach_to_team");
        trace.advance(Stage::RateChecked);

        let secret = self.require_grant_scope(ctx, &mut trace, secret_id, team_id).await?;

        let grant = SecretTeamGrant {
            team_id,
            secret_id: secret.id,
            granted_by: Some(ctx.actor),
            created_at: Utc::now(),
        };
        match bounded(
            self.timeout,
            "grant insert",
            TeamRepository::new(&self.pool).insert_grant(&grant),
        )
        .await
        {
            Ok(()) => {}
            Err(VaultError::Storage(e)) if is_unique_violation(&e) => {
                return Err(VaultError::Conflict(
                    "API key is already shared with this team".to_string(),
                ));
            }
            Err(e) => return Err(e),
        }
        trace.advance(Stage::Executed);

        self.audit
            .record(
                ctx.entry(AuditAction::Update, ResourceType::Secret)
                    .resource(secret.id)
                    .details(serde_json::json!({
                        "name": secret.name,
                        "teamId": team_id,
                        "change": "attach",
                    })),
            )
            .await;
        trace.advance(Stage::Audited);
        trace.respond();

        Ok(grant)
    }

    /// Withdraw a team's visibility of a secret
    pub async fn detach_from_team(&self, ctx: &RequestContext, secret_id: Uuid, team_id: Uuid) -> VaultResult<()> {
        let mut trace = RequestTrace::new("detach_from_team");
        trace.advance(Stage::RateChecked);

        let secret = self.require_grant_scope(ctx, &mut trace, secret_id, team_id).await?;

        let removed = bounded(
            self.timeout,
            "grant delete",
            TeamRepository::new(&self.pool).delete_grant(team_id, secret.id),
        )
        .await?;
        if !removed {
            return Err(VaultError::not_found("API key is not shared with this team"));
        }
        trace.advance(Stage::Executed);

        self.audit
            .record(
                ctx.entry(AuditAction::Update, ResourceType::Secret)
                    .resource(secret.id)
                    .details(serde_json::json!({
                        "name": secret.name,
                        "teamId": team_id,
                        "change": "detach",
                    })),
            )
            .await;
        trace.advance(Stage::Audited);
        trace.respond();

        Ok(())
    }

    /// Find the secret a name refers to from the caller's point of view
    async fn lookup(&self, ctx: &RequestContext, secret_ref: &SecretRef) -> VaultResult<Secret> {
        let secrets = SecretRepository::new(&self.pool);
        let name = secret_ref.name.trim();
        if name.is_empty() {
            return Err(VaultError::validation("API key name is required"));
        }

        let owner = secret_ref.owner_id.unwrap_or(ctx.actor);
        if let Some(secret) = bounded(
            self.timeout,
            "secret lookup",
            secrets.find_by_owner_and_name(owner, name),
        )
        .await?
        {
            return Ok(secret);
        }
        if secret_ref.owner_id.is_some() {
            return Err(VaultError::not_found("API key not found"));
        }

        let mut shared = bounded(
            self.timeout,
            "shared secret lookup",
            secrets.find_shared_by_name(ctx.actor, name),
        )
        .await?;

        match shared.len() {
            0 => Err(VaultError::not_found("API key not found")),
            1 => Ok(shared.remove(0)),
            _ => Err(VaultError::validation(format!(
                "Several API keys named '{}' are shared with you; specify ownerId",
                name
            ))),
        }
    }

    /// Check a scope, recording a denial if it is missing
    async fn require(
        &self,
        ctx: &RequestContext,
        trace: &mut RequestTrace,
        secret: &Secret,
        level: AccessLevel,
    ) -> VaultResult<()> {
        if self.access.can_access(ctx.actor, secret.id, level).await {
            trace.advance(Stage::ScopeChecked);
            return Ok(());
        }

        let entry = ctx
            .entry(AuditAction::Access, ResourceType::Secret)
            .resource(secret.id)
            .security(SecurityEvent::UnauthorizedAccess, Severity::High)
            .details(serde_json::json!({
                "name": secret.name,
                "required": level.as_str(),
            }));
        self.record_denial(trace, entry).await;

        Err(VaultError::forbidden(format!(
            "You do not have {} access to this API key",
            level.as_str()
        )))
    }

    /// Secret must allow `modify` and the caller must manage the team
    async fn require_grant_scope(
        &self,
        ctx: &RequestContext,
        trace: &mut RequestTrace,
        secret_id: Uuid,
        team_id: Uuid,
    ) -> VaultResult<Secret> {
        let secret = bounded(
            self.timeout,
            "secret lookup",
            SecretRepository::new(&self.pool).find_by_id(secret_id),
        )
        .await?
        .ok_or_else(|| VaultError::not_found("API key not found"))?;

        bounded(
            self.timeout,
            "team lookup",
            TeamRepository::new(&self.pool).find_team(team_id),
        )
        .await?
        .ok_or_else(|| VaultError::not_found("Team not found"))?;

        let can_modify = self
            .access
            .can_access(ctx.actor, secret.id, AccessLevel::Modify)
            .await;
        let manages_team = self
            .access
            .team_role(ctx.actor, team_id)
            .await
            .is_some_and(|role| role.can_manage());

        if can_modify && manages_team {
            trace.advance(Stage::ScopeChecked);
            return Ok(secret);
        }

        let entry = ctx
            .entry(AuditAction::Access, ResourceType::Secret)
            .resource(secret.id)
            .security(SecurityEvent::UnauthorizedAccess, Severity::High)
            .details(serde_json::json!({
                "name": secret.name,
                "teamId": team_id,
                "required": if can_modify { "team_admin" } else { "modify" },
            }));
        self.record_denial(trace, entry).await;

        Err(VaultError::forbidden(
            "You must be able to modify the API key and administer the team",
        ))
    }

    async fn record_denial(&self, trace: &mut RequestTrace, mut entry: NewAuditEntry) {
        if let Some(details) = entry.details.as_object_mut() {
            details.insert("stage".to_string(), trace.current().as_str().into());
        }
        self.audit.record(entry).await;
        trace.advance(Stage::Audited);
    }
}
