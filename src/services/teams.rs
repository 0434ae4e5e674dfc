//! Teams and team memberships
//!
//! Invitations start `pending` and only count for access once the invitee
//! accepts them.

use std::time::Duration;

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use super::access::AccessResolver;
use super::audit::AuditLog;
use super::error::{bounded, VaultError, VaultResult};
use super::vault::RequestContext;
use crate::db::{is_unique_violation, TeamRepository, UserRepository};
use crate::models::{
    AuditAction, MembershipStatus, NewAuditEntry, ResourceType, SecretTeamGrant, SecurityEvent,
    Severity, Team, TeamMembership, TeamRole, TeamsDashboard,
};
use crate::utils::validation::MAX_NAME_LEN;

/// Who is being invited
#[derive(Debug, Clone)]
pub enum MemberRef {
    Id(Uuid),
    Email(String),
}

pub struct TeamService {
    pool: SqlitePool,
    access: AccessResolver,
    audit: AuditLog,
    timeout: Duration,
}

impl TeamService {
    pub fn new(pool: SqlitePool, access: AccessResolver, audit: AuditLog, timeout: Duration) -> Self {
        Self {
            pool,
            access,
            audit,
            timeout,
        }
    }

    pub async fn create_team(&self, ctx: &RequestContext, name: &str, description: Option<String>) -> VaultResult<Team> {
        let name = name.trim();
        if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
            return Err(VaultError::validation("Team name must be 1-100 characters"));
        }

        let team = Team {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: description.map(|d| d.trim().to_string()).filter(|d| !d.is_empty()),
            owner_id: ctx.actor,
            created_at: Utc::now(),
        };
        bounded(
            self.timeout,
            "team insert",
            TeamRepository::new(&self.pool).create_with_owner(&team),
        )
        .await?;

        self.audit
            .record(
                self.entry(ctx, AuditAction::Create, team.id)
                    .details(serde_json::json!({ "name": team.name })),
            )
            .await;

        info!(team_id = %team.id, owner = %ctx.actor, "Team created");
        Ok(team)
    }

    /// Invite a user; the membership stays pending until accepted
    pub async fn add_member(
        &self,
        ctx: &RequestContext,
        team_id: Uuid,
        member: MemberRef,
        role: Option<TeamRole>,
    ) -> VaultResult<TeamMembership> {
        let role = role.unwrap_or(TeamRole::Member);
        if role == TeamRole::Owner {
            return Err(VaultError::validation("The owner role cannot be granted"));
        }

        self.find_team(team_id).await?;
        self.require_manager(ctx, team_id, "add_member").await?;

        let users = UserRepository::new(&self.pool);
        let user = match &member {
            MemberRef::Id(id) => bounded(self.timeout, "user lookup", users.find_by_id(*id)).await?,
            MemberRef::Email(email) => {
                bounded(
                    self.timeout,
                    "user lookup",
                    users.find_by_email(&email.trim().to_lowercase()),
                )
                .await?
            }
        }
        .ok_or_else(|| VaultError::not_found("User not found"))?;

        let membership = TeamMembership {
            team_id,
            user_id: user.id,
            role,
            status: MembershipStatus::Pending,
            created_at: Utc::now(),
        };
        match bounded(
            self.timeout,
            "membership insert",
            TeamRepository::new(&self.pool).insert_membership(&membership),
        )
        .await
        {
            Ok(()) => {}
            Err(VaultError::Storage(e)) if is_unique_violation(&e) => {
                return Err(VaultError::Conflict(
                    "User is already a member of this team".to_string(),
                ));
            }
            Err(e) => return Err(e),
        }

        self.audit
            .record(self.entry(ctx, AuditAction::Create, team_id).details(serde_json::json!({
                "userId": user.id,
                "role": role.as_str(),
                "change": "invite",
            })))
            .await;

        Ok(membership)
    }

    /// Accept a pending invitation; accepting an active membership is a no-op
    pub async fn accept_membership(&self, ctx: &RequestContext, team_id: Uuid) -> VaultResult<TeamMembership> {
        let teams = TeamRepository::new(&self.pool);
        let activated = bounded(
            self.timeout,
            "membership update",
            teams.activate_membership(team_id, ctx.actor),
        )
        .await?;

        let membership = bounded(
            self.timeout,
            "membership lookup",
            teams.find_membership(team_id, ctx.actor),
        )
        .await?
        .ok_or_else(|| VaultError::not_found("No invitation to this team"))?;

        if activated {
            self.audit
                .record(self.entry(ctx, AuditAction::Update, team_id).details(serde_json::json!({
                    "userId": ctx.actor,
                    "change": "accept",
                })))
                .await;
        }

        Ok(membership)
    }

    /// Remove a member; managers may remove anyone but the owner, members
    /// may remove themselves
    pub async fn remove_member(&self, ctx: &RequestContext, team_id: Uuid, user_id: Uuid) -> VaultResult<()> {
        let team = self.find_team(team_id).await?;
        if user_id == team.owner_id {
            return Err(VaultError::validation("The team owner cannot be removed"));
        }
        if user_id != ctx.actor {
            self.require_manager(ctx, team_id, "remove_member").await?;
        }

        let removed = bounded(
            self.timeout,
            "membership delete",
            TeamRepository::new(&self.pool).delete_membership(team_id, user_id),
        )
        .await?;
        if !removed {
            return Err(VaultError::not_found("Membership not found"));
        }

        self.audit
            .record(self.entry(ctx, AuditAction::Delete, team_id).details(serde_json::json!({
                "userId": user_id,
                "change": "remove",
            })))
            .await;

        Ok(())
    }

    pub async fn list_members(&self, ctx: &RequestContext, team_id: Uuid) -> VaultResult<Vec<TeamMembership>> {
        self.find_team(team_id).await?;
        self.require_member(ctx, team_id).await?;

        bounded(
            self.timeout,
            "member listing",
            TeamRepository::new(&self.pool).list_members(team_id),
        )
        .await
    }

    /// Secrets granted to the team
    pub async fn list_team_secrets(&self, ctx: &RequestContext, team_id: Uuid) -> VaultResult<Vec<SecretTeamGrant>> {
        self.find_team(team_id).await?;
        self.require_member(ctx, team_id).await?;

        bounded(
            self.timeout,
            "grant listing",
            TeamRepository::new(&self.pool).list_grants(team_id),
        )
        .await
    }

    /// The caller's teams and open invitations, with active-team totals
    pub async fn dashboard(&self, ctx: &RequestContext) -> VaultResult<TeamsDashboard> {
        let teams = bounded(
            self.timeout,
            "team listing",
            TeamRepository::new(&self.pool).teams_for_user(ctx.actor),
        )
        .await?;

        let active: Vec<_> = teams
            .iter()
            .filter(|t| t.status == MembershipStatus::Active)
            .collect();

        Ok(TeamsDashboard {
            total_teams: active.len(),
            teams_owned_count: active.iter().filter(|t| t.owner_id == ctx.actor).count(),
            pending_invitations: teams.len() - active.len(),
            total_members: active.iter().filter_map(|t| t.member_count).sum(),
            shared_keys: active.iter().filter_map(|t| t.key_count).sum(),
            teams,
        })
    }

    async fn find_team(&self, team_id: Uuid) -> VaultResult<Team> {
        bounded(
            self.timeout,
            "team lookup",
            TeamRepository::new(&self.pool).find_team(team_id),
        )
        .await?
        .ok_or_else(|| VaultError::not_found("Team not found"))
    }

    async fn require_member(&self, ctx: &RequestContext, team_id: Uuid) -> VaultResult<TeamRole> {
        match self.access.team_role(ctx.actor, team_id).await {
            Some(role) => Ok(role),
            None => Err(VaultError::forbidden("You are not an active member of this team")),
        }
    }

    async fn require_manager(&self, ctx: &RequestContext, team_id: Uuid, operation: &str) -> VaultResult<()> {
        if self
            .access
            .team_role(ctx.actor, team_id)
            .await
            .is_some_and(|role| role.can_manage())
        {
            return Ok(());
        }

        self.audit
            .record(
                self.entry(ctx, AuditAction::Access, team_id)
                    .security(SecurityEvent::UnauthorizedAccess, Severity::High)
                    .details(serde_json::json!({ "operation": operation })),
            )
            .await;

        Err(VaultError::forbidden("Only team owners and admins can do this"))
    }

    fn entry(&self, ctx: &RequestContext, action: AuditAction, team_id: Uuid) -> NewAuditEntry {
        NewAuditEntry::new(action, ResourceType::Team)
            .actor(ctx.actor)
            .resource(team_id)
            .client(&ctx.client)
    }
}
