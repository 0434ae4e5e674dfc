//! Audit log models

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ClientMeta, SecretMetadata};

macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($name), s)),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Create,
    Read,
    Update,
    Delete,
    Access,
}

string_enum!(AuditAction {
    Create => "create",
    Read => "read",
    Update => "update",
    Delete => "delete",
    Access => "access",
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Secret,
    Team,
    User,
    /// A route rather than a record, used for throttling events
    Endpoint,
}

string_enum!(ResourceType {
    Secret => "secret",
    Team => "team",
    User => "user",
    Endpoint => "endpoint",
});

/// Security event classification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEvent {
    FailedLogin,
    UnauthorizedAccess,
    RateLimitExceeded,
    DecryptionFailure,
}

string_enum!(SecurityEvent {
    FailedLogin => "failed_login",
    UnauthorizedAccess => "unauthorized_access",
    RateLimitExceeded => "rate_limit_exceeded",
    DecryptionFailure => "decryption_failure",
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

string_enum!(Severity {
    Low => "low",
    Medium => "medium",
    High => "high",
    Critical => "critical",
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    /// Refused by a rate limit, scope or credential check
    Denied,
    /// The operation was allowed but could not complete
    Failed,
}

string_enum!(Outcome {
    Success => "success",
    Denied => "denied",
    Failed => "failed",
});

/// Persisted audit entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: Uuid,
    pub actor_user_id: Option<Uuid>,
    pub action: AuditAction,
    pub resource_type: ResourceType,
    pub resource_id: Option<String>,
    pub event: Option<SecurityEvent>,
    pub severity: Option<Severity>,
    pub outcome: Outcome,
    pub details: serde_json::Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Audit entry before it is stamped and stored
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub actor_user_id: Option<Uuid>,
    pub action: AuditAction,
    pub resource_type: ResourceType,
    pub resource_id: Option<String>,
    pub event: Option<SecurityEvent>,
    pub severity: Option<Severity>,
    pub outcome: Outcome,
    pub details: serde_json::Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl NewAuditEntry {
    pub fn new(action: AuditAction, resource_type: ResourceType) -> Self {
        Self {
            actor_user_id: None,
            action,
            resource_type,
            resource_id: None,
            event: None,
            severity: None,
            outcome: Outcome::Success,
            details: serde_json::json!({}),
            ip_address: None,
            user_agent: None,
        }
    }

    pub fn actor(mut self, actor: Uuid) -> Self {
        self.actor_user_id = Some(actor);
        self
    }

    pub fn resource(mut self, id: impl ToString) -> Self {
        self.resource_id = Some(id.to_string());
        self
    }

    /// Mark the entry as a security event; events are never successes
    pub fn security(mut self, event: SecurityEvent, severity: Severity) -> Self {
        self.event = Some(event);
        self.severity = Some(severity);
        if self.outcome == Outcome::Success {
            self.outcome = Outcome::Denied;
        }
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    pub fn client(mut self, client: &ClientMeta) -> Self {
        self.ip_address = Some(client.ip.clone());
        self.user_agent = client.user_agent.clone();
        self
    }
}

/// Paging for activity listings
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ActivityQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// Headline numbers for the activity dashboard
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySummary {
    pub total_actions: i64,
    pub todays_activity: i64,
    pub security_events: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityDashboard {
    pub summary: ActivitySummary,
    pub records: Vec<AuditEntry>,
}

/// Detailed activity statistics for one user
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ActivityDetail {
    pub total_activities: i64,
    pub activities_today: i64,
    /// Since Monday 00:00 UTC
    pub activities_this_week: i64,
    pub security_events: i64,
    pub activity_types: BTreeMap<String, i64>,
}

/// Front page: counts plus the newest and most recently revealed keys
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardOverview {
    /// Owned plus shared keys the caller can list
    pub total_api_keys: usize,
    /// Teams with an active membership
    pub total_teams: i64,
    /// Audit entries over the last seven days
    pub activities_this_week: i64,
    pub recent_api_keys: Vec<SecretMetadata>,
    pub recently_used_keys: Vec<SecretMetadata>,
}
