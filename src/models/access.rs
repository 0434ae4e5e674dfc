//! Access levels and caller relations

use serde::{Deserialize, Serialize, Serializer};

use super::TeamRole;

/// Operation class a caller requests on a secret
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    /// See the metadata
    Read,
    /// Obtain the decrypted value
    Reveal,
    /// Change grants and metadata
    Modify,
    Delete,
}

impl AccessLevel {
    pub const ALL: [AccessLevel; 4] = [
        AccessLevel::Read,
        AccessLevel::Reveal,
        AccessLevel::Modify,
        AccessLevel::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::Read => "read",
            AccessLevel::Reveal => "reveal",
            AccessLevel::Modify => "modify",
            AccessLevel::Delete => "delete",
        }
    }
}

/// How a user relates to a secret
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// The user owns the secret
    Owner,
    /// The secret is granted to a team where the user holds an active role
    Team(TeamRole),
}

impl Relation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::Owner => "owner",
            Relation::Team(TeamRole::Owner) => "team_owner",
            Relation::Team(TeamRole::Admin) => "team_admin",
            Relation::Team(TeamRole::Member) => "team_member",
            Relation::Team(TeamRole::Viewer) => "team_viewer",
        }
    }
}

impl Serialize for Relation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}
