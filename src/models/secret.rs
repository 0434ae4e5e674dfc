//! Secret (stored API key) models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::Zeroizing;

use super::Relation;

/// Stored secret record
///
/// `ciphertext` and `nonce` are base64 of the sealed value. The record is
/// never serialized; callers only ever see [`SecretMetadata`].
#[derive(Debug, Clone)]
pub struct Secret {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub ciphertext: String,
    pub nonce: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Secret {
    pub fn metadata(&self, access: Relation) -> SecretMetadata {
        SecretMetadata {
            id: self.id,
            owner_id: self.owner_id,
            name: self.name.clone(),
            description: self.description.clone(),
            tags: self.tags.clone(),
            access,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// What callers see of a secret
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretMetadata {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    /// The caller's relation to the secret
    pub access: Relation,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for storing a new secret
pub struct NewSecret {
    pub name: String,
    pub value: Zeroizing<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
}

impl std::fmt::Debug for NewSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewSecret")
            .field("name", &self.name)
            .field("value", &"<redacted>")
            .field("description", &self.description)
            .field("tags", &self.tags)
            .finish()
    }
}

/// Reference to a secret by name
///
/// Without `owner_id` the caller's own secret is used first, then a unique
/// match among secrets shared with the caller's teams.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretRef {
    pub name: String,
    #[serde(default)]
    pub owner_id: Option<Uuid>,
}

impl SecretRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner_id: None,
        }
    }

    pub fn owned_by(name: impl Into<String>, owner_id: Uuid) -> Self {
        Self {
            name: name.into(),
            owner_id: Some(owner_id),
        }
    }
}

/// A decrypted secret; the value is wiped when dropped
pub struct RevealedSecret {
    pub name: String,
    pub key: Zeroizing<String>,
}

impl std::fmt::Debug for RevealedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevealedSecret")
            .field("name", &self.name)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Tags arrive either as a JSON array or as a comma separated string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TagsInput {
    List(Vec<String>),
    Csv(String),
}

impl TagsInput {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            TagsInput::List(tags) => tags,
            TagsInput::Csv(csv) => csv.split(',').map(String::from).collect(),
        }
    }
}

/// Create secret request
#[derive(Deserialize)]
pub struct CreateSecretRequest {
    pub name: String,
    pub key: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Option<TagsInput>,
}

impl From<CreateSecretRequest> for NewSecret {
    fn from(req: CreateSecretRequest) -> Self {
        Self {
            name: req.name,
            value: Zeroizing::new(req.key),
            description: req.description,
            tags: req.tags.map(TagsInput::into_vec).unwrap_or_default(),
        }
    }
}
