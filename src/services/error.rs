//! Vault service errors

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use super::rate_limit::Tier;

/// Errors returned by the vault, account and team services
#[derive(Debug, Error)]
pub enum VaultError {
    /// Malformed input; never retried
    #[error("{0}")]
    Validation(String),

    /// Bad credentials
    #[error("{0}")]
    Authentication(String),

    /// Scope denied
    #[error("{0}")]
    Authorization(String),

    #[error("Rate limit exceeded")]
    RateLimited { tier: Tier, retry_after_secs: u64 },

    /// A stored ciphertext failed authentication
    #[error("Stored secret could not be decrypted")]
    Decryption,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// A bounded store or membership call did not finish in time; retryable
    #[error("{0} timed out")]
    Timeout(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl VaultError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Authorization(msg.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, VaultError::Timeout(_))
    }
}

pub type VaultResult<T> = Result<T, VaultError>;

/// Run a store call under the configured deadline
pub(crate) async fn bounded<T, F>(limit: Duration, what: &str, fut: F) -> VaultResult<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(VaultError::Storage),
        Err(_) => Err(VaultError::Timeout(what.to_string())),
    }
}
