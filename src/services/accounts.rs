//! User accounts: signup, login and password changes

use std::time::Duration;

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use super::audit::AuditLog;
use super::error::{bounded, VaultError, VaultResult};
use super::hasher::{CredentialHasher, HashError, PasswordDigest};
use super::vault::RequestContext;
use crate::config::AuthConfig;
use crate::db::{is_unique_violation, UserRepository};
use crate::middleware::auth::create_access_token;
use crate::models::{
    AuditAction, AuthResponse, ClientMeta, NewAuditEntry, ResourceType, SecurityEvent, Severity,
    User,
};
use crate::utils::validation::{check_password_strength, is_valid_email, is_valid_full_name};

const INVALID_CREDENTIALS: &str = "Invalid email or password";

pub struct AccountService {
    pool: SqlitePool,
    hasher: CredentialHasher,
    audit: AuditLog,
    jwt_secret: String,
    token_expiry_minutes: u64,
    password_min_length: usize,
    timeout: Duration,
    /// Verified against when the email is unknown, so both paths cost the same
    dummy: PasswordDigest,
}

impl AccountService {
    pub fn new(pool: SqlitePool, config: &AuthConfig, audit: AuditLog, timeout: Duration) -> anyhow::Result<Self> {
        let hasher = CredentialHasher::new(&config.argon2)?;
        let dummy = hasher.hash(&Uuid::new_v4().to_string(), None)?;

        Ok(Self {
            pool,
            hasher,
            audit,
            jwt_secret: config.jwt_secret.clone(),
            token_expiry_minutes: config.token_expiry_minutes,
            password_min_length: config.password_min_length,
            timeout,
            dummy,
        })
    }

    pub async fn signup(
        &self,
        client: &ClientMeta,
        full_name: &str,
        email: &str,
        password: &str,
    ) -> VaultResult<AuthResponse> {
        let full_name = full_name.trim();
        let email = email.trim().to_lowercase();

        if !is_valid_full_name(full_name) {
            return Err(VaultError::validation("Full name must be 1-100 characters"));
        }
        if !is_valid_email(&email) {
            return Err(VaultError::validation("Invalid email address"));
        }
        check_password_strength(password, self.password_min_length).map_err(VaultError::Validation)?;

        let users = UserRepository::new(&self.pool);
        if bounded(self.timeout, "user lookup", users.find_by_email(&email))
            .await?
            .is_some()
        {
            return Err(VaultError::Conflict("Email is already registered".to_string()));
        }

        let digest = self.hash(password).await?;
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email,
            full_name: full_name.to_string(),
            password_hash: digest.hash,
            password_salt: digest.salt,
            created_at: now,
            updated_at: now,
        };

        match bounded(self.timeout, "user insert", users.insert(&user)).await {
            Ok(()) => {}
            Err(VaultError::Storage(e)) if is_unique_violation(&e) => {
                return Err(VaultError::Conflict("Email is already registered".to_string()));
            }
            Err(e) => return Err(e),
        }

        self.audit
            .record(
                NewAuditEntry::new(AuditAction::Create, ResourceType::User)
                    .actor(user.id)
                    .resource(user.id)
                    .client(client)
                    .details(serde_json::json!({ "email": user.email })),
            )
            .await;

        info!(user_id = %user.id, "User registered");
        self.respond(user)
    }

    pub async fn login(&self, client: &ClientMeta, email: &str, password: &str) -> VaultResult<AuthResponse> {
        let email = email.trim().to_lowercase();
        let user = bounded(
            self.timeout,
            "user lookup",
            UserRepository::new(&self.pool).find_by_email(&email),
        )
        .await?;

        let verified = match &user {
            Some(u) => self.verify(password, &u.password_hash, &u.password_salt).await,
            None => {
                self.verify(password, &self.dummy.hash, &self.dummy.salt).await;
                false
            }
        };

        let Some(user) = user.filter(|_| verified) else {
            warn!(ip = %client.ip, "Failed login attempt");
            self.audit
                .record(
                    NewAuditEntry::new(AuditAction::Access, ResourceType::User)
                        .security(SecurityEvent::FailedLogin, Severity::Medium)
                        .client(client)
                        .details(serde_json::json!({ "email": email })),
                )
                .await;
            return Err(VaultError::Authentication(INVALID_CREDENTIALS.to_string()));
        };

        self.audit
            .record(
                NewAuditEntry::new(AuditAction::Access, ResourceType::User)
                    .actor(user.id)
                    .resource(user.id)
                    .client(client)
                    .details(serde_json::json!({ "email": user.email })),
            )
            .await;

        self.respond(user)
    }

    pub async fn change_password(
        &self,
        ctx: &RequestContext,
        current_password: &str,
        new_password: &str,
    ) -> VaultResult<()> {
        let users = UserRepository::new(&self.pool);
        let user = bounded(self.timeout, "user lookup", users.find_by_id(ctx.actor))
            .await?
            .ok_or_else(|| VaultError::not_found("User not found"))?;

        if !self
            .verify(current_password, &user.password_hash, &user.password_salt)
            .await
        {
            self.audit
                .record(
                    NewAuditEntry::new(AuditAction::Update, ResourceType::User)
                        .actor(user.id)
                        .resource(user.id)
                        .security(SecurityEvent::FailedLogin, Severity::Medium)
                        .client(&ctx.client)
                        .details(serde_json::json!({ "email": user.email, "reason": "change_password" })),
                )
                .await;
            return Err(VaultError::Authentication(
                "Current password is incorrect".to_string(),
            ));
        }

        check_password_strength(new_password, self.password_min_length).map_err(VaultError::Validation)?;

        let digest = self.hash(new_password).await?;
        let updated = bounded(
            self.timeout,
            "password update",
            users.update_password(user.id, &digest.hash, &digest.salt, Utc::now()),
        )
        .await?;
        if !updated {
            return Err(VaultError::not_found("User not found"));
        }

        self.audit
            .record(
                NewAuditEntry::new(AuditAction::Update, ResourceType::User)
                    .actor(user.id)
                    .resource(user.id)
                    .client(&ctx.client)
                    .details(serde_json::json!({ "change": "password" })),
            )
            .await;

        info!(user_id = %user.id, "Password changed");
        Ok(())
    }

    pub async fn find_by_email(&self, email: &str) -> VaultResult<Option<User>> {
        bounded(
            self.timeout,
            "user lookup",
            UserRepository::new(&self.pool).find_by_email(&email.trim().to_lowercase()),
        )
        .await
    }

    fn respond(&self, user: User) -> VaultResult<AuthResponse> {
        let token = create_access_token(
            &user.id,
            &user.email,
            &user.full_name,
            &self.jwt_secret,
            self.token_expiry_minutes,
        )
        .map_err(|e| VaultError::Storage(anyhow::anyhow!("Failed to issue token: {}", e)))?;

        Ok(AuthResponse {
            id: user.id,
            full_name: user.full_name,
            email: user.email,
            token,
        })
    }

    /// Argon2 runs on the blocking pool
    async fn hash(&self, password: &str) -> VaultResult<PasswordDigest> {
        let hasher = self.hasher.clone();
        let password = Zeroizing::new(password.to_string());

        tokio::task::spawn_blocking(move || hasher.hash(&password, None))
            .await
            .map_err(|e| VaultError::Storage(anyhow::anyhow!("Hashing task failed: {}", e)))?
            .map_err(|e| match e {
                HashError::EmptyPassword | HashError::SaltTooShort => VaultError::Validation(e.to_string()),
                other => VaultError::Storage(other.into()),
            })
    }

    async fn verify(&self, password: &str, hash: &str, salt: &str) -> bool {
        let hasher = self.hasher.clone();
        let password = Zeroizing::new(password.to_string());
        let (hash, salt) = (hash.to_string(), salt.to_string());

        tokio::task::spawn_blocking(move || hasher.verify(&password, &hash, &salt))
            .await
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::auth::validate_token;
    use crate::services::testing::Harness;

    fn client() -> ClientMeta {
        ClientMeta::new("203.0.113.9", "POST", "/auth/login")
    }

    #[tokio::test]
    async fn test_signup_and_login() {
        let h = Harness::new().await;

        let signed_up = h
            .accounts
            .signup(&client(), "Alice Doe", "Alice@Example.com", "Sup3rSecret")
            .await
            .unwrap();
        assert_eq!(signed_up.email, "alice@example.com");

        let logged_in = h
            .accounts
            .login(&client(), "alice@example.com", "Sup3rSecret")
            .await
            .unwrap();
        assert_eq!(logged_in.id, signed_up.id);

        let claims = validate_token(&logged_in.token, &h.config.auth.jwt_secret)
            .unwrap()
            .claims;
        assert_eq!(claims.sub, signed_up.id.to_string());
        assert_eq!(claims.name, "Alice Doe");
    }

    #[tokio::test]
    async fn test_signup_rejects_weak_input_and_duplicates() {
        let h = Harness::new().await;

        assert!(matches!(
            h.accounts.signup(&client(), "Al", "al@example.com", "weak").await,
            Err(VaultError::Validation(_))
        ));
        assert!(matches!(
            h.accounts.signup(&client(), "", "al@example.com", "Sup3rSecret").await,
            Err(VaultError::Validation(_))
        ));
        assert!(matches!(
            h.accounts.signup(&client(), "Al", "not-an-email", "Sup3rSecret").await,
            Err(VaultError::Validation(_))
        ));

        h.accounts
            .signup(&client(), "Al", "al@example.com", "Sup3rSecret")
            .await
            .unwrap();
        assert!(matches!(
            h.accounts.signup(&client(), "Al", "AL@example.com", "Sup3rSecret").await,
            Err(VaultError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_login_is_audited() {
        let h = Harness::new().await;
        h.accounts
            .signup(&client(), "Bob", "bob@example.com", "Sup3rSecret")
            .await
            .unwrap();

        for (email, password) in [("bob@example.com", "wrong"), ("nobody@example.com", "Sup3rSecret")] {
            let err = h.accounts.login(&client(), email, password).await.unwrap_err();
            assert!(matches!(err, VaultError::Authentication(_)));
            assert_eq!(err.to_string(), INVALID_CREDENTIALS);
        }

        let failures = h.events(SecurityEvent::FailedLogin).await;
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].severity, Some(Severity::Medium));
        assert_eq!(failures[1].details["email"], "nobody@example.com");
        assert_eq!(failures[1].ip_address.as_deref(), Some("203.0.113.9"));
    }

    #[tokio::test]
    async fn test_change_password() {
        let h = Harness::new().await;
        let user = h
            .accounts
            .signup(&client(), "Carol", "carol@example.com", "Sup3rSecret")
            .await
            .unwrap();
        let ctx = RequestContext::new(user.id, client());

        assert!(matches!(
            h.accounts.change_password(&ctx, "wrong", "N3wSecretPass").await,
            Err(VaultError::Authentication(_))
        ));
        assert!(matches!(
            h.accounts.change_password(&ctx, "Sup3rSecret", "short").await,
            Err(VaultError::Validation(_))
        ));

        h.accounts
            .change_password(&ctx, "Sup3rSecret", "N3wSecretPass")
            .await
            .unwrap();
        assert!(h.accounts.login(&client(), "carol@example.com", "Sup3rSecret").await.is_err());
        assert!(h.accounts.login(&client(), "carol@example.com", "N3wSecretPass").await.is_ok());
    }
}
