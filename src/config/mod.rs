//! Configuration management
//!
//! This module provides YAML-based configuration management with support for:
//! - Environment variable overrides
//! - Multiple configuration file locations
//! - Default values for all settings
//! - Vault master key custody and rate limit tiers
//! - Team role access policy overrides

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::models::{AccessLevel, TeamRole};
use crate::services::cipher::MasterKey;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub vault: VaultConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Per-role overrides of the team access policy
    #[serde(default)]
    pub access: AccessConfig,
    #[serde(default)]
    pub alerts: AlertConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// TLS/HTTPS configuration (if not set, server runs HTTP)
    #[serde(default)]
    pub tls: Option<TlsConfig>,
    /// Take the client address from X-Forwarded-For / X-Real-IP /
    /// CF-Connecting-IP instead of the socket peer. Only enable behind a
    /// proxy that overwrites these headers.
    #[serde(default)]
    pub trust_proxy_headers: bool,
    /// Allowed CORS origins (empty = any origin)
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

/// TLS/HTTPS configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to TLS certificate file (PEM format)
    pub cert_file: PathBuf,
    /// Path to TLS private key file (PEM format)
    pub key_file: PathBuf,
    /// Minimum TLS version (1.2 or 1.3)
    #[serde(default = "default_min_tls_version")]
    pub min_version: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_min_tls_version() -> String {
    "1.3".to_string()
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    #[serde(default = "default_token_expiry")]
    pub token_expiry_minutes: u64,
    #[serde(default = "default_password_min_length")]
    pub password_min_length: usize,
    #[serde(default)]
    pub argon2: Argon2Settings,
}

/// Argon2id cost parameters for account passwords
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct Argon2Settings {
    #[serde(default = "default_argon2_memory")]
    pub memory_kib: u32,
    #[serde(default = "default_argon2_iterations")]
    pub iterations: u32,
    #[serde(default = "default_argon2_parallelism")]
    pub parallelism: u32,
}

impl Default for Argon2Settings {
    fn default() -> Self {
        Self {
            memory_kib: default_argon2_memory(),
            iterations: default_argon2_iterations(),
            parallelism: default_argon2_parallelism(),
        }
    }
}

fn default_token_expiry() -> u64 {
    60
}

fn default_password_min_length() -> usize {
    8
}

fn default_argon2_memory() -> u32 {
    19 * 1024
}

fn default_argon2_iterations() -> u32 {
    2
}

fn default_argon2_parallelism() -> u32 {
    1
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout() -> u64 {
    30
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    /// Log output target (console or file)
    #[serde(default = "default_log_target")]
    pub target: LogTarget,
    /// Directory for log files (used when target is "file" or "both")
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_log_prefix")]
    pub log_prefix: String,
    #[serde(default = "default_log_rotation")]
    pub daily_rotation: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            target: default_log_target(),
            log_dir: default_log_dir(),
            log_prefix: default_log_prefix(),
            daily_rotation: default_log_rotation(),
        }
    }
}

/// Log output target
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    /// Log to console (stdout/stderr) - default for development
    #[default]
    Console,
    /// Log to file with optional rotation - recommended for production
    File,
    /// Log to both console and file
    Both,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

fn default_log_target() -> LogTarget {
    LogTarget::Console
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("/var/log/keyvault")
}

fn default_log_prefix() -> String {
    "keyvault".to_string()
}

fn default_log_rotation() -> bool {
    true
}

/// Secret storage configuration
#[derive(Clone, Deserialize, Serialize)]
pub struct VaultConfig {
    /// Base64-encoded 256-bit key used to seal every stored secret
    #[serde(default)]
    pub master_key: String,
    /// Upper bound for any single persistence or membership lookup
    #[serde(default = "default_store_timeout")]
    pub store_timeout_secs: u64,
}

impl std::fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultConfig")
            .field("master_key", &"<redacted>")
            .field("store_timeout_secs", &self.store_timeout_secs)
            .finish()
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            master_key: String::new(),
            store_timeout_secs: default_store_timeout(),
        }
    }
}

impl VaultConfig {
    /// Decode the configured master key
    pub fn master_key(&self) -> Result<MasterKey> {
        MasterKey::from_base64(&self.master_key).context("Invalid vault master key")
    }
}

fn default_store_timeout() -> u64 {
    10
}

/// Where rate limit counters live
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitBackend {
    /// In-process map; correct for a single instance only
    #[default]
    Memory,
    /// Shared table in the application database
    Database,
}

/// One fixed-window budget
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct TierConfig {
    pub window_secs: u64,
    pub max_requests: u32,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    #[serde(default)]
    pub backend: RateLimitBackend,
    #[serde(default = "default_general_tier")]
    pub general: TierConfig,
    #[serde(default = "default_sensitive_tier")]
    pub sensitive: TierConfig,
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            backend: RateLimitBackend::default(),
            general: default_general_tier(),
            sensitive: default_sensitive_tier(),
            cleanup_interval_secs: default_cleanup_interval(),
        }
    }
}

fn default_general_tier() -> TierConfig {
    TierConfig {
        window_secs: 15 * 60,
        max_requests: 100,
    }
}

fn default_sensitive_tier() -> TierConfig {
    TierConfig {
        window_secs: 5 * 60,
        max_requests: 20,
    }
}

fn default_cleanup_interval() -> u64 {
    3600
}

/// Team access policy overrides
///
/// Each entry replaces the default levels granted to a team role, e.g.
///
/// ```yaml
/// access:
///   roles:
///     member: [read, reveal]
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AccessConfig {
    #[serde(default)]
    pub roles: HashMap<TeamRole, Vec<AccessLevel>>,
}

/// Operational alert channel configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AlertConfig {
    /// Webhook receiving JSON alerts (optional; alerts are always logged)
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_alert_timeout")]
    pub timeout_secs: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: default_alert_timeout(),
        }
    }
}

fn default_alert_timeout() -> u64 {
    10
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
                tls: None,
                trust_proxy_headers: false,
                cors_origins: Vec::new(),
            },
            auth: AuthConfig {
                jwt_secret: "change-me-in-production-minimum-32-characters-long".to_string(),
                token_expiry_minutes: default_token_expiry(),
                password_min_length: default_password_min_length(),
                argon2: Argon2Settings::default(),
            },
            database: DatabaseConfig {
                url: "sqlite://./data/keyvault.db".to_string(),
                max_connections: default_max_connections(),
                min_connections: default_min_connections(),
                connect_timeout_secs: default_connect_timeout(),
            },
            logging: LoggingConfig::default(),
            vault: VaultConfig::default(),
            rate_limit: RateLimitConfig::default(),
            access: AccessConfig::default(),
            alerts: AlertConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values
    /// 2. Configuration file (YAML)
    /// 3. Environment variables
    pub fn load() -> Result<Self> {
        // Try to load .env file if it exists
        let _ = dotenvy::dotenv();

        let config_path = std::env::var("KEYVAULT_CONFIG")
            .map(PathBuf::from)
            .ok()
            .or_else(Self::find_config_file);

        let mut config = match config_path {
            Some(ref path) if path.exists() => {
                eprintln!("[CONFIG] Loading configuration from: {:?}", path);
                Self::from_file(path)?
            }
            Some(ref path) => {
                eprintln!("[CONFIG] Config file not found: {:?}, using defaults", path);
                AppConfig::default()
            }
            None => {
                eprintln!("[CONFIG] No config file found, using defaults");
                AppConfig::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Parse a YAML configuration file without applying overrides
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        serde_norway::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Find the configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let paths = [
            PathBuf::from("config.yaml"),
            PathBuf::from("config/config.yaml"),
            PathBuf::from("/etc/keyvault/config.yaml"),
            dirs::config_dir()
                .map(|p| p.join("keyvault/config.yaml"))
                .unwrap_or_default(),
        ];

        paths.into_iter().find(|p| p.exists())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("KEYVAULT_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("KEYVAULT_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }
        if let Ok(trust) = std::env::var("KEYVAULT_TRUST_PROXY") {
            self.server.trust_proxy_headers = matches!(trust.as_str(), "1" | "true" | "yes");
        }
        if let Ok(origins) = std::env::var("FRONTEND_ORIGINS") {
            self.server.cors_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }

        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database.url = url;
        }

        if let Ok(secret) = std::env::var("JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Ok(minutes) = std::env::var("JWT_EXPIRES_MIN") {
            if let Ok(m) = minutes.parse() {
                self.auth.token_expiry_minutes = m;
            }
        }

        if let Ok(key) = std::env::var("VAULT_MASTER_KEY") {
            self.vault.master_key = key;
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("KEYVAULT_LOG_FORMAT") {
            self.logging.format = match format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "compact" => LogFormat::Compact,
                _ => LogFormat::Pretty,
            };
        }

        if let Ok(backend) = std::env::var("KEYVAULT_RATE_LIMIT_BACKEND") {
            self.rate_limit.backend = match backend.to_lowercase().as_str() {
                "database" | "db" => RateLimitBackend::Database,
                _ => RateLimitBackend::Memory,
            };
        }

        if let Ok(url) = std::env::var("KEYVAULT_ALERT_WEBHOOK") {
            self.alerts.webhook_url = Some(url).filter(|u| !u.is_empty());
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.len() < 32 {
            anyhow::bail!("JWT secret must be at least 32 characters long");
        }

        if self.auth.token_expiry_minutes == 0 {
            anyhow::bail!("Token expiry must be at least one minute");
        }

        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.vault.master_key.is_empty() {
            anyhow::bail!(
                "Vault master key is not set (use vault.master_key or VAULT_MASTER_KEY; \
                 generate one with --generate-master-key)"
            );
        }
        self.vault.master_key()?;

        if self.vault.store_timeout_secs == 0 {
            anyhow::bail!("Vault store timeout cannot be 0");
        }

        for (name, tier) in [
            ("general", &self.rate_limit.general),
            ("sensitive", &self.rate_limit.sensitive),
        ] {
            if tier.window_secs == 0 || tier.max_requests == 0 {
                anyhow::bail!("Rate limit tier '{}' needs a non-zero window and budget", name);
            }
        }

        if let Some(ref tls) = self.server.tls {
            if !tls.cert_file.exists() {
                anyhow::bail!("TLS certificate file not found: {:?}", tls.cert_file);
            }
            if !tls.key_file.exists() {
                anyhow::bail!("TLS key file not found: {:?}", tls.key_file);
            }
            if tls.min_version != "1.2" && tls.min_version != "1.3" {
                anyhow::bail!(
                    "Invalid TLS minimum version: {}. Must be '1.2' or '1.3'",
                    tls.min_version
                );
            }
        }

        Ok(())
    }
}
