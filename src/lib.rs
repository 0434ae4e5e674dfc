//! Keyvault Library
//!
//! Encrypted storage for third-party API keys, shared through teams, with
//! tiered rate limiting and an append-only audit log.

pub mod api;
pub mod config;
pub mod db;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

pub use config::AppConfig;
pub use db::DbPool;
pub use middleware::{auth_middleware, AuthUser, Claims};
pub use services::Services;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Database connection pool
    pub db: DbPool,
    /// Vault, account and team services
    pub services: Services,
}

impl AppState {
    /// Wire every service to the pool
    pub fn new(config: AppConfig, db: DbPool) -> anyhow::Result<Self> {
        let services = Services::build(&config, &db)?;
        Ok(Self {
            config,
            db,
            services,
        })
    }
}
