//! Operational alert channel
//!
//! Failures that must never be dropped silently (audit writes, decryption,
//! rate limit storage, membership lookups) are escalated here. Every alert
//! is logged at `error` on the `keyvault::alert` target, kept in a short
//! in-memory history, and POSTed to the configured webhook if there is one.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use tracing::{error, warn};

use crate::config::AlertConfig;

const HISTORY_LEN: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    AuditWriteFailed,
    DecryptionFailure,
    RateLimitStoreFailure,
    MembershipLookupFailure,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpsAlert {
    pub kind: AlertKind,
    pub message: String,
    pub context: serde_json::Value,
    pub raised_at: DateTime<Utc>,
}

impl OpsAlert {
    pub fn new(kind: AlertKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: serde_json::json!({}),
            raised_at: Utc::now(),
        }
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }
}

#[derive(Clone)]
pub struct AlertChannel {
    http_client: Client,
    webhook_url: Option<String>,
    history: Arc<Mutex<VecDeque<OpsAlert>>>,
}

impl AlertChannel {
    pub fn new(config: &AlertConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build alert HTTP client")?;

        Ok(Self {
            http_client,
            webhook_url: config.webhook_url.clone().filter(|u| !u.is_empty()),
            history: Arc::new(Mutex::new(VecDeque::with_capacity(HISTORY_LEN))),
        })
    }

    /// Log-only channel
    pub fn disabled() -> Self {
        Self {
            http_client: Client::new(),
            webhook_url: None,
            history: Arc::new(Mutex::new(VecDeque::with_capacity(HISTORY_LEN))),
        }
    }

    /// Escalate an alert without waiting for delivery
    pub fn raise(&self, alert: OpsAlert) {
        error!(
            target: "keyvault::alert",
            kind = ?alert.kind,
            context = %alert.context,
            "{}",
            alert.message
        );

        if let Ok(mut history) = self.history.lock() {
            if history.len() == HISTORY_LEN {
                history.pop_front();
            }
            history.push_back(alert.clone());
        }

        if self.webhook_url.is_some() {
            let channel = self.clone();
            tokio::spawn(async move {
                if let Err(e) = channel.deliver(&alert).await {
                    warn!(target: "keyvault::alert", "Alert webhook delivery failed: {:#}", e);
                }
            });
        }
    }

    /// POST one alert to the webhook
    pub async fn deliver(&self, alert: &OpsAlert) -> Result<()> {
        let Some(url) = &self.webhook_url else {
            return Ok(());
        };

        let response = self
            .http_client
            .post(url)
            .json(alert)
            .send()
            .await
            .context("Failed to send alert webhook")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Alert webhook returned error {}: {}", status, body);
        }

        Ok(())
    }

    /// Most recent alerts, oldest first
    pub fn recent(&self) -> Vec<OpsAlert> {
        self.history
            .lock()
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }
}
