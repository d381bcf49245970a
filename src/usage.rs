use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::errors::LeadError;
use crate::models::LeadSource;
use crate::store::LeadStore;

/// Remaining-credit level at which an administrative alert is raised.
pub const LOW_CREDIT_WATERMARK: i64 = 10;

/// Truncates a credential to a short prefix. Full credentials must never
/// reach logs or alerts.
pub fn redact_credential(credential: &str) -> String {
    let prefix: String = credential.chars().take(8).collect();
    format!("{}…", prefix)
}

/// Administrative alert emitted when a source is close to exhausting its
/// credits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiLimitAlert {
    #[serde(rename = "type")]
    pub alert_type: String,
    pub source: LeadSource,
    pub credits_remaining: i64,
    pub credential_ref_redacted: String,
}

impl ApiLimitAlert {
    pub fn new(source: LeadSource, credits_remaining: i64, credential_ref: &str) -> Self {
        Self {
            alert_type: "api_limit".to_string(),
            source,
            credits_remaining,
            credential_ref_redacted: redact_credential(credential_ref),
        }
    }
}

/// Fire-and-forget administrative alert channel. Failures are the caller's
/// to swallow; usage tracking never fails because alerting did.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn create_alert(&self, alert: ApiLimitAlert) -> Result<(), LeadError>;
}

/// Posts alerts to an operations webhook.
pub struct WebhookAlertSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookAlertSink {
    pub fn new(url: String) -> Result<Self, LeadError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| LeadError::Internal(format!("Failed to build alert client: {}", e)))?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl AlertSink for WebhookAlertSink {
    async fn create_alert(&self, alert: ApiLimitAlert) -> Result<(), LeadError> {
        let response = self
            .client
            .post(&self.url)
            .json(&alert)
            .send()
            .await
            .map_err(|e| LeadError::Internal(format!("Alert webhook failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(LeadError::Internal(format!(
                "Alert webhook returned status {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Fallback sink used when no webhook is configured: alerts land in the log
/// stream only.
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn create_alert(&self, alert: ApiLimitAlert) -> Result<(), LeadError> {
        tracing::warn!(
            "Low credit alert: source {} has {} credits left (key {})",
            alert.source,
            alert.credits_remaining,
            alert.credential_ref_redacted
        );
        Ok(())
    }
}

/// What adapters see of the tracker: a place to report consumed credits
/// after every successful upstream fetch.
#[async_trait]
pub trait UsageSink: Send + Sync {
    async fn track(
        &self,
        source: LeadSource,
        credits_used: i64,
        credential_ref: &str,
    ) -> Result<(), LeadError>;
}

/// Per-source credit ledger with low-credit alerting.
///
/// The ledger update is a read-modify-write against a single config record;
/// updates are serialized per source so a live request racing the daily
/// scheduler cannot lose a decrement.
pub struct UsageTracker {
    store: Arc<LeadStore>,
    alerts: Arc<dyn AlertSink>,
    locks: HashMap<LeadSource, Mutex<()>>,
}

impl UsageTracker {
    pub fn new(store: Arc<LeadStore>, alerts: Arc<dyn AlertSink>) -> Self {
        let locks = LeadSource::ALL
            .into_iter()
            .map(|source| (source, Mutex::new(())))
            .collect();
        Self {
            store,
            alerts,
            locks,
        }
    }

    pub async fn track_api_usage(
        &self,
        source: LeadSource,
        credits_used: i64,
        credential_ref: &str,
    ) -> Result<(), LeadError> {
        // locks is populated for every LeadSource variant at construction
        let _guard = self.locks[&source].lock().await;

        let mut config = self.store.get_lead_source_config(source).await?;
        config.credits_remaining -= credits_used;
        config.credits_used_today += credits_used;
        config.last_fetch = Some(Utc::now());
        self.store.update_lead_source_config(&config).await?;

        tracing::debug!(
            "Tracked {} credits for {} ({} remaining, {} used today)",
            credits_used,
            source,
            config.credits_remaining,
            config.credits_used_today
        );

        if config.credits_remaining <= LOW_CREDIT_WATERMARK {
            let alert = ApiLimitAlert::new(source, config.credits_remaining, credential_ref);
            if let Err(e) = self.alerts.create_alert(alert).await {
                // Alerting must never fail a lead fetch
                tracing::warn!("Failed to create low-credit alert for {}: {}", source, e);
            }
        }

        Ok(())
    }
}

#[async_trait]
impl UsageSink for UsageTracker {
    async fn track(
        &self,
        source: LeadSource,
        credits_used: i64,
        credential_ref: &str,
    ) -> Result<(), LeadError> {
        self.track_api_usage(source, credits_used, credential_ref)
            .await
    }
}
