use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;

use super::{
    clamp_potential, credits_for, derive_score, is_valid_email, normalize_phone,
    provider_circuit_breaker, provider_http_client, recency_boost, relevance_boost, report_usage,
    send_provider_request, split_name, ProviderBreaker, SourceAdapter,
};
use crate::config::Config;
use crate::errors::LeadError;
use crate::models::{FetchRequest, LeadSource, NewLead};
use crate::usage::UsageSink;

/// Creator/business accounts convert well once reachable; narrow spread.
const SCORE_BASE: f64 = 70.0;
const SCORE_RANGE: f64 = 25.0;

/// Social (photo/creator) provider via graph business discovery.
pub struct InstagramAdapter {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
    usage: Arc<dyn UsageSink>,
    breaker: ProviderBreaker,
}

#[derive(Debug, Deserialize)]
struct DiscoveryResponse {
    #[serde(default)]
    data: Vec<Account>,
}

#[derive(Debug, Deserialize)]
struct Account {
    username: Option<String>,
    full_name: Option<String>,
    biography: Option<String>,
    business_email: Option<String>,
    business_phone_number: Option<String>,
    category: Option<String>,
    city: Option<String>,
    followers_count: Option<i64>,
    media_count: Option<i64>,
    avg_likes: Option<f64>,
    avg_comments: Option<f64>,
    last_post_days: Option<i64>,
    is_verified: Option<bool>,
}

impl Account {
    /// Public engagement ratio: average interactions per post over audience
    /// size.
    fn engagement_ratio(&self) -> f64 {
        let followers = self.followers_count.unwrap_or(0);
        if followers <= 0 {
            return 0.0;
        }
        let interactions = self.avg_likes.unwrap_or(0.0) + self.avg_comments.unwrap_or(0.0);
        (interactions / followers as f64).clamp(0.0, 1.0)
    }
}

impl InstagramAdapter {
    pub fn new(config: &Config, usage: Arc<dyn UsageSink>) -> Result<Self, LeadError> {
        Ok(Self {
            client: provider_http_client(config.provider_timeout_secs)?,
            base_url: config.instagram_base_url.clone(),
            access_token: config.instagram_access_token.clone(),
            usage,
            breaker: provider_circuit_breaker(),
        })
    }

    fn to_lead(&self, account: Account, request: &FetchRequest) -> Option<NewLead> {
        let email = account.business_email.clone().filter(|e| is_valid_email(e))?;
        // A provider-supplied business contact counts as a verified signal
        let verified = true;
        let engagement_rate = account.engagement_ratio();
        let potential = conversion_potential(&account, request);

        let display = account
            .full_name
            .clone()
            .or_else(|| account.username.clone())
            .unwrap_or_default();
        let (first_name, last_name) = split_name(&display);

        let mut tags: BTreeSet<String> = BTreeSet::new();
        tags.insert("creator".to_string());
        if let Some(category) = &account.category {
            tags.insert(category.to_lowercase());
        }

        Some(
            NewLead {
                first_name,
                last_name,
                email,
                phone: account
                    .business_phone_number
                    .as_deref()
                    .and_then(normalize_phone),
                company: account.username.map(|u| format!("@{}", u)),
                title: account.category.clone(),
                industry: request.industry.clone().unwrap_or_default(),
                location: account
                    .city
                    .or_else(|| request.location.clone())
                    .unwrap_or_default(),
                niche: request.niche.clone().unwrap_or_default(),
                source: LeadSource::Instagram,
                tags,
                score: derive_score(SCORE_BASE, SCORE_RANGE, potential),
                conversion_potential: potential,
                engagement_rate,
                verified,
            }
            .clamped(),
        )
    }
}

/// Additive model over creator signals: audience engagement, follower band,
/// bio relevance to the requested niche, verified badge and posting recency.
fn conversion_potential(account: &Account, request: &FetchRequest) -> f64 {
    let mut potential = 0.22;

    // Engagement above ~3% is already strong on this channel
    potential += (account.engagement_ratio() / 0.03).min(1.0) * 0.20;

    if let Some(followers) = account.followers_count {
        if (5_000..=500_000).contains(&followers) {
            potential += 0.10;
        } else if followers > 500_000 {
            potential += 0.05;
        }
    }

    let bio = account.biography.clone().unwrap_or_default();
    potential += relevance_boost(&bio, request.niche.as_deref(), 0.18);

    if account.is_verified.unwrap_or(false) {
        potential += 0.05;
    }

    potential += recency_boost(account.last_post_days, 0.15);

    clamp_potential(potential)
}

#[async_trait]
impl SourceAdapter for InstagramAdapter {
    fn source(&self) -> LeadSource {
        LeadSource::Instagram
    }

    async fn fetch_leads(&self, request: &FetchRequest) -> Result<Vec<NewLead>, LeadError> {
        let query_term = request
            .niche
            .clone()
            .or_else(|| request.industry.clone())
            .unwrap_or_else(|| "business".to_string());

        tracing::info!("Fetching up to {} instagram leads", request.limit);

        let payload = send_provider_request(
            &self.breaker,
            LeadSource::Instagram,
            self.client
                .get(format!("{}/v19.0/business_discovery", self.base_url))
                .query(&[
                    ("q", query_term.as_str()),
                    ("limit", &request.limit.to_string()),
                    ("access_token", self.access_token.as_str()),
                ]),
        )
        .await?;

        let response: DiscoveryResponse = serde_json::from_value(payload).map_err(|e| {
            LeadError::provider(LeadSource::Instagram, format!("unexpected schema: {}", e))
        })?;

        let leads: Vec<NewLead> = response
            .data
            .into_iter()
            .filter_map(|a| self.to_lead(a, request))
            .take(request.limit)
            .collect();

        report_usage(
            &self.usage,
            LeadSource::Instagram,
            credits_for(leads.len()),
            &self.access_token,
        )
        .await;

        tracing::info!("instagram returned {} usable leads", leads.len());
        Ok(leads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(followers: i64, avg_likes: f64) -> Account {
        Account {
            username: Some("liftwithmara".into()),
            full_name: Some("Mara Flint".into()),
            biography: Some("Fitness coaching and meal plans".into()),
            business_email: Some("mara@liftwithmara.com".into()),
            business_phone_number: None,
            category: Some("Coach".into()),
            city: Some("Denver".into()),
            followers_count: Some(followers),
            media_count: Some(300),
            avg_likes: Some(avg_likes),
            avg_comments: Some(avg_likes / 10.0),
            last_post_days: Some(2),
            is_verified: Some(false),
        }
    }

    #[test]
    fn engagement_ratio_is_bounded() {
        assert_eq!(account(0, 100.0).engagement_ratio(), 0.0);
        assert!(account(1000, 50.0).engagement_ratio() <= 1.0);
    }

    #[test]
    fn engaged_mid_size_accounts_score_highest() {
        let request = FetchRequest {
            niche: Some("fitness".into()),
            ..Default::default()
        };
        let engaged = conversion_potential(&account(50_000, 2_500.0), &request);
        let ghost = conversion_potential(&account(1_000, 1.0), &request);
        assert!(engaged > ghost);
        assert!(engaged <= 0.95);
        assert!(ghost >= 0.22);
    }
}
