use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;

use super::{
    clamp_potential, credits_for, derive_score, is_valid_email, provider_circuit_breaker,
    provider_http_client, recency_boost, relevance_boost, report_usage, send_provider_request,
    split_name, ProviderBreaker, SourceAdapter,
};
use crate::config::Config;
use crate::errors::LeadError;
use crate::models::{FetchRequest, LeadSource, NewLead};
use crate::usage::UsageSink;

/// Short-video audiences carry high baseline purchase intent, so the floor
/// is high and the spread narrow.
const SCORE_BASE: f64 = 80.0;
const SCORE_RANGE: f64 = 15.0;

/// Short-video social provider (creator search).
pub struct TiktokAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    usage: Arc<dyn UsageSink>,
    breaker: ProviderBreaker,
}

#[derive(Debug, Deserialize)]
struct CreatorSearchResponse {
    data: Option<CreatorData>,
}

#[derive(Debug, Deserialize)]
struct CreatorData {
    #[serde(default)]
    creators: Vec<Creator>,
}

#[derive(Debug, Deserialize)]
struct Creator {
    handle: Option<String>,
    nickname: Option<String>,
    bio: Option<String>,
    email: Option<String>,
    region: Option<String>,
    follower_count: Option<i64>,
    likes_count: Option<i64>,
    video_count: Option<i64>,
    last_video_days: Option<i64>,
    is_verified: Option<bool>,
}

impl Creator {
    /// Likes per follower across the catalog, a rough engagement proxy.
    fn engagement_ratio(&self) -> f64 {
        let followers = self.follower_count.unwrap_or(0);
        let videos = self.video_count.unwrap_or(0);
        if followers <= 0 || videos <= 0 {
            return 0.0;
        }
        let likes_per_video = self.likes_count.unwrap_or(0) as f64 / videos as f64;
        (likes_per_video / followers as f64).clamp(0.0, 1.0)
    }
}

impl TiktokAdapter {
    pub fn new(config: &Config, usage: Arc<dyn UsageSink>) -> Result<Self, LeadError> {
        Ok(Self {
            client: provider_http_client(config.provider_timeout_secs)?,
            base_url: config.tiktok_base_url.clone(),
            api_key: config.tiktok_api_key.clone(),
            usage,
            breaker: provider_circuit_breaker(),
        })
    }

    fn to_lead(&self, creator: Creator, request: &FetchRequest) -> Option<NewLead> {
        let email = creator.email.clone().filter(|e| is_valid_email(e))?;
        let engagement_rate = creator.engagement_ratio();
        let potential = conversion_potential(&creator, request);

        let display = creator
            .nickname
            .clone()
            .or_else(|| creator.handle.clone())
            .unwrap_or_default();
        let (first_name, last_name) = split_name(&display);

        let mut tags: BTreeSet<String> = BTreeSet::new();
        tags.insert("creator".to_string());
        tags.insert("short_video".to_string());

        Some(
            NewLead {
                first_name,
                last_name,
                email,
                phone: None,
                company: creator.handle.map(|h| format!("@{}", h)),
                title: None,
                industry: request.industry.clone().unwrap_or_default(),
                location: creator
                    .region
                    .or_else(|| request.location.clone())
                    .unwrap_or_default(),
                niche: request.niche.clone().unwrap_or_default(),
                source: LeadSource::Tiktok,
                tags,
                score: derive_score(SCORE_BASE, SCORE_RANGE, potential),
                conversion_potential: potential,
                engagement_rate,
                // Creator search only returns accounts with a disclosed
                // business inbox
                verified: true,
            }
            .clamped(),
        )
    }
}

/// Additive model over creator signals: catalog engagement, audience band,
/// bio relevance to the requested niche and posting recency. The base is the
/// highest of all channels, matching the channel's purchase intent.
fn conversion_potential(creator: &Creator, request: &FetchRequest) -> f64 {
    let mut potential = 0.30;

    potential += (creator.engagement_ratio() / 0.05).min(1.0) * 0.18;

    if let Some(followers) = creator.follower_count {
        if (10_000..=1_000_000).contains(&followers) {
            potential += 0.10;
        }
    }

    let bio = creator.bio.clone().unwrap_or_default();
    potential += relevance_boost(&bio, request.niche.as_deref(), 0.17);

    if creator.is_verified.unwrap_or(false) {
        potential += 0.05;
    }

    potential += recency_boost(creator.last_video_days, 0.15);

    clamp_potential(potential)
}

#[async_trait]
impl SourceAdapter for TiktokAdapter {
    fn source(&self) -> LeadSource {
        LeadSource::Tiktok
    }

    async fn fetch_leads(&self, request: &FetchRequest) -> Result<Vec<NewLead>, LeadError> {
        let keyword = request
            .niche
            .clone()
            .or_else(|| request.industry.clone())
            .unwrap_or_else(|| "smallbusiness".to_string());

        let body = json!({
            "keyword": keyword,
            "max_count": request.limit,
            "filters": {
                "region": request.location,
                "has_contact_email": true,
            }
        });

        tracing::info!("Fetching up to {} tiktok leads", request.limit);

        let payload = send_provider_request(
            &self.breaker,
            LeadSource::Tiktok,
            self.client
                .post(format!("{}/v2/research/creator/query", self.base_url))
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body),
        )
        .await?;

        let response: CreatorSearchResponse = serde_json::from_value(payload).map_err(|e| {
            LeadError::provider(LeadSource::Tiktok, format!("unexpected schema: {}", e))
        })?;

        let leads: Vec<NewLead> = response
            .data
            .map(|d| d.creators)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|c| self.to_lead(c, request))
            .take(request.limit)
            .collect();

        report_usage(
            &self.usage,
            LeadSource::Tiktok,
            credits_for(leads.len()),
            &self.api_key,
        )
        .await;

        tracing::info!("tiktok returned {} usable leads", leads.len());
        Ok(leads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creator(followers: i64, likes: i64, videos: i64) -> Creator {
        Creator {
            handle: Some("gearreviews".into()),
            nickname: Some("Gear Reviews".into()),
            bio: Some("Daily fitness gear reviews".into()),
            email: Some("partnerships@gearreviews.tv".into()),
            region: Some("US".into()),
            follower_count: Some(followers),
            likes_count: Some(likes),
            video_count: Some(videos),
            last_video_days: Some(1),
            is_verified: Some(false),
        }
    }

    #[test]
    fn engagement_ratio_handles_empty_catalog() {
        assert_eq!(creator(10_000, 0, 0).engagement_ratio(), 0.0);
    }

    #[test]
    fn base_reflects_channel_intent() {
        let request = FetchRequest::default();
        let cold = conversion_potential(&creator(100, 0, 1), &request);
        assert!(cold >= 0.30);
        assert!(cold <= 0.95);
    }

    #[test]
    fn score_band_is_tight_and_high() {
        assert_eq!(derive_score(SCORE_BASE, SCORE_RANGE, 0.0), 80);
        assert_eq!(derive_score(SCORE_BASE, SCORE_RANGE, 0.95), 94);
    }
}
