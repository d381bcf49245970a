use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;

use super::{
    clamp_potential, credits_for, derive_score, is_valid_email, normalize_phone,
    provider_circuit_breaker, provider_http_client, recency_boost, relevance_boost, report_usage,
    send_provider_request, ProviderBreaker, SourceAdapter,
};
use crate::config::Config;
use crate::errors::LeadError;
use crate::models::{FetchRequest, LeadSource, NewLead};
use crate::usage::UsageSink;

/// Professional-network leads have a high quality floor.
const SCORE_BASE: f64 = 60.0;
const SCORE_RANGE: f64 = 40.0;

/// Professional-network provider (sales navigator style people search).
pub struct LinkedinAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    usage: Arc<dyn UsageSink>,
    breaker: ProviderBreaker,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    elements: Vec<Profile>,
}

#[derive(Debug, Deserialize)]
struct Profile {
    first_name: Option<String>,
    last_name: Option<String>,
    headline: Option<String>,
    company: Option<String>,
    title: Option<String>,
    location: Option<String>,
    industry: Option<String>,
    email: Option<String>,
    email_verified: Option<bool>,
    phone: Option<String>,
    connections: Option<i64>,
    premium: Option<bool>,
    last_active_days: Option<i64>,
    #[serde(default)]
    skills: Vec<String>,
}

impl LinkedinAdapter {
    pub fn new(config: &Config, usage: Arc<dyn UsageSink>) -> Result<Self, LeadError> {
        Ok(Self {
            client: provider_http_client(config.provider_timeout_secs)?,
            base_url: config.linkedin_base_url.clone(),
            api_key: config.linkedin_api_key.clone(),
            usage,
            breaker: provider_circuit_breaker(),
        })
    }

    fn to_lead(&self, profile: Profile, request: &FetchRequest) -> Option<NewLead> {
        let email = profile.email.clone().filter(|e| is_valid_email(e))?;
        let verified = profile.email_verified.unwrap_or(false);
        let potential = conversion_potential(&profile, request);

        let mut tags: BTreeSet<String> = BTreeSet::new();
        tags.insert("professional".to_string());
        for skill in profile.skills.iter().take(3) {
            tags.insert(skill.to_lowercase());
        }

        Some(
            NewLead {
                first_name: profile.first_name.unwrap_or_default(),
                last_name: profile.last_name.unwrap_or_default(),
                email,
                phone: profile.phone.as_deref().and_then(normalize_phone),
                company: profile.company,
                title: profile.title.or(profile.headline.clone()),
                industry: profile
                    .industry
                    .or_else(|| request.industry.clone())
                    .unwrap_or_default(),
                location: profile
                    .location
                    .or_else(|| request.location.clone())
                    .unwrap_or_default(),
                niche: request.niche.clone().unwrap_or_default(),
                source: LeadSource::Linkedin,
                tags,
                score: derive_score(SCORE_BASE, SCORE_RANGE, potential),
                conversion_potential: potential,
                // No public engagement metric on professional profiles
                engagement_rate: 0.0,
                verified,
            }
            .clamped(),
        )
    }
}

/// Additive model over network signals: reachable inbox, profile
/// completeness (headline + skills), network size, niche relevance of the
/// headline/skills, premium membership and recent activity.
fn conversion_potential(profile: &Profile, request: &FetchRequest) -> f64 {
    let mut potential = 0.18;

    if profile.email_verified.unwrap_or(false) {
        potential += 0.12;
    }

    if profile.headline.is_some() && !profile.skills.is_empty() {
        potential += 0.08;
    }

    if let Some(connections) = profile.connections {
        if connections >= 500 {
            potential += 0.10;
        } else if connections >= 100 {
            potential += 0.05;
        }
    }

    let mut profile_text = profile.headline.clone().unwrap_or_default();
    for skill in &profile.skills {
        profile_text.push(' ');
        profile_text.push_str(skill);
    }
    potential += relevance_boost(&profile_text, request.niche.as_deref(), 0.20);
    potential += relevance_boost(&profile_text, request.industry.as_deref(), 0.07);

    if profile.premium.unwrap_or(false) {
        potential += 0.05;
    }

    potential += recency_boost(profile.last_active_days, 0.15);

    clamp_potential(potential)
}

#[async_trait]
impl SourceAdapter for LinkedinAdapter {
    fn source(&self) -> LeadSource {
        LeadSource::Linkedin
    }

    async fn fetch_leads(&self, request: &FetchRequest) -> Result<Vec<NewLead>, LeadError> {
        let mut query: Vec<(&str, String)> = vec![("count", request.limit.to_string())];
        if let Some(niche) = &request.niche {
            query.push(("keywords", niche.clone()));
        }
        if let Some(industry) = &request.industry {
            query.push(("industry", industry.clone()));
        }
        if let Some(location) = &request.location {
            query.push(("location", location.clone()));
        }

        tracing::info!("Fetching up to {} linkedin leads", request.limit);

        let payload = send_provider_request(
            &self.breaker,
            LeadSource::Linkedin,
            self.client
                .get(format!("{}/v1/people/search", self.base_url))
                .header("Authorization", format!("Bearer {}", self.api_key))
                .query(&query),
        )
        .await?;

        let response: SearchResponse = serde_json::from_value(payload).map_err(|e| {
            LeadError::provider(LeadSource::Linkedin, format!("unexpected schema: {}", e))
        })?;

        let leads: Vec<NewLead> = response
            .elements
            .into_iter()
            .filter_map(|p| self.to_lead(p, request))
            .take(request.limit)
            .collect();

        report_usage(
            &self.usage,
            LeadSource::Linkedin,
            credits_for(leads.len()),
            &self.api_key,
        )
        .await;

        tracing::info!("linkedin returned {} usable leads", leads.len());
        Ok(leads)
    }
}
