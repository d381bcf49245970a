use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;

use super::{
    clamp_potential, credits_for, derive_score, is_valid_email, normalize_phone,
    provider_circuit_breaker, provider_http_client, relevance_boost, report_usage,
    send_provider_request, ProviderBreaker, SourceAdapter,
};
use crate::config::Config;
use crate::errors::LeadError;
use crate::models::{FetchRequest, LeadSource, NewLead};
use crate::usage::UsageSink;

/// Directory businesses are a mixed bag; mid base with decent spread.
const SCORE_BASE: f64 = 55.0;
const SCORE_RANGE: f64 = 35.0;

/// Maps/business-directory provider (place text search).
pub struct GoogleMapsAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    usage: Arc<dyn UsageSink>,
    breaker: ProviderBreaker,
}

#[derive(Debug, Deserialize)]
struct TextSearchResponse {
    #[serde(default)]
    results: Vec<Place>,
}

#[derive(Debug, Deserialize)]
struct Place {
    name: Option<String>,
    formatted_address: Option<String>,
    #[serde(default)]
    types: Vec<String>,
    rating: Option<f64>,
    user_ratings_total: Option<i64>,
    website: Option<String>,
    formatted_phone_number: Option<String>,
    business_status: Option<String>,
}

impl GoogleMapsAdapter {
    pub fn new(config: &Config, usage: Arc<dyn UsageSink>) -> Result<Self, LeadError> {
        Ok(Self {
            client: provider_http_client(config.provider_timeout_secs)?,
            base_url: config.google_maps_base_url.clone(),
            api_key: config.google_maps_api_key.clone(),
            usage,
            breaker: provider_circuit_breaker(),
        })
    }

    fn to_lead(&self, place: Place, request: &FetchRequest) -> Option<NewLead> {
        let name = place.name.clone().filter(|n| !n.is_empty())?;
        // The directory exposes no inbox; derive a generic one from the
        // website. Derived contacts stay unverified with zero engagement.
        let email = derived_email(place.website.as_deref()?)?;
        if !is_valid_email(&email) {
            return None;
        }
        let potential = conversion_potential(&place, request);

        let mut tags: BTreeSet<String> = BTreeSet::new();
        tags.insert("local_business".to_string());
        for t in place.types.iter().take(2) {
            tags.insert(t.clone());
        }

        Some(
            NewLead {
                first_name: name.clone(),
                last_name: String::new(),
                email,
                phone: place
                    .formatted_phone_number
                    .as_deref()
                    .and_then(normalize_phone),
                company: Some(name),
                title: None,
                industry: request.industry.clone().unwrap_or_default(),
                location: place
                    .formatted_address
                    .or_else(|| request.location.clone())
                    .unwrap_or_default(),
                niche: request.niche.clone().unwrap_or_default(),
                source: LeadSource::GoogleMaps,
                tags,
                score: derive_score(SCORE_BASE, SCORE_RANGE, potential),
                conversion_potential: potential,
                engagement_rate: 0.0,
                verified: false,
            }
            .clamped(),
        )
    }
}

/// `info@<host>` from the business website.
fn derived_email(website: &str) -> Option<String> {
    let host = website
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_start_matches("www.")
        .split('/')
        .next()?
        .trim();
    if host.is_empty() || !host.contains('.') {
        return None;
    }
    Some(format!("info@{}", host.to_lowercase()))
}

/// Additive model over directory signals: public rating, review volume as a
/// traction proxy, category relevance to the requested niche, an operating
/// storefront and a reachable website.
fn conversion_potential(place: &Place, request: &FetchRequest) -> f64 {
    let mut potential = 0.20;

    if let Some(rating) = place.rating {
        potential += (rating / 5.0).clamp(0.0, 1.0) * 0.18;
    }

    if let Some(reviews) = place.user_ratings_total {
        if reviews >= 100 {
            potential += 0.12;
        } else if reviews >= 20 {
            potential += 0.06;
        }
    }

    let categories = place.types.join(" ").replace('_', " ");
    potential += relevance_boost(&categories, request.niche.as_deref(), 0.18);

    if place.business_status.as_deref() == Some("OPERATIONAL") {
        potential += 0.07;
    }

    if place.website.is_some() {
        potential += 0.05;
    }

    clamp_potential(potential)
}

#[async_trait]
impl SourceAdapter for GoogleMapsAdapter {
    fn source(&self) -> LeadSource {
        LeadSource::GoogleMaps
    }

    async fn fetch_leads(&self, request: &FetchRequest) -> Result<Vec<NewLead>, LeadError> {
        let mut query_term = request
            .niche
            .clone()
            .or_else(|| request.industry.clone())
            .unwrap_or_else(|| "business".to_string());
        if let Some(location) = &request.location {
            query_term = format!("{} in {}", query_term, location);
        }

        tracing::info!("Fetching up to {} google_maps leads", request.limit);

        let payload = send_provider_request(
            &self.breaker,
            LeadSource::GoogleMaps,
            self.client
                .get(format!(
                    "{}/maps/api/place/textsearch/json",
                    self.base_url
                ))
                .query(&[("query", query_term.as_str()), ("key", self.api_key.as_str())]),
        )
        .await?;

        let response: TextSearchResponse = serde_json::from_value(payload).map_err(|e| {
            LeadError::provider(LeadSource::GoogleMaps, format!("unexpected schema: {}", e))
        })?;

        let leads: Vec<NewLead> = response
            .results
            .into_iter()
            .filter_map(|p| self.to_lead(p, request))
            .take(request.limit)
            .collect();

        report_usage(
            &self.usage,
            LeadSource::GoogleMaps,
            credits_for(leads.len()),
            &self.api_key,
        )
        .await;

        tracing::info!("google_maps returned {} usable leads", leads.len());
        Ok(leads)
    }
}
