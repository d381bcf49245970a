use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
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

/// Professional B2B leads skew mid-high quality with a wide spread.
const SCORE_BASE: f64 = 50.0;
const SCORE_RANGE: f64 = 45.0;

const SENIORITY_KEYWORDS: [&str; 7] = [
    "founder", "owner", "chief", "vp", "head", "director", "president",
];

/// B2B contact-graph provider: people search over company/contact records.
pub struct ApolloAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    usage: Arc<dyn UsageSink>,
    breaker: ProviderBreaker,
}

#[derive(Debug, Deserialize)]
struct PeopleSearchResponse {
    #[serde(default)]
    people: Vec<Person>,
}

#[derive(Debug, Deserialize)]
struct Person {
    first_name: Option<String>,
    last_name: Option<String>,
    email: Option<String>,
    email_status: Option<String>,
    title: Option<String>,
    city: Option<String>,
    country: Option<String>,
    phone_number: Option<String>,
    last_activity_date: Option<String>,
    organization: Option<Organization>,
}

#[derive(Debug, Deserialize)]
struct Organization {
    name: Option<String>,
    industry: Option<String>,
    estimated_num_employees: Option<i64>,
}

impl ApolloAdapter {
    pub fn new(config: &Config, usage: Arc<dyn UsageSink>) -> Result<Self, LeadError> {
        Ok(Self {
            client: provider_http_client(config.provider_timeout_secs)?,
            base_url: config.apollo_base_url.clone(),
            api_key: config.apollo_api_key.clone(),
            usage,
            breaker: provider_circuit_breaker(),
        })
    }

    fn to_lead(&self, person: Person, request: &FetchRequest) -> Option<NewLead> {
        let email = person.email.clone().filter(|e| is_valid_email(e))?;
        let verified = person.email_status.as_deref() == Some("verified");
        let potential = conversion_potential(&person, request);

        let organization = person.organization.as_ref();
        let industry = organization
            .and_then(|o| o.industry.clone())
            .or_else(|| request.industry.clone())
            .unwrap_or_default();
        let location = match (person.city.as_deref(), person.country.as_deref()) {
            (Some(city), Some(country)) => format!("{}, {}", city, country),
            (Some(city), None) => city.to_string(),
            (None, Some(country)) => country.to_string(),
            (None, None) => request.location.clone().unwrap_or_default(),
        };

        let mut tags: BTreeSet<String> = BTreeSet::new();
        tags.insert("b2b".to_string());
        if !industry.is_empty() {
            tags.insert(industry.to_lowercase());
        }

        Some(
            NewLead {
                first_name: person.first_name.unwrap_or_default(),
                last_name: person.last_name.unwrap_or_default(),
                email,
                phone: person.phone_number.as_deref().and_then(normalize_phone),
                company: organization.and_then(|o| o.name.clone()),
                title: person.title,
                industry,
                location,
                niche: request.niche.clone().unwrap_or_default(),
                source: LeadSource::Apollo,
                tags,
                score: derive_score(SCORE_BASE, SCORE_RANGE, potential),
                conversion_potential: potential,
                // Contact-graph records carry no engagement signal
                engagement_rate: 0.0,
                verified,
            }
            .clamped(),
        )
    }
}

/// Weighted additive model over contact-graph signals: verified deliverable
/// email, decision-maker title, requested-niche relevance, company size in
/// the serviceable band, and recency of activity.
fn conversion_potential(person: &Person, request: &FetchRequest) -> f64 {
    let mut potential = 0.20;

    if person.email_status.as_deref() == Some("verified") {
        potential += 0.15;
    }

    if let Some(title) = person.title.as_deref() {
        let title = title.to_lowercase();
        if SENIORITY_KEYWORDS.iter().any(|k| title.contains(k)) {
            potential += 0.10;
        }
    }

    let mut profile_text = String::new();
    if let Some(title) = person.title.as_deref() {
        profile_text.push_str(title);
        profile_text.push(' ');
    }
    if let Some(industry) = person.organization.as_ref().and_then(|o| o.industry.as_deref()) {
        profile_text.push_str(industry);
    }
    potential += relevance_boost(&profile_text, request.niche.as_deref(), 0.15);
    potential += relevance_boost(&profile_text, request.industry.as_deref(), 0.10);

    if let Some(employees) = person
        .organization
        .as_ref()
        .and_then(|o| o.estimated_num_employees)
    {
        if (10..=500).contains(&employees) {
            potential += 0.10;
        }
    }

    potential += recency_boost(days_since(person.last_activity_date.as_deref()), 0.20);

    clamp_potential(potential)
}

fn days_since(date: Option<&str>) -> Option<i64> {
    let date = NaiveDate::parse_from_str(date?, "%Y-%m-%d").ok()?;
    Some((Utc::now().date_naive() - date).num_days())
}

#[async_trait]
impl SourceAdapter for ApolloAdapter {
    fn source(&self) -> LeadSource {
        LeadSource::Apollo
    }

    async fn fetch_leads(&self, request: &FetchRequest) -> Result<Vec<NewLead>, LeadError> {
        let mut body = json!({
            "per_page": request.limit,
            "page": 1,
        });
        if let Some(niche) = &request.niche {
            body["q_keywords"] = json!(niche);
        }
        if let Some(industry) = &request.industry {
            body["organization_industries"] = json!([industry]);
        }
        if let Some(location) = &request.location {
            body["person_locations"] = json!([location]);
        }

        tracing::info!("Fetching up to {} apollo leads", request.limit);

        let payload = send_provider_request(
            &self.breaker,
            LeadSource::Apollo,
            self.client
                .post(format!("{}/v1/mixed_people/search", self.base_url))
                .header("X-Api-Key", &self.api_key)
                .json(&body),
        )
        .await?;

        let response: PeopleSearchResponse = serde_json::from_value(payload).map_err(|e| {
            LeadError::provider(LeadSource::Apollo, format!("unexpected schema: {}", e))
        })?;

        let leads: Vec<NewLead> = response
            .people
            .into_iter()
            .filter_map(|p| self.to_lead(p, request))
            .take(request.limit)
            .collect();

        report_usage(
            &self.usage,
            LeadSource::Apollo,
            credits_for(leads.len()),
            &self.api_key,
        )
        .await;

        tracing::info!("apollo returned {} usable leads", leads.len());
        Ok(leads)
    }
}
