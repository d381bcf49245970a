use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::aggregation::LeadAggregationService;
use crate::errors::LeadError;
use crate::models::{FetchCriteria, Lead, LeadCriteria, LeadSource, LeadSourceConfig};
use crate::scheduler::DailyRefillScheduler;
use crate::store::LeadStore;

/// Caller limits above this are rejected rather than silently clamped.
const MAX_LEAD_LIMIT: usize = 100;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<LeadStore>,
    pub aggregation: Arc<LeadAggregationService>,
    pub scheduler: Arc<DailyRefillScheduler>,
}

pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "lead-sourcing-api",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Query-string shape of GET /api/v1/leads. Multi-valued filters arrive as
/// comma-separated lists.
#[derive(Debug, Deserialize)]
pub struct LeadQuery {
    pub niche: Option<String>,
    pub industry: Option<String>,
    pub location: Option<String>,
    pub sources: Option<String>,
    pub min_score: Option<i32>,
    pub limit: Option<usize>,
}

fn split_csv(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

impl LeadQuery {
    fn into_criteria(self) -> Result<LeadCriteria, LeadError> {
        let limit = self.limit.unwrap_or(10);
        if limit == 0 || limit > MAX_LEAD_LIMIT {
            return Err(LeadError::BadRequest(format!(
                "limit must be between 1 and {}",
                MAX_LEAD_LIMIT
            )));
        }

        let sources = match self.sources.as_deref() {
            None => None,
            Some(raw) => {
                let mut parsed = Vec::new();
                for name in split_csv(Some(raw)) {
                    let source = LeadSource::parse(&name).ok_or_else(|| {
                        LeadError::BadRequest(format!("unknown lead source: {}", name))
                    })?;
                    parsed.push(source);
                }
                Some(parsed)
            }
        };

        Ok(LeadCriteria {
            niche: self.niche.filter(|n| !n.trim().is_empty()),
            industry: split_csv(self.industry.as_deref()),
            location: split_csv(self.location.as_deref()),
            sources,
            min_score: self.min_score,
            limit,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct LeadsResponse {
    pub leads: Vec<Lead>,
    pub count: usize,
}

pub async fn get_leads(
    State(state): State<AppState>,
    Query(query): Query<LeadQuery>,
) -> Result<impl IntoResponse, LeadError> {
    let criteria = query.into_criteria()?;
    let leads = state.aggregation.get_leads(&criteria).await?;
    let count = leads.len();
    Ok(Json(LeadsResponse { leads, count }))
}

pub async fn get_lead_stats(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, LeadError> {
    let stats = state.aggregation.get_lead_stats().await?;
    Ok(Json(stats))
}

pub async fn list_sources(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, LeadError> {
    let configs = state.store.repository().list_source_configs(false).await?;
    Ok(Json(configs))
}

/// Body of PUT /api/v1/sources/:source. Absent fields keep their current
/// value; a missing config record is created from defaults first.
#[derive(Debug, Deserialize)]
pub struct SourceConfigUpdate {
    pub active: Option<bool>,
    pub fetch_priority: Option<f64>,
    pub daily_limit: Option<i64>,
    pub credits_remaining: Option<i64>,
    pub target_niches: Option<Vec<String>>,
    pub fetch_criteria: Option<FetchCriteria>,
}

pub async fn update_source(
    State(state): State<AppState>,
    Path(source): Path<String>,
    Json(update): Json<SourceConfigUpdate>,
) -> Result<impl IntoResponse, LeadError> {
    let source = LeadSource::parse(&source)
        .ok_or_else(|| LeadError::BadRequest(format!("unknown lead source: {}", source)))?;

    if let Some(priority) = update.fetch_priority {
        if !priority.is_finite() || priority < 0.0 {
            return Err(LeadError::BadRequest(
                "fetch_priority must be a non-negative number".to_string(),
            ));
        }
    }
    if matches!(update.daily_limit, Some(limit) if limit < 0) {
        return Err(LeadError::BadRequest(
            "daily_limit must be non-negative".to_string(),
        ));
    }

    let mut config = match state.store.get_lead_source_config(source).await {
        Ok(config) => config,
        Err(LeadError::ConfigNotFound(_)) => LeadSourceConfig {
            source,
            active: false,
            fetch_priority: 1.0,
            daily_limit: 100,
            credits_remaining: 0,
            credits_used_today: 0,
            target_niches: Vec::new(),
            fetch_criteria: FetchCriteria::default(),
            last_fetch: None,
        },
        Err(e) => return Err(e),
    };

    if let Some(active) = update.active {
        config.active = active;
    }
    if let Some(priority) = update.fetch_priority {
        config.fetch_priority = priority;
    }
    if let Some(limit) = update.daily_limit {
        config.daily_limit = limit;
    }
    if let Some(credits) = update.credits_remaining {
        config.credits_remaining = credits;
    }
    if let Some(niches) = update.target_niches {
        config.target_niches = niches;
    }
    if let Some(criteria) = update.fetch_criteria {
        config.fetch_criteria = criteria;
    }

    state.store.update_lead_source_config(&config).await?;
    Ok(Json(config))
}

pub async fn trigger_daily_refill(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, LeadError> {
    let report = state.scheduler.daily_lead_fetch().await?;
    Ok((StatusCode::OK, Json(report)))
}
