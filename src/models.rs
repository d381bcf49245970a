use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use uuid::Uuid;

/// External systems that supply leads. One variant per provider adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadSource {
    Apollo,
    Linkedin,
    Instagram,
    Tiktok,
    GoogleMaps,
}

impl LeadSource {
    pub const ALL: [LeadSource; 5] = [
        LeadSource::Apollo,
        LeadSource::Linkedin,
        LeadSource::Instagram,
        LeadSource::Tiktok,
        LeadSource::GoogleMaps,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LeadSource::Apollo => "apollo",
            LeadSource::Linkedin => "linkedin",
            LeadSource::Instagram => "instagram",
            LeadSource::Tiktok => "tiktok",
            LeadSource::GoogleMaps => "google_maps",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "apollo" => Some(LeadSource::Apollo),
            "linkedin" => Some(LeadSource::Linkedin),
            "instagram" => Some(LeadSource::Instagram),
            "tiktok" => Some(LeadSource::Tiktok),
            "google_maps" => Some(LeadSource::GoogleMaps),
            _ => None,
        }
    }
}

impl fmt::Display for LeadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A prospective contact with scoring and provenance metadata.
///
/// IDs are assigned by the store on persistence; adapters only ever produce
/// [`NewLead`] values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub title: Option<String>,
    pub industry: String,
    pub location: String,
    pub niche: String,
    pub source: LeadSource,
    pub tags: BTreeSet<String>,
    /// 0..=100, provider-adjusted.
    pub score: i32,
    /// 0.0..=0.95 — never 1.0, the model always leaves an uncertainty margin.
    pub conversion_potential: f64,
    /// 0.0..=1.0.
    pub engagement_rate: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_enriched: Option<DateTime<Utc>>,
    pub verified: bool,
    pub batch_id: Option<Uuid>,
}

/// Adapter output: a lead before the store assigns identity and batch
/// membership.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLead {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub title: Option<String>,
    pub industry: String,
    pub location: String,
    pub niche: String,
    pub source: LeadSource,
    pub tags: BTreeSet<String>,
    pub score: i32,
    pub conversion_potential: f64,
    pub engagement_rate: f64,
    pub verified: bool,
}

impl NewLead {
    /// Clamps scoring fields into their documented ranges and zeroes the
    /// engagement rate for unverified leads, which must not claim engagement
    /// derived solely from unverified signals.
    pub fn clamped(mut self) -> Self {
        self.score = self.score.clamp(0, 100);
        self.conversion_potential = self.conversion_potential.clamp(0.0, 0.95);
        self.engagement_rate = self.engagement_rate.clamp(0.0, 1.0);
        if !self.verified && self.engagement_rate > 0.0 {
            self.engagement_rate = 0.0;
        }
        self
    }

    /// Materializes this lead with a synthesized identity. Used when the
    /// store write failed but the fetched lead is still returned to the
    /// caller.
    pub fn into_unpersisted_lead(self) -> Lead {
        let now = Utc::now();
        Lead {
            id: Uuid::new_v4(),
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            phone: self.phone,
            company: self.company,
            title: self.title,
            industry: self.industry,
            location: self.location,
            niche: self.niche,
            source: self.source,
            tags: self.tags,
            score: self.score,
            conversion_potential: self.conversion_potential,
            engagement_rate: self.engagement_rate,
            created_at: now,
            updated_at: now,
            last_enriched: None,
            verified: self.verified,
            batch_id: None,
        }
    }
}

/// Outcome of a single store-write operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Completed,
    Partial,
    Failed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Completed => "completed",
            BatchStatus::Partial => "partial",
            BatchStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(BatchStatus::Completed),
            "partial" => Some(BatchStatus::Partial),
            "failed" => Some(BatchStatus::Failed),
            _ => None,
        }
    }
}

/// Provenance grouping for leads written together in one store operation.
/// Immutable after creation except for `status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadBatch {
    pub id: Uuid,
    pub source: LeadSource,
    pub fetch_date: DateTime<Utc>,
    pub count: i64,
    pub status: BatchStatus,
}

impl LeadBatch {
    pub fn new(source: LeadSource, count: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            fetch_date: Utc::now(),
            count,
            status: BatchStatus::Completed,
        }
    }
}

/// Provider-default query used when a fetch has no caller-supplied criteria
/// (the daily refill path).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchCriteria {
    #[serde(default)]
    pub keywords: Vec<String>,
    pub industry: Option<String>,
    pub location: Option<String>,
}

/// Per-provider operational configuration: activation, priority weight and
/// the credit ledger mutated by the usage tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadSourceConfig {
    pub source: LeadSource,
    pub active: bool,
    /// Positive weight; higher means a larger share of multi-source
    /// allocations.
    pub fetch_priority: f64,
    pub daily_limit: i64,
    pub credits_remaining: i64,
    pub credits_used_today: i64,
    pub target_niches: Vec<String>,
    pub fetch_criteria: FetchCriteria,
    pub last_fetch: Option<DateTime<Utc>>,
}

/// Per-source conversion/open/click aggregates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SourcePerformance {
    pub conversion_rate: f64,
    pub open_rate: f64,
    pub click_rate: f64,
}

/// Denormalized aggregate recomputed wholesale on a debounced trigger after
/// writes. Consumers tolerate staleness up to the debounce window.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeadStats {
    pub total_leads: i64,
    pub leads_per_source: HashMap<LeadSource, i64>,
    pub leads_added_today: i64,
    pub source_performance: HashMap<LeadSource, SourcePerformance>,
    pub computed_at: Option<DateTime<Utc>>,
}

/// Caller-facing query shape for "get me N leads matching criteria".
///
/// `industry` and `location` accept multiple values but only the first
/// element of each is honored by the store query. That asymmetry is a
/// deliberate compatibility constraint, not an oversight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadCriteria {
    pub niche: Option<String>,
    #[serde(default)]
    pub industry: Vec<String>,
    #[serde(default)]
    pub location: Vec<String>,
    pub sources: Option<Vec<LeadSource>>,
    pub min_score: Option<i32>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    10
}

impl Default for LeadCriteria {
    fn default() -> Self {
        Self {
            niche: None,
            industry: Vec::new(),
            location: Vec::new(),
            sources: None,
            min_score: None,
            limit: default_limit(),
        }
    }
}

/// What a single adapter call receives: the caller criteria collapsed to
/// scalar filters plus the allocated per-source limit.
#[derive(Debug, Clone, Default)]
pub struct FetchRequest {
    pub niche: Option<String>,
    pub industry: Option<String>,
    pub location: Option<String>,
    pub limit: usize,
}

impl FetchRequest {
    pub fn from_criteria(criteria: &LeadCriteria, limit: usize) -> Self {
        Self {
            niche: criteria.niche.clone(),
            industry: criteria.industry.first().cloned(),
            location: criteria.location.first().cloned(),
            limit,
        }
    }

    pub fn from_config(config: &LeadSourceConfig, niche: Option<&str>, limit: usize) -> Self {
        Self {
            niche: niche
                .map(str::to_owned)
                .or_else(|| config.fetch_criteria.keywords.first().cloned()),
            industry: config.fetch_criteria.industry.clone(),
            location: config.fetch_criteria.location.clone(),
            limit,
        }
    }
}

// ---------------------------------------------------------------------------
// Row types (runtime sqlx mapping; enums travel as text, nested JSON as jsonb)
// ---------------------------------------------------------------------------

#[derive(Debug, sqlx::FromRow)]
pub struct LeadRow {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub title: Option<String>,
    pub industry: String,
    pub location: String,
    pub niche: String,
    pub source: String,
    pub tags: Vec<String>,
    pub score: i32,
    pub conversion_potential: f64,
    pub engagement_rate: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_enriched: Option<DateTime<Utc>>,
    pub verified: bool,
    pub batch_id: Option<Uuid>,
}

impl LeadRow {
    pub fn into_lead(self) -> Option<Lead> {
        let source = LeadSource::parse(&self.source)?;
        Some(Lead {
            id: self.id,
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            phone: self.phone,
            company: self.company,
            title: self.title,
            industry: self.industry,
            location: self.location,
            niche: self.niche,
            source,
            tags: self.tags.into_iter().collect(),
            score: self.score,
            conversion_potential: self.conversion_potential,
            engagement_rate: self.engagement_rate,
            created_at: self.created_at,
            updated_at: self.updated_at,
            last_enriched: self.last_enriched,
            verified: self.verified,
            batch_id: self.batch_id,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct LeadSourceConfigRow {
    pub source: String,
    pub active: bool,
    pub fetch_priority: f64,
    pub daily_limit: i64,
    pub credits_remaining: i64,
    pub credits_used_today: i64,
    pub target_niches: Vec<String>,
    pub fetch_criteria: Json<FetchCriteria>,
    pub last_fetch: Option<DateTime<Utc>>,
}

impl LeadSourceConfigRow {
    pub fn into_config(self) -> Option<LeadSourceConfig> {
        let source = LeadSource::parse(&self.source)?;
        Some(LeadSourceConfig {
            source,
            active: self.active,
            fetch_priority: self.fetch_priority,
            daily_limit: self.daily_limit,
            credits_remaining: self.credits_remaining,
            credits_used_today: self.credits_used_today,
            target_niches: self.target_niches,
            fetch_criteria: self.fetch_criteria.0,
            last_fetch: self.last_fetch,
        })
    }
}
