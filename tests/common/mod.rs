//! Shared fixtures: an in-memory repository double, a programmable source
//! adapter and recording sinks.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use lead_sourcing_api::errors::LeadError;
use lead_sourcing_api::models::{
    BatchStatus, FetchCriteria, FetchRequest, Lead, LeadBatch, LeadCriteria, LeadSource,
    LeadSourceConfig, LeadStats, NewLead, SourcePerformance,
};
use lead_sourcing_api::store::LeadRepository;
use lead_sourcing_api::usage::{AlertSink, ApiLimitAlert, UsageSink};

pub fn sample_new_lead(source: LeadSource, score: i32) -> NewLead {
    NewLead {
        first_name: "Test".into(),
        last_name: "Lead".into(),
        email: format!("lead{}@example.com", score),
        phone: None,
        company: None,
        title: None,
        industry: "fitness".into(),
        location: "Austin".into(),
        niche: "fitness".into(),
        source,
        tags: BTreeSet::new(),
        score,
        conversion_potential: 0.5,
        engagement_rate: 0.0,
        verified: false,
    }
}

pub fn source_config(source: LeadSource, priority: f64) -> LeadSourceConfig {
    LeadSourceConfig {
        source,
        active: true,
        fetch_priority: priority,
        daily_limit: 100,
        credits_remaining: 100,
        credits_used_today: 0,
        target_niches: Vec::new(),
        fetch_criteria: FetchCriteria::default(),
        last_fetch: None,
    }
}

/// In-memory [`LeadRepository`] honoring the same filter semantics as the
/// Postgres implementation, with call counters for cache assertions.
#[derive(Default)]
pub struct InMemoryRepository {
    pub leads: Mutex<Vec<Lead>>,
    pub batches: Mutex<Vec<LeadBatch>>,
    pub configs: Mutex<HashMap<LeadSource, LeadSourceConfig>>,
    pub stats: Mutex<Option<LeadStats>>,
    pub query_calls: AtomicUsize,
    pub compute_calls: AtomicUsize,
    pub fail_inserts: AtomicBool,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_configs(configs: Vec<LeadSourceConfig>) -> Self {
        let repo = Self::default();
        {
            let mut map = repo.configs.lock().unwrap();
            for config in configs {
                map.insert(config.source, config);
            }
        }
        repo
    }

    pub fn lead_count(&self) -> usize {
        self.leads.lock().unwrap().len()
    }

    pub fn batch_statuses(&self) -> Vec<BatchStatus> {
        self.batches.lock().unwrap().iter().map(|b| b.status).collect()
    }
}

#[async_trait]
impl LeadRepository for InMemoryRepository {
    async fn query_leads(&self, criteria: &LeadCriteria) -> Result<Vec<Lead>, LeadError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);

        let industry = criteria.industry.first();
        let location = criteria.location.first();

        let mut matched: Vec<Lead> = self
            .leads
            .lock()
            .unwrap()
            .iter()
            .filter(|lead| {
                criteria
                    .niche
                    .as_ref()
                    .map_or(true, |n| &lead.niche == n)
                    && industry.map_or(true, |i| &lead.industry == i)
                    && location.map_or(true, |l| &lead.location == l)
                    && criteria
                        .sources
                        .as_ref()
                        .map_or(true, |s| s.contains(&lead.source))
                    && criteria.min_score.map_or(true, |m| lead.score >= m)
            })
            .cloned()
            .collect();

        matched.sort_by(|a, b| b.score.cmp(&a.score));
        matched.truncate(criteria.limit);
        Ok(matched)
    }

    async fn create_batch(&self, batch: &LeadBatch) -> Result<(), LeadError> {
        self.batches.lock().unwrap().push(batch.clone());
        Ok(())
    }

    async fn update_batch_status(
        &self,
        batch_id: Uuid,
        status: BatchStatus,
    ) -> Result<(), LeadError> {
        let mut batches = self.batches.lock().unwrap();
        if let Some(batch) = batches.iter_mut().find(|b| b.id == batch_id) {
            batch.status = status;
        }
        Ok(())
    }

    async fn insert_leads(
        &self,
        leads: &[NewLead],
        batch_id: Uuid,
    ) -> Result<Vec<Uuid>, LeadError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(LeadError::Internal("simulated insert failure".into()));
        }

        let now = Utc::now();
        let mut stored = self.leads.lock().unwrap();
        let mut ids = Vec::with_capacity(leads.len());
        for lead in leads {
            let id = Uuid::new_v4();
            stored.push(Lead {
                id,
                first_name: lead.first_name.clone(),
                last_name: lead.last_name.clone(),
                email: lead.email.clone(),
                phone: lead.phone.clone(),
                company: lead.company.clone(),
                title: lead.title.clone(),
                industry: lead.industry.clone(),
                location: lead.location.clone(),
                niche: lead.niche.clone(),
                source: lead.source,
                tags: lead.tags.clone(),
                score: lead.score,
                conversion_potential: lead.conversion_potential,
                engagement_rate: lead.engagement_rate,
                created_at: now,
                updated_at: now,
                last_enriched: None,
                verified: lead.verified,
                batch_id: Some(batch_id),
            });
            ids.push(id);
        }
        Ok(ids)
    }

    async fn get_source_config(
        &self,
        source: LeadSource,
    ) -> Result<Option<LeadSourceConfig>, LeadError> {
        Ok(self.configs.lock().unwrap().get(&source).cloned())
    }

    async fn upsert_source_config(&self, config: &LeadSourceConfig) -> Result<(), LeadError> {
        self.configs
            .lock()
            .unwrap()
            .insert(config.source, config.clone());
        Ok(())
    }

    async fn list_source_configs(
        &self,
        active_only: bool,
    ) -> Result<Vec<LeadSourceConfig>, LeadError> {
        let mut configs: Vec<LeadSourceConfig> = self
            .configs
            .lock()
            .unwrap()
            .values()
            .filter(|c| !active_only || c.active)
            .cloned()
            .collect();
        configs.sort_by(|a, b| {
            b.fetch_priority
                .partial_cmp(&a.fetch_priority)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(configs)
    }

    async fn reset_daily_usage(&self) -> Result<u64, LeadError> {
        let mut touched = 0;
        for config in self.configs.lock().unwrap().values_mut() {
            if config.credits_used_today != 0 {
                config.credits_used_today = 0;
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn load_stats(&self) -> Result<Option<LeadStats>, LeadError> {
        Ok(self.stats.lock().unwrap().clone())
    }

    async fn save_stats(&self, stats: &LeadStats) -> Result<(), LeadError> {
        *self.stats.lock().unwrap() = Some(stats.clone());
        Ok(())
    }

    async fn compute_stats(&self) -> Result<LeadStats, LeadError> {
        self.compute_calls.fetch_add(1, Ordering::SeqCst);

        let leads = self.leads.lock().unwrap();
        let mut leads_per_source = HashMap::new();
        let mut source_performance = HashMap::new();
        for lead in leads.iter() {
            *leads_per_source.entry(lead.source).or_insert(0) += 1;
            source_performance
                .entry(lead.source)
                .or_insert(SourcePerformance::default());
        }

        Ok(LeadStats {
            total_leads: leads.len() as i64,
            leads_per_source,
            leads_added_today: leads.len() as i64,
            source_performance,
            computed_at: Some(Utc::now()),
        })
    }
}

/// Programmable adapter: records every request it receives and either fails
/// or yields the requested number of sample leads, capped at `max_yield`.
pub struct FakeAdapter {
    source: LeadSource,
    max_yield: usize,
    fail: AtomicBool,
    pub requests: Mutex<Vec<FetchRequest>>,
}

impl FakeAdapter {
    pub fn new(source: LeadSource) -> Self {
        Self {
            source,
            max_yield: usize::MAX,
            fail: AtomicBool::new(false),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_max_yield(source: LeadSource, max_yield: usize) -> Self {
        Self {
            max_yield,
            ..Self::new(source)
        }
    }

    pub fn failing(source: LeadSource) -> Self {
        let adapter = Self::new(source);
        adapter.fail.store(true, Ordering::SeqCst);
        adapter
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl lead_sourcing_api::adapters::SourceAdapter for FakeAdapter {
    fn source(&self) -> LeadSource {
        self.source
    }

    async fn fetch_leads(&self, request: &FetchRequest) -> Result<Vec<NewLead>, LeadError> {
        self.requests.lock().unwrap().push(request.clone());

        if self.fail.load(Ordering::SeqCst) {
            return Err(LeadError::provider(self.source, "simulated outage"));
        }

        let count = request.limit.min(self.max_yield);
        Ok((0..count)
            .map(|i| sample_new_lead(self.source, 50 + (i % 50) as i32))
            .collect())
    }
}

/// Captures alerts for assertions instead of delivering them anywhere.
#[derive(Default)]
pub struct RecordingAlertSink {
    pub alerts: Mutex<Vec<ApiLimitAlert>>,
}

impl RecordingAlertSink {
    pub fn alert_count(&self) -> usize {
        self.alerts.lock().unwrap().len()
    }
}

#[async_trait]
impl AlertSink for RecordingAlertSink {
    async fn create_alert(&self, alert: ApiLimitAlert) -> Result<(), LeadError> {
        self.alerts.lock().unwrap().push(alert);
        Ok(())
    }
}

/// Usage sink that accepts and discards every report.
pub struct NoopUsageSink;

#[async_trait]
impl UsageSink for NoopUsageSink {
    async fn track(
        &self,
        _source: LeadSource,
        _credits_used: i64,
        _credential_ref: &str,
    ) -> Result<(), LeadError> {
        Ok(())
    }
}
