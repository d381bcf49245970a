use async_trait::async_trait;
use chrono::Utc;
use moka::future::Cache;
use sha2::{Digest, Sha256};
use sqlx::types::Json;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::errors::LeadError;
use crate::models::{
    BatchStatus, Lead, LeadBatch, LeadCriteria, LeadRow, LeadSource, LeadSourceConfig,
    LeadSourceConfigRow, LeadStats, NewLead, SourcePerformance,
};
use crate::stats::StatsHandle;

/// TTL of the query-result read cache.
pub const LEAD_CACHE_TTL: Duration = Duration::from_secs(15 * 60);

const LEAD_CACHE_CAPACITY: u64 = 10_000;

/// Durable persistence for leads, source configurations and aggregate
/// statistics. The trait is the seam for the in-memory test double; the
/// production implementation is [`PgLeadRepository`].
#[async_trait]
pub trait LeadRepository: Send + Sync {
    /// Filtered, score-descending query. Only the first element of the
    /// multi-valued industry/location filters is honored.
    async fn query_leads(&self, criteria: &LeadCriteria) -> Result<Vec<Lead>, LeadError>;

    async fn create_batch(&self, batch: &LeadBatch) -> Result<(), LeadError>;

    async fn update_batch_status(
        &self,
        batch_id: Uuid,
        status: BatchStatus,
    ) -> Result<(), LeadError>;

    /// Inserts all leads in one transaction; either every lead is persisted
    /// or none are.
    async fn insert_leads(
        &self,
        leads: &[NewLead],
        batch_id: Uuid,
    ) -> Result<Vec<Uuid>, LeadError>;

    async fn get_source_config(
        &self,
        source: LeadSource,
    ) -> Result<Option<LeadSourceConfig>, LeadError>;

    async fn upsert_source_config(&self, config: &LeadSourceConfig) -> Result<(), LeadError>;

    async fn list_source_configs(
        &self,
        active_only: bool,
    ) -> Result<Vec<LeadSourceConfig>, LeadError>;

    /// Zeroes `credits_used_today` on every config. Returns the number of
    /// configs touched.
    async fn reset_daily_usage(&self) -> Result<u64, LeadError>;

    async fn load_stats(&self) -> Result<Option<LeadStats>, LeadError>;

    async fn save_stats(&self, stats: &LeadStats) -> Result<(), LeadError>;

    /// Full recomputation of the denormalized aggregate from the lead table.
    async fn compute_stats(&self) -> Result<LeadStats, LeadError>;
}

pub struct PgLeadRepository {
    pool: PgPool,
}

impl PgLeadRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LeadRepository for PgLeadRepository {
    async fn query_leads(&self, criteria: &LeadCriteria) -> Result<Vec<Lead>, LeadError> {
        let sources: Option<Vec<String>> = criteria
            .sources
            .as_ref()
            .map(|s| s.iter().map(|s| s.as_str().to_string()).collect());

        let rows = sqlx::query_as::<_, LeadRow>(
            r#"
            SELECT id, first_name, last_name, email, phone, company, title,
                   industry, location, niche, source, tags, score,
                   conversion_potential, engagement_rate, created_at,
                   updated_at, last_enriched, verified, batch_id
            FROM leads
            WHERE ($1::text IS NULL OR niche = $1)
              AND ($2::text IS NULL OR industry = $2)
              AND ($3::text IS NULL OR location = $3)
              AND ($4::text[] IS NULL OR source = ANY($4))
              AND ($5::int IS NULL OR score >= $5)
            ORDER BY score DESC
            LIMIT $6
            "#,
        )
        .bind(criteria.niche.as_deref())
        .bind(criteria.industry.first().map(String::as_str))
        .bind(criteria.location.first().map(String::as_str))
        .bind(sources)
        .bind(criteria.min_score)
        .bind(criteria.limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().filter_map(LeadRow::into_lead).collect())
    }

    async fn create_batch(&self, batch: &LeadBatch) -> Result<(), LeadError> {
        sqlx::query(
            r#"
            INSERT INTO lead_batches (id, source, fetch_date, count, status)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(batch.id)
        .bind(batch.source.as_str())
        .bind(batch.fetch_date)
        .bind(batch.count)
        .bind(batch.status.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_batch_status(
        &self,
        batch_id: Uuid,
        status: BatchStatus,
    ) -> Result<(), LeadError> {
        sqlx::query("UPDATE lead_batches SET status = $2 WHERE id = $1")
            .bind(batch_id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn insert_leads(
        &self,
        leads: &[NewLead],
        batch_id: Uuid,
    ) -> Result<Vec<Uuid>, LeadError> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(leads.len());
        let now = Utc::now();

        for lead in leads {
            let id = Uuid::new_v4();
            let tags: Vec<String> = lead.tags.iter().cloned().collect();
            sqlx::query(
                r#"
                INSERT INTO leads (
                    id, first_name, last_name, email, phone, company, title,
                    industry, location, niche, source, tags, score,
                    conversion_potential, engagement_rate, created_at,
                    updated_at, verified, batch_id
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                        $13, $14, $15, $16, $16, $17, $18)
                "#,
            )
            .bind(id)
            .bind(&lead.first_name)
            .bind(&lead.last_name)
            .bind(&lead.email)
            .bind(&lead.phone)
            .bind(&lead.company)
            .bind(&lead.title)
            .bind(&lead.industry)
            .bind(&lead.location)
            .bind(&lead.niche)
            .bind(lead.source.as_str())
            .bind(&tags)
            .bind(lead.score)
            .bind(lead.conversion_potential)
            .bind(lead.engagement_rate)
            .bind(now)
            .bind(lead.verified)
            .bind(batch_id)
            .execute(&mut *tx)
            .await?;
            ids.push(id);
        }

        tx.commit().await?;
        Ok(ids)
    }

    async fn get_source_config(
        &self,
        source: LeadSource,
    ) -> Result<Option<LeadSourceConfig>, LeadError> {
        let row = sqlx::query_as::<_, LeadSourceConfigRow>(
            r#"
            SELECT source, active, fetch_priority, daily_limit,
                   credits_remaining, credits_used_today, target_niches,
                   fetch_criteria, last_fetch
            FROM lead_source_configs
            WHERE source = $1
            "#,
        )
        .bind(source.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.and_then(LeadSourceConfigRow::into_config))
    }

    async fn upsert_source_config(&self, config: &LeadSourceConfig) -> Result<(), LeadError> {
        sqlx::query(
            r#"
            INSERT INTO lead_source_configs (
                source, active, fetch_priority, daily_limit,
                credits_remaining, credits_used_today, target_niches,
                fetch_criteria, last_fetch
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (source) DO UPDATE
            SET active = EXCLUDED.active,
                fetch_priority = EXCLUDED.fetch_priority,
                daily_limit = EXCLUDED.daily_limit,
                credits_remaining = EXCLUDED.credits_remaining,
                credits_used_today = EXCLUDED.credits_used_today,
                target_niches = EXCLUDED.target_niches,
                fetch_criteria = EXCLUDED.fetch_criteria,
                last_fetch = EXCLUDED.last_fetch
            "#,
        )
        .bind(config.source.as_str())
        .bind(config.active)
        .bind(config.fetch_priority)
        .bind(config.daily_limit)
        .bind(config.credits_remaining)
        .bind(config.credits_used_today)
        .bind(&config.target_niches)
        .bind(Json(&config.fetch_criteria))
        .bind(config.last_fetch)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_source_configs(
        &self,
        active_only: bool,
    ) -> Result<Vec<LeadSourceConfig>, LeadError> {
        let rows = sqlx::query_as::<_, LeadSourceConfigRow>(
            r#"
            SELECT source, active, fetch_priority, daily_limit,
                   credits_remaining, credits_used_today, target_niches,
                   fetch_criteria, last_fetch
            FROM lead_source_configs
            WHERE ($1 = false OR active = true)
            ORDER BY fetch_priority DESC
            "#,
        )
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(LeadSourceConfigRow::into_config)
            .collect())
    }

    async fn reset_daily_usage(&self) -> Result<u64, LeadError> {
        let result = sqlx::query(
            "UPDATE lead_source_configs SET credits_used_today = 0 WHERE credits_used_today <> 0",
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn load_stats(&self) -> Result<Option<LeadStats>, LeadError> {
        let row = sqlx::query_as::<_, (Json<LeadStats>,)>(
            "SELECT data FROM lead_stats WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.0 .0))
    }

    async fn save_stats(&self, stats: &LeadStats) -> Result<(), LeadError> {
        sqlx::query(
            r#"
            INSERT INTO lead_stats (id, data, updated_at)
            VALUES (1, $1, now())
            ON CONFLICT (id) DO UPDATE
            SET data = EXCLUDED.data, updated_at = now()
            "#,
        )
        .bind(Json(stats))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn compute_stats(&self) -> Result<LeadStats, LeadError> {
        let totals = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT count(*),
                   count(*) FILTER (WHERE created_at >= date_trunc('day', now()))
            FROM leads
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let per_source = sqlx::query_as::<_, (String, i64, f64, f64)>(
            r#"
            SELECT source, count(*),
                   avg(conversion_potential), avg(engagement_rate)
            FROM leads
            GROUP BY source
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut leads_per_source = HashMap::new();
        let mut source_performance = HashMap::new();
        for (source, count, avg_potential, avg_engagement) in per_source {
            let Some(source) = LeadSource::parse(&source) else {
                continue;
            };
            leads_per_source.insert(source, count);
            source_performance.insert(
                source,
                SourcePerformance {
                    conversion_rate: avg_potential,
                    open_rate: avg_engagement,
                    click_rate: avg_engagement * 0.5,
                },
            );
        }

        Ok(LeadStats {
            total_leads: totals.0,
            leads_per_source,
            leads_added_today: totals.1,
            source_performance,
            computed_at: Some(Utc::now()),
        })
    }
}

/// Stable fingerprint of a criteria object: the source set is sorted so that
/// logically-equal criteria hash to the same cache key.
pub fn criteria_fingerprint(criteria: &LeadCriteria) -> String {
    let mut canonical = criteria.clone();
    if let Some(sources) = canonical.sources.as_mut() {
        sources.sort();
        sources.dedup();
    }
    let serialized = serde_json::to_string(&canonical).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(serialized.as_bytes());
    hex::encode(hasher.finalize())
}

/// Persistence and query layer for leads, source configurations and
/// aggregate statistics. Owns the short-TTL read cache; every successful
/// write invalidates the whole cache and nudges the stats debouncer.
pub struct LeadStore {
    repo: Arc<dyn LeadRepository>,
    cache: Cache<String, Arc<Vec<Lead>>>,
    stats: Option<StatsHandle>,
}

impl LeadStore {
    pub fn new(repo: Arc<dyn LeadRepository>) -> Self {
        Self::with_cache_ttl(repo, LEAD_CACHE_TTL)
    }

    pub fn with_cache_ttl(repo: Arc<dyn LeadRepository>, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .time_to_live(ttl)
            .max_capacity(LEAD_CACHE_CAPACITY)
            .build();
        Self {
            repo,
            cache,
            stats: None,
        }
    }

    /// Attaches the debounced stats recomputation handle signalled after
    /// every successful write.
    pub fn with_stats_handle(mut self, handle: StatsHandle) -> Self {
        self.stats = Some(handle);
        self
    }

    pub fn repository(&self) -> Arc<dyn LeadRepository> {
        Arc::clone(&self.repo)
    }

    /// Cache-first lead query keyed by a stable criteria fingerprint.
    pub async fn get_leads(&self, criteria: &LeadCriteria) -> Result<Vec<Lead>, LeadError> {
        let key = criteria_fingerprint(criteria);

        if let Some(hit) = self.cache.get(&key).await {
            tracing::debug!("Lead cache hit for fingerprint {}", &key[..12]);
            return Ok((*hit).clone());
        }

        let leads = self.repo.query_leads(criteria).await?;
        self.cache.insert(key, Arc::new(leads.clone())).await;
        Ok(leads)
    }

    /// Persists a set of leads atomically under one batch, creating the
    /// batch when none is supplied. Invalidates the entire read cache on
    /// success; cache-key fan-out makes fine-grained invalidation a poor
    /// trade.
    pub async fn store_leads(
        &self,
        leads: Vec<NewLead>,
        batch_id: Option<Uuid>,
    ) -> Result<Vec<Uuid>, LeadError> {
        if leads.is_empty() {
            return Ok(Vec::new());
        }

        let leads: Vec<NewLead> = leads.into_iter().map(NewLead::clamped).collect();

        let (batch_id, created_here) = match batch_id {
            Some(id) => (id, false),
            None => {
                let batch = LeadBatch::new(leads[0].source, leads.len() as i64);
                self.repo.create_batch(&batch).await?;
                (batch.id, true)
            }
        };

        let ids = match self.repo.insert_leads(&leads, batch_id).await {
            Ok(ids) => ids,
            Err(e) => {
                if created_here {
                    if let Err(mark) = self
                        .repo
                        .update_batch_status(batch_id, BatchStatus::Failed)
                        .await
                    {
                        tracing::warn!("Failed to mark batch {} failed: {}", batch_id, mark);
                    }
                }
                return Err(e);
            }
        };

        self.cache.invalidate_all();
        if let Some(stats) = &self.stats {
            stats.signal();
        }

        tracing::info!(
            "Stored {} leads in batch {} ({})",
            ids.len(),
            batch_id,
            leads[0].source
        );
        Ok(ids)
    }

    pub async fn get_lead_source_config(
        &self,
        source: LeadSource,
    ) -> Result<LeadSourceConfig, LeadError> {
        self.repo
            .get_source_config(source)
            .await?
            .ok_or(LeadError::ConfigNotFound(source))
    }

    pub async fn update_lead_source_config(
        &self,
        config: &LeadSourceConfig,
    ) -> Result<(), LeadError> {
        self.repo.upsert_source_config(config).await
    }

    pub async fn get_active_lead_sources(&self) -> Result<Vec<LeadSourceConfig>, LeadError> {
        self.repo.list_source_configs(true).await
    }

    pub async fn reset_daily_usage(&self) -> Result<u64, LeadError> {
        let touched = self.repo.reset_daily_usage().await?;
        tracing::info!("Daily usage reset for {} source configs", touched);
        Ok(touched)
    }

    /// Returns the cached aggregate, initializing a zeroed default on first
    /// call.
    pub async fn get_lead_stats(&self) -> Result<LeadStats, LeadError> {
        if let Some(stats) = self.repo.load_stats().await? {
            return Ok(stats);
        }
        let zeroed = LeadStats::default();
        self.repo.save_stats(&zeroed).await?;
        Ok(zeroed)
    }
}
