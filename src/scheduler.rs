use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::adapters::SourceAdapter;
use crate::errors::LeadError;
use crate::models::{FetchRequest, LeadSource};
use crate::store::LeadStore;

/// Hard per-source cap for one refill run, independent of how much daily
/// quota remains.
pub const DAILY_FETCH_CAP: i64 = 200;

/// Outcome of one refill run. Sources skipped for exhausted quota appear
/// with a zero count.
#[derive(Debug, Default, Serialize)]
pub struct RefillReport {
    pub total_fetched: usize,
    pub by_source: HashMap<LeadSource, usize>,
}

/// Walks every active source once a day and tops the lead pool up using each
/// source's configured criteria and target niches.
pub struct DailyRefillScheduler {
    store: Arc<LeadStore>,
    adapters: HashMap<LeadSource, Arc<dyn SourceAdapter>>,
}

impl DailyRefillScheduler {
    pub fn new(
        store: Arc<LeadStore>,
        adapters: HashMap<LeadSource, Arc<dyn SourceAdapter>>,
    ) -> Self {
        Self { store, adapters }
    }

    /// One refill pass over all active sources.
    ///
    /// Only the initial source enumeration can fail the run; everything
    /// after is best effort. Each fetched chunk is persisted immediately so
    /// a later source failure cannot lose earlier work.
    pub async fn daily_lead_fetch(&self) -> Result<RefillReport, LeadError> {
        let configs = self.store.get_active_lead_sources().await?;
        tracing::info!("Daily refill starting across {} active sources", configs.len());

        let mut report = RefillReport::default();

        for config in configs {
            let remaining = (config.daily_limit - config.credits_used_today).max(0);
            if remaining == 0 {
                tracing::info!(
                    "Skipping {}: daily quota exhausted ({} used)",
                    config.source,
                    config.credits_used_today
                );
                report.by_source.insert(config.source, 0);
                continue;
            }

            let Some(adapter) = self.adapters.get(&config.source) else {
                tracing::warn!("Active source {} has no registered adapter", config.source);
                report.by_source.insert(config.source, 0);
                continue;
            };

            let fetch_limit = remaining.min(DAILY_FETCH_CAP) as usize;
            let fetched = self
                .refill_source(&config, Arc::clone(adapter), fetch_limit)
                .await;

            report.total_fetched += fetched;
            report.by_source.insert(config.source, fetched);
        }

        tracing::info!("Daily refill finished: {} leads fetched", report.total_fetched);
        Ok(report)
    }

    /// Fetches one source's allotment, split evenly across its target
    /// niches. Failures count as zero for the niche and never abort the
    /// remainder of the run.
    async fn refill_source(
        &self,
        config: &crate::models::LeadSourceConfig,
        adapter: Arc<dyn SourceAdapter>,
        fetch_limit: usize,
    ) -> usize {
        let niches: Vec<Option<&str>> = if config.target_niches.is_empty() {
            vec![None]
        } else {
            config.target_niches.iter().map(|n| Some(n.as_str())).collect()
        };

        let per_niche = fetch_limit / niches.len();
        if per_niche == 0 {
            tracing::info!(
                "Skipping {}: limit {} too small for {} niches",
                config.source,
                fetch_limit,
                niches.len()
            );
            return 0;
        }

        let mut fetched = 0;
        for niche in niches {
            let request = FetchRequest::from_config(config, niche, per_niche);
            match adapter.fetch_leads(&request).await {
                Ok(leads) if leads.is_empty() => {}
                Ok(leads) => {
                    let count = leads.len();
                    match self.store.store_leads(leads, None).await {
                        Ok(_) => fetched += count,
                        Err(e) => {
                            tracing::warn!(
                                "Refill persist failed for {} niche {:?}: {}",
                                config.source,
                                niche,
                                e
                            );
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        "Refill fetch failed for {} niche {:?}: {}",
                        config.source,
                        niche,
                        e
                    );
                }
            }
        }

        fetched
    }
}
