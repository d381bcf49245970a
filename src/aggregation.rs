use std::collections::HashMap;
use std::sync::Arc;

use crate::adapters::SourceAdapter;
use crate::errors::LeadError;
use crate::models::{FetchRequest, Lead, LeadCriteria, LeadSource, LeadSourceConfig, LeadStats};
use crate::store::LeadStore;

/// Every selected source gets at least this many leads of a deficit, so
/// low-priority sources still get a meaningful draw.
pub const MIN_SOURCE_ALLOCATION: usize = 5;

/// Orchestrates "get me N leads matching criteria": store first, then a
/// priority-weighted concurrent fan-out across the active source adapters
/// for any deficit.
///
/// Adapters are injected at construction so tests can substitute fakes.
pub struct LeadAggregationService {
    store: Arc<LeadStore>,
    adapters: HashMap<LeadSource, Arc<dyn SourceAdapter>>,
}

/// Proportional split of a deficit across sources by fetch priority, with
/// the floor applied after rounding.
pub fn allocate_source_limits(
    deficit: usize,
    configs: &[LeadSourceConfig],
) -> Vec<(LeadSource, usize)> {
    let total_priority: f64 = configs.iter().map(|c| c.fetch_priority.max(0.0)).sum();

    configs
        .iter()
        .map(|config| {
            let share = if total_priority > 0.0 {
                (deficit as f64 * config.fetch_priority.max(0.0) / total_priority).round()
                    as usize
            } else {
                deficit / configs.len().max(1)
            };
            (config.source, share.max(MIN_SOURCE_ALLOCATION))
        })
        .collect()
}

impl LeadAggregationService {
    pub fn new(
        store: Arc<LeadStore>,
        adapters: HashMap<LeadSource, Arc<dyn SourceAdapter>>,
    ) -> Self {
        Self { store, adapters }
    }

    /// Returns up to `criteria.limit` leads, ranked by score. Fewer than
    /// requested is a normal outcome, not an error.
    pub async fn get_leads(&self, criteria: &LeadCriteria) -> Result<Vec<Lead>, LeadError> {
        let stored = self.store.get_leads(criteria).await?;
        if stored.len() >= criteria.limit {
            return Ok(stored);
        }

        let deficit = criteria.limit - stored.len();
        tracing::info!(
            "Store returned {} of {} requested leads, fanning out for {}",
            stored.len(),
            criteria.limit,
            deficit
        );

        let fetched = self.fan_out(criteria, deficit).await?;

        let mut combined = stored;
        combined.extend(fetched);
        combined.sort_by(|a, b| b.score.cmp(&a.score));
        combined.truncate(criteria.limit);
        Ok(combined)
    }

    /// Concurrent multi-source fetch for a deficit. A single adapter failure
    /// contributes zero leads and never aborts sibling fetches.
    async fn fan_out(
        &self,
        criteria: &LeadCriteria,
        deficit: usize,
    ) -> Result<Vec<Lead>, LeadError> {
        let mut configs = self.store.get_active_lead_sources().await?;
        if let Some(wanted) = &criteria.sources {
            configs.retain(|c| wanted.contains(&c.source));
        }
        if configs.is_empty() {
            tracing::info!("No active lead sources for fan-out, returning store results only");
            return Ok(Vec::new());
        }

        // Informational ordering; the allocation itself is weight-based
        configs.sort_by(|a, b| {
            b.fetch_priority
                .partial_cmp(&a.fetch_priority)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let allocations = allocate_source_limits(deficit, &configs);

        let mut tasks = Vec::new();
        for (source, limit) in allocations {
            let Some(adapter) = self.adapters.get(&source) else {
                tracing::warn!("Active source {} has no registered adapter", source);
                continue;
            };
            let adapter = Arc::clone(adapter);
            let request = FetchRequest::from_criteria(criteria, limit);
            tasks.push(tokio::spawn(async move {
                (source, adapter.fetch_leads(&request).await)
            }));
        }

        let mut fetched = Vec::new();
        for task in tasks {
            match task.await {
                Ok((_, Ok(leads))) => fetched.extend(leads),
                Ok((source, Err(e))) => {
                    tracing::warn!("Source {} failed during fan-out: {}", source, e);
                }
                Err(e) => {
                    tracing::warn!("Fan-out task panicked: {}", e);
                }
            }
        }

        if fetched.is_empty() {
            return Ok(Vec::new());
        }

        // Persist opportunistically; a write failure must not discard leads
        // already destined for the caller
        match self.store.store_leads(fetched.clone(), None).await {
            Ok(ids) => Ok(fetched
                .into_iter()
                .zip(ids)
                .map(|(lead, id)| {
                    let mut lead = lead.into_unpersisted_lead();
                    lead.id = id;
                    lead
                })
                .collect()),
            Err(e) => {
                tracing::error!("Failed to persist {} fetched leads: {}", fetched.len(), e);
                Ok(fetched
                    .into_iter()
                    .map(|lead| lead.into_unpersisted_lead())
                    .collect())
            }
        }
    }

    pub async fn get_lead_stats(&self) -> Result<LeadStats, LeadError> {
        self.store.get_lead_stats().await
    }

    pub async fn update_lead_source(&self, config: &LeadSourceConfig) -> Result<(), LeadError> {
        self.store.update_lead_source_config(config).await
    }

    pub async fn get_active_lead_sources(&self) -> Result<Vec<LeadSourceConfig>, LeadError> {
        self.store.get_active_lead_sources().await
    }
}
