//! Aggregation fan-out behavior against the in-memory repository double.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use lead_sourcing_api::adapters::SourceAdapter;
use lead_sourcing_api::aggregation::LeadAggregationService;
use lead_sourcing_api::models::{LeadCriteria, LeadSource};
use lead_sourcing_api::store::{LeadRepository, LeadStore};

use common::{sample_new_lead, source_config, FakeAdapter, InMemoryRepository};

fn service_with(
    repo: Arc<InMemoryRepository>,
    adapters: Vec<Arc<FakeAdapter>>,
) -> LeadAggregationService {
    let store = Arc::new(LeadStore::new(repo as Arc<dyn LeadRepository>));
    let adapters: HashMap<LeadSource, Arc<dyn SourceAdapter>> = adapters
        .into_iter()
        .map(|a| (a.source(), a as Arc<dyn SourceAdapter>))
        .collect();
    LeadAggregationService::new(store, adapters)
}

#[tokio::test]
async fn cold_store_fans_out_to_single_source() {
    let repo = Arc::new(InMemoryRepository::with_configs(vec![source_config(
        LeadSource::Apollo,
        1.0,
    )]));
    let adapter = Arc::new(FakeAdapter::new(LeadSource::Apollo));
    let service = service_with(Arc::clone(&repo), vec![Arc::clone(&adapter)]);

    let criteria = LeadCriteria::default();
    let leads = service.get_leads(&criteria).await.unwrap();

    assert_eq!(adapter.request_count(), 1);
    let request = adapter.requests.lock().unwrap()[0].clone();
    assert!(request.limit >= 5);
    assert!(!leads.is_empty());
    assert!(leads.len() <= criteria.limit);
    // Fetched leads were persisted as a side effect
    assert!(repo.lead_count() > 0);
}

#[tokio::test]
async fn satisfied_limit_never_touches_adapters() {
    let repo = Arc::new(InMemoryRepository::with_configs(vec![source_config(
        LeadSource::Apollo,
        1.0,
    )]));
    let seed: Vec<_> = (0..10)
        .map(|i| sample_new_lead(LeadSource::Apollo, 60 + i))
        .collect();
    repo.insert_leads(&seed, uuid::Uuid::new_v4()).await.unwrap();

    let adapter = Arc::new(FakeAdapter::new(LeadSource::Apollo));
    let service = service_with(repo, vec![Arc::clone(&adapter)]);

    let leads = service.get_leads(&LeadCriteria::default()).await.unwrap();

    assert_eq!(leads.len(), 10);
    assert_eq!(adapter.request_count(), 0);
}

#[tokio::test]
async fn one_failing_source_does_not_abort_the_rest() {
    let repo = Arc::new(InMemoryRepository::with_configs(vec![
        source_config(LeadSource::Apollo, 1.0),
        source_config(LeadSource::Linkedin, 1.0),
        source_config(LeadSource::Tiktok, 1.0),
    ]));
    let healthy_a = Arc::new(FakeAdapter::new(LeadSource::Apollo));
    let failing = Arc::new(FakeAdapter::failing(LeadSource::Linkedin));
    let healthy_b = Arc::new(FakeAdapter::new(LeadSource::Tiktok));
    let service = service_with(
        repo,
        vec![
            Arc::clone(&healthy_a),
            Arc::clone(&failing),
            Arc::clone(&healthy_b),
        ],
    );

    let leads = service.get_leads(&LeadCriteria::default()).await.unwrap();

    assert_eq!(failing.request_count(), 1);
    assert!(!leads.is_empty());
    assert!(leads.iter().all(|l| l.source != LeadSource::Linkedin));
}

#[tokio::test]
async fn no_active_sources_returns_store_results_only() {
    let repo = Arc::new(InMemoryRepository::new());
    let service = service_with(repo, vec![]);

    let leads = service.get_leads(&LeadCriteria::default()).await.unwrap();
    assert!(leads.is_empty());
}

#[tokio::test]
async fn criteria_source_filter_restricts_fan_out() {
    let repo = Arc::new(InMemoryRepository::with_configs(vec![
        source_config(LeadSource::Apollo, 1.0),
        source_config(LeadSource::Tiktok, 1.0),
    ]));
    let apollo = Arc::new(FakeAdapter::new(LeadSource::Apollo));
    let tiktok = Arc::new(FakeAdapter::new(LeadSource::Tiktok));
    let service = service_with(repo, vec![Arc::clone(&apollo), Arc::clone(&tiktok)]);

    let criteria = LeadCriteria {
        sources: Some(vec![LeadSource::Tiktok]),
        ..Default::default()
    };
    let leads = service.get_leads(&criteria).await.unwrap();

    assert_eq!(apollo.request_count(), 0);
    assert_eq!(tiktok.request_count(), 1);
    assert!(leads.iter().all(|l| l.source == LeadSource::Tiktok));
}

#[tokio::test]
async fn results_are_score_descending_and_truncated() {
    let repo = Arc::new(InMemoryRepository::with_configs(vec![source_config(
        LeadSource::Apollo,
        1.0,
    )]));
    let seed: Vec<_> = (0..4)
        .map(|i| sample_new_lead(LeadSource::GoogleMaps, 90 - i * 10))
        .collect();
    repo.insert_leads(&seed, uuid::Uuid::new_v4()).await.unwrap();

    let adapter = Arc::new(FakeAdapter::new(LeadSource::Apollo));
    let service = service_with(repo, vec![adapter]);

    let criteria = LeadCriteria {
        limit: 8,
        ..Default::default()
    };
    let leads = service.get_leads(&criteria).await.unwrap();

    assert!(leads.len() <= 8);
    assert!(leads.windows(2).all(|w| w[0].score >= w[1].score));
}
