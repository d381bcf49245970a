//! Cache and batch semantics of the lead store.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use lead_sourcing_api::models::{BatchStatus, LeadCriteria, LeadSource};
use lead_sourcing_api::store::{LeadRepository, LeadStore};

use common::{sample_new_lead, InMemoryRepository};

fn store_over(repo: Arc<InMemoryRepository>) -> LeadStore {
    LeadStore::new(repo as Arc<dyn LeadRepository>)
}

#[tokio::test]
async fn repeated_queries_hit_the_cache() {
    let repo = Arc::new(InMemoryRepository::new());
    let store = store_over(Arc::clone(&repo));

    let criteria = LeadCriteria {
        niche: Some("fitness".into()),
        ..Default::default()
    };

    store.get_leads(&criteria).await.unwrap();
    store.get_leads(&criteria).await.unwrap();
    store.get_leads(&criteria).await.unwrap();

    assert_eq!(repo.query_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn distinct_criteria_use_distinct_cache_entries() {
    let repo = Arc::new(InMemoryRepository::new());
    let store = store_over(Arc::clone(&repo));

    let a = LeadCriteria {
        niche: Some("fitness".into()),
        ..Default::default()
    };
    let b = LeadCriteria {
        niche: Some("fintech".into()),
        ..Default::default()
    };

    store.get_leads(&a).await.unwrap();
    store.get_leads(&b).await.unwrap();

    assert_eq!(repo.query_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn writes_invalidate_the_whole_cache() {
    let repo = Arc::new(InMemoryRepository::new());
    let store = store_over(Arc::clone(&repo));

    let criteria = LeadCriteria::default();
    store.get_leads(&criteria).await.unwrap();

    store
        .store_leads(vec![sample_new_lead(LeadSource::Apollo, 70)], None)
        .await
        .unwrap();

    let leads = store.get_leads(&criteria).await.unwrap();
    assert_eq!(repo.query_calls.load(Ordering::SeqCst), 2);
    assert_eq!(leads.len(), 1);
}

#[tokio::test]
async fn store_leads_groups_one_batch_per_call() {
    let repo = Arc::new(InMemoryRepository::new());
    let store = store_over(Arc::clone(&repo));

    let leads: Vec<_> = (0..5)
        .map(|i| sample_new_lead(LeadSource::Tiktok, 60 + i))
        .collect();
    let ids = store.store_leads(leads, None).await.unwrap();

    assert_eq!(ids.len(), 5);
    assert_eq!(repo.batches.lock().unwrap().len(), 1);

    let stored = repo.leads.lock().unwrap();
    let batch_ids: Vec<_> = stored.iter().map(|l| l.batch_id).collect();
    assert!(batch_ids.windows(2).all(|w| w[0] == w[1]));
    assert!(batch_ids[0].is_some());
}

#[tokio::test]
async fn failed_insert_marks_the_batch_failed() {
    let repo = Arc::new(InMemoryRepository::new());
    repo.fail_inserts.store(true, Ordering::SeqCst);
    let store = store_over(Arc::clone(&repo));

    let result = store
        .store_leads(vec![sample_new_lead(LeadSource::Apollo, 70)], None)
        .await;

    assert!(result.is_err());
    assert_eq!(repo.batch_statuses(), vec![BatchStatus::Failed]);
    assert_eq!(repo.lead_count(), 0);
}

#[tokio::test]
async fn empty_write_is_a_no_op() {
    let repo = Arc::new(InMemoryRepository::new());
    let store = store_over(Arc::clone(&repo));

    let ids = store.store_leads(Vec::new(), None).await.unwrap();
    assert!(ids.is_empty());
    assert!(repo.batches.lock().unwrap().is_empty());
}

#[tokio::test]
async fn missing_source_config_maps_to_not_found() {
    let repo = Arc::new(InMemoryRepository::new());
    let store = store_over(repo);

    let err = store
        .get_lead_source_config(LeadSource::Instagram)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        lead_sourcing_api::errors::LeadError::ConfigNotFound(LeadSource::Instagram)
    ));
}

#[tokio::test]
async fn first_stats_read_initializes_zeroed_default() {
    let repo = Arc::new(InMemoryRepository::new());
    let store = store_over(Arc::clone(&repo));

    let stats = store.get_lead_stats().await.unwrap();
    assert_eq!(stats.total_leads, 0);
    assert!(repo.stats.lock().unwrap().is_some());
}
