use axum::{
    routing::{get, post, put},
    Router,
};
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lead_sourcing_api::adapters::{
    ApolloAdapter, GoogleMapsAdapter, InstagramAdapter, LinkedinAdapter, SourceAdapter,
    TiktokAdapter,
};
use lead_sourcing_api::aggregation::LeadAggregationService;
use lead_sourcing_api::config::Config;
use lead_sourcing_api::db::Database;
use lead_sourcing_api::handlers::{self, AppState};
use lead_sourcing_api::models::LeadSource;
use lead_sourcing_api::scheduler::DailyRefillScheduler;
use lead_sourcing_api::stats::{spawn_stats_worker, STATS_DEBOUNCE_WINDOW};
use lead_sourcing_api::store::{LeadStore, PgLeadRepository};
use lead_sourcing_api::usage::{AlertSink, LogAlertSink, UsageSink, UsageTracker, WebhookAlertSink};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lead_sourcing_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let db = Database::new(&config.database_url).await?;
    tracing::info!("Database connection pool established");

    let repo = Arc::new(PgLeadRepository::new(db.pool.clone()));
    let stats_handle = spawn_stats_worker(repo.clone(), STATS_DEBOUNCE_WINDOW);
    let store = Arc::new(LeadStore::new(repo).with_stats_handle(stats_handle));

    let alerts: Arc<dyn AlertSink> = match &config.alert_webhook_url {
        Some(url) => Arc::new(WebhookAlertSink::new(url.clone())?),
        None => Arc::new(LogAlertSink),
    };
    let usage: Arc<dyn UsageSink> = Arc::new(UsageTracker::new(Arc::clone(&store), alerts));

    let mut adapters: HashMap<LeadSource, Arc<dyn SourceAdapter>> = HashMap::new();
    adapters.insert(
        LeadSource::Apollo,
        Arc::new(ApolloAdapter::new(&config, Arc::clone(&usage))?),
    );
    adapters.insert(
        LeadSource::Linkedin,
        Arc::new(LinkedinAdapter::new(&config, Arc::clone(&usage))?),
    );
    adapters.insert(
        LeadSource::Instagram,
        Arc::new(InstagramAdapter::new(&config, Arc::clone(&usage))?),
    );
    adapters.insert(
        LeadSource::Tiktok,
        Arc::new(TiktokAdapter::new(&config, Arc::clone(&usage))?),
    );
    adapters.insert(
        LeadSource::GoogleMaps,
        Arc::new(GoogleMapsAdapter::new(&config, Arc::clone(&usage))?),
    );
    tracing::info!("{} source adapters registered", adapters.len());

    let aggregation = Arc::new(LeadAggregationService::new(
        Arc::clone(&store),
        adapters.clone(),
    ));
    let scheduler = Arc::new(DailyRefillScheduler::new(Arc::clone(&store), adapters));

    spawn_midnight_refill(Arc::clone(&store), Arc::clone(&scheduler));

    let app_state = AppState {
        store,
        aggregation,
        scheduler,
    };

    // Rate limiter: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .unwrap(),
    );

    let protected_routes = Router::new()
        .route("/api/v1/leads", get(handlers::get_leads))
        .route("/api/v1/leads/stats", get(handlers::get_lead_stats))
        .route("/api/v1/sources", get(handlers::list_sources))
        .route("/api/v1/sources/:source", put(handlers::update_source))
        .route(
            "/api/v1/jobs/daily-refill",
            post(handlers::trigger_daily_refill),
        )
        .layer(
            ServiceBuilder::new()
                // 1MB is generous for config update payloads
                .layer(RequestBodyLimitLayer::new(1024 * 1024))
                .layer(GovernorLayer {
                    config: governor_conf,
                }),
        );

    // Health check bypasses rate limiting so orchestrator probes never 429
    let app = Router::new()
        .route("/health", get(handlers::health_check))
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Background job: at every UTC midnight, zero the per-source daily usage
/// counters and run one refill pass.
fn spawn_midnight_refill(store: Arc<LeadStore>, scheduler: Arc<DailyRefillScheduler>) {
    tokio::spawn(async move {
        loop {
            let now = Utc::now();
            let next_midnight = (now + ChronoDuration::days(1))
                .date_naive()
                .and_hms_opt(0, 0, 0)
                .expect("midnight is always a valid time")
                .and_utc();
            let wait = (next_midnight - now)
                .to_std()
                .unwrap_or_else(|_| std::time::Duration::from_secs(60));

            tracing::info!("Next daily refill scheduled in {}s", wait.as_secs());
            tokio::time::sleep(wait).await;

            if let Err(e) = store.reset_daily_usage().await {
                tracing::error!("Daily usage reset failed: {}", e);
            }

            match scheduler.daily_lead_fetch().await {
                Ok(report) => {
                    tracing::info!(
                        "Scheduled refill fetched {} leads across {} sources",
                        report.total_fetched,
                        report.by_source.len()
                    );
                }
                Err(e) => {
                    tracing::error!("Scheduled refill failed: {}", e);
                }
            }
        }
    });
}
