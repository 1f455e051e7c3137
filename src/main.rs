use insurance_proposals_api::{
    config::Config,
    db::Database,
    db_storage::PgStore,
    handlers::{self, AppState},
    services::{ProposalService, ServiceSettings},
    store::{GuardedStore, PlanStore, ProposalStore},
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the application.
///
/// Initializes tracing, loads configuration, connects to PostgreSQL and
/// applies the schema, wires the guarded store into the proposal service,
/// then starts the Axum server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "insurance_proposals_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize database connection pool
    let db = Database::new(&config.database_url).await?;
    tracing::info!("Database connection pool established");
    db.migrate().await?;

    // Every store call gets a timeout and goes through the circuit breaker
    let store = Arc::new(GuardedStore::new(
        PgStore::new(db.pool.clone()),
        Duration::from_millis(config.store_timeout_ms),
    ));
    let proposals: Arc<dyn ProposalStore> = store.clone();
    let plans: Arc<dyn PlanStore> = store;

    let service = ProposalService::new(proposals, plans, ServiceSettings::from(&config));
    tracing::info!(
        "Proposal service ready (policy: {:?}, plan cache TTL: {}s)",
        config.transition_policy,
        config.plan_cache_ttl_secs
    );

    let app_state = Arc::new(AppState {
        config: config.clone(),
        proposals: service,
    });
    let app = handlers::router(app_state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
