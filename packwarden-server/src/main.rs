//! # packwarden-server
//!
//! HTTP boundary for the scan coordination core of a distributed
//! malware-scanning service. Workers request jobs, download and analyze
//! package distributions against a versioned YARA rule set, and return
//! verdicts; this binary turns that stream of requests into exactly-once
//! verdicts while tolerating worker crashes, rule-set rotations, and
//! duplicate submissions.
//!
//! See `packwarden-core` for the domain model, catalogue store, rule
//! snapshot, and job cache this binary wires together.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use packwarden_core::{CacheSize, CatalogueStore, JobCache, PostgresCatalogueStore, RuleSnapshotService};
use packwarden_server::config::Config;
use packwarden_server::state::AppState;
use packwarden_server::{background, routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "packwarden_server=info,packwarden_core=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.db_connection_pool_max_size)
        .min_connections(config.db_connection_pool_persistent_size)
        .connect(&config.db_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("database migrations applied");

    let store: Arc<dyn CatalogueStore> = Arc::new(PostgresCatalogueStore::new(pool));

    let http = reqwest::Client::builder().build()?;

    let rules = Arc::new(RuleSnapshotService::new(http.clone(), config.rules_repository.clone(), config.github_token.clone()));
    match rules.refresh().await {
        Ok(snapshot) => {
            store.upsert_rule_names(&snapshot.rules.keys().cloned().collect::<Vec<_>>()).await?;
            info!(commit = %snapshot.commit_hash, rule_count = snapshot.rules.len(), "initial rule snapshot loaded");
        }
        Err(err) => warn!(error = %err, "initial rule snapshot fetch failed, starting with an empty snapshot"),
    }

    let cache = Arc::new(JobCache::new(
        store.clone(),
        CacheSize::from_configured(config.job_cache_size),
        chrono::Duration::seconds(config.job_timeout_secs),
    ));

    let config = Arc::new(config);
    let state = AppState { store, cache, rules, http, config: config.clone() };

    background::spawn_rule_refresh_loop(state.clone());
    background::spawn_cache_reaper_loop(state.clone());

    let router = routes::create_router(state);

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr, "packwarden-server listening");

    axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
