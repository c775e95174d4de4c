use std::sync::Arc;

use axum::Router;
use packwarden_core::catalogue::fake::FakeCatalogueStore;
use packwarden_core::{CacheSize, CatalogueStore, JobCache, RuleSnapshotService};
use packwarden_server::config::Config;
use packwarden_server::state::AppState;

#[allow(dead_code)]
pub fn test_config() -> Config {
    Config {
        db_url: "postgres://unused/test".to_string(),
        db_connection_pool_persistent_size: 1,
        db_connection_pool_max_size: 1,
        job_timeout_secs: 120,
        job_cache_size: 0,
        reporter_url: "https://observations.test".to_string(),
        github_token: packwarden_core::rules::TEST_TOKEN.to_string(),
        rules_repository: "vipyrsec/security-intelligence".to_string(),
        pypi_api_url: "https://pypi.test/pypi".to_string(),
        auth0_domain: None,
        auth0_audience: None,
        log_config_file: None,
        score_threshold: 5,
        server_host: "127.0.0.1".to_string(),
        server_port: 0,
        sentry_dsn: None,
        sentry_environment: None,
    }
}

#[allow(dead_code)]
pub async fn test_state_with_cache(cache_size: i64) -> AppState {
    let store: Arc<dyn CatalogueStore> = Arc::new(FakeCatalogueStore::new());
    let mut config = test_config();
    config.job_cache_size = cache_size;

    let http = reqwest::Client::new();
    let rules = Arc::new(RuleSnapshotService::new(http.clone(), config.rules_repository.clone(), config.github_token.clone()));
    rules.refresh().await.expect("test token short-circuits fetch");

    let cache = Arc::new(JobCache::new(
        store.clone(),
        CacheSize::from_configured(config.job_cache_size),
        chrono::Duration::seconds(config.job_timeout_secs),
    ));

    AppState { store, cache, rules, http, config: Arc::new(config) }
}

#[allow(dead_code)]
pub async fn test_state() -> AppState {
    test_state_with_cache(0).await
}

#[allow(dead_code)]
pub fn test_app(state: AppState) -> Router {
    packwarden_server::routes::create_router(state)
}
