//! Dispatch service (spec.md §4.D): hands out up to `batch` jobs per
//! request, transitioning QUEUED/expired-PENDING scans to PENDING.

use chrono::Utc;
use tracing::info;

use crate::api_types::JobDescriptor;
use crate::auth::AuthSubject;
use crate::state::AppState;
use packwarden_core::CoreResult;

/// Returns up to `batch` job descriptors. Each descriptor's `hash` equals
/// the rule snapshot's current commit hash at the moment of the call.
pub async fn request_jobs(state: &AppState, auth: &AuthSubject, batch: u32) -> CoreResult<Vec<JobDescriptor>> {
    let scans = if state.cache.enabled() {
        let mut acquired = Vec::with_capacity(batch as usize);
        for _ in 0..batch {
            match state.cache.acquire(auth.as_str()).await? {
                Some(scan) => acquired.push(scan),
                None => break,
            }
        }
        acquired
    } else {
        let now = Utc::now();
        state.store.lease_jobs(batch, auth.as_str(), now, state.job_timeout()).await?
    };

    if !scans.is_empty() {
        info!(count = scans.len(), leaseholder = auth.as_str(), "dispatched jobs");
    }

    let hash = state.rules.current().await.commit_hash.clone();
    Ok(scans
        .into_iter()
        .map(|scan| JobDescriptor {
            name: scan.name,
            version: scan.version,
            distributions: scan.download_urls,
            hash: hash.clone(),
        })
        .collect())
}

/// `RequestJob`: equivalent to `RequestJobs(auth, 1)` collapsed to a single
/// optional descriptor, for legacy callers.
pub async fn request_job(state: &AppState, auth: &AuthSubject) -> CoreResult<Option<JobDescriptor>> {
    Ok(request_jobs(state, auth, 1).await?.into_iter().next())
}

#[cfg(test)]
mod tests {
    use super::*;
    use packwarden_core::catalogue::fake::FakeCatalogueStore;
    use packwarden_core::{CacheSize, JobCache};
    use std::sync::Arc;

    async fn state_with(cache: CacheSize) -> AppState {
        let store: Arc<dyn packwarden_core::CatalogueStore> = Arc::new(FakeCatalogueStore::new());
        let config = Arc::new(crate::config::Config {
            db_url: "postgres://unused/test".into(),
            db_connection_pool_persistent_size: 1,
            db_connection_pool_max_size: 1,
            job_timeout_secs: 120,
            job_cache_size: 0,
            reporter_url: "https://observations.test".into(),
            github_token: packwarden_core::rules::TEST_TOKEN.to_string(),
            rules_repository: "vipyrsec/security-intelligence".into(),
            pypi_api_url: "https://pypi.test/pypi".into(),
            auth0_domain: None,
            auth0_audience: None,
            log_config_file: None,
            score_threshold: 5,
            server_host: "127.0.0.1".into(),
            server_port: 0,
            sentry_dsn: None,
            sentry_environment: None,
        });
        let http = reqwest::Client::new();
        let rules = Arc::new(packwarden_core::RuleSnapshotService::new(
            http.clone(),
            config.rules_repository.clone(),
            config.github_token.clone(),
        ));
        rules.refresh().await.expect("test token short-circuits fetch");
        let job_cache = Arc::new(JobCache::new(store.clone(), cache, chrono::Duration::seconds(config.job_timeout_secs)));
        AppState { store, cache: job_cache, rules, http, config }
    }

    #[tokio::test]
    async fn no_scans_returns_empty_batch() {
        let state = state_with(CacheSize::Disabled).await;
        let jobs = request_jobs(&state, &AuthSubject("worker-1".into()), 5).await.unwrap();
        assert!(jobs.is_empty());
    }

    #[tokio::test]
    async fn leases_queued_scans_without_cache() {
        let state = state_with(CacheSize::Disabled).await;
        state.store.insert_scan("pkg", "1.0", "queuer", vec!["https://example.test/pkg-1.0.tar.gz".into()]).await.unwrap();

        let jobs = request_jobs(&state, &AuthSubject("worker-1".into()), 5).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].name, "pkg");
        assert_eq!(jobs[0].distributions, vec!["https://example.test/pkg-1.0.tar.gz".to_string()]);
    }

    #[tokio::test]
    async fn request_job_collapses_to_one() {
        let state = state_with(CacheSize::Disabled).await;
        state.store.insert_scan("pkg", "1.0", "queuer", vec![]).await.unwrap();
        state.store.insert_scan("pkg", "2.0", "queuer", vec![]).await.unwrap();

        let job = request_job(&state, &AuthSubject("worker-1".into())).await.unwrap();
        assert!(job.is_some());
    }
}
