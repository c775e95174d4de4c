//! Ingestion service (spec.md §4.E): accepts verdicts, reconciles matched
//! rule names against the rule catalogue, and finalizes scan state.

use chrono::Utc;
use tracing::info;

use crate::auth::AuthSubject;
use crate::state::AppState;
use packwarden_core::domain::{ScanStatus, Verdict};
use packwarden_core::{CoreError, CoreResult};

/// Accepts a verdict. When the job cache is enabled the write is deferred
/// to the cache's result batch and this returns as soon as it's buffered
/// ("accepted"); the NotFound/Conflict checks below only run on the direct
/// (uncached) path, matching spec.md §4.C/§4.E.
pub async fn submit_verdict(state: &AppState, auth: &AuthSubject, verdict: Verdict) -> CoreResult<()> {
    if state.cache.enabled() {
        state.cache.submit(verdict).await?;
        return Ok(());
    }

    let name = verdict.name().to_string();
    let version = verdict.version().to_string();

    let scan = state
        .store
        .get_by_name_version(&name, &version)
        .await?
        .ok_or_else(|| CoreError::not_found(format!("scan {name}@{version} not found")))?;

    if scan.status == ScanStatus::Finished {
        return Err(CoreError::conflict(format!("scan {name}@{version} is already finished")));
    }

    let now = Utc::now();
    match &verdict {
        Verdict::Success(success) => {
            state.store.finalize_success(scan.scan_id, success, auth.as_str(), now).await?;
            info!(name, version, score = success.score, "scan finished");
        }
        Verdict::Failure(failure) => {
            state.store.finalize_failure(scan.scan_id, &failure.reason, auth.as_str(), now).await?;
            info!(name, version, reason = failure.reason, "scan failed");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use packwarden_core::catalogue::fake::FakeCatalogueStore;
    use packwarden_core::domain::{FailureVerdict, SuccessVerdict};
    use packwarden_core::{CacheSize, JobCache};
    use std::sync::Arc;

    async fn state() -> AppState {
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
        let cache = Arc::new(JobCache::new(store.clone(), CacheSize::Disabled, chrono::Duration::seconds(config.job_timeout_secs)));
        AppState { store, cache, rules, http, config }
    }

    #[tokio::test]
    async fn unknown_scan_is_not_found() {
        let state = state().await;
        let verdict = Verdict::Failure(FailureVerdict { name: "pkg".into(), version: "1.0".into(), reason: "nope".into() });

        let err = submit_verdict(&state, &AuthSubject("worker-1".into()), verdict).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn success_finalizes_scan() {
        let state = state().await;
        state.store.insert_scan("pkg", "1.0", "queuer", vec![]).await.unwrap();

        let verdict = Verdict::Success(SuccessVerdict {
            name: "pkg".into(),
            version: "1.0".into(),
            commit: "abc123".into(),
            score: 9,
            inspector_url: Some("https://inspector.test/pkg/1.0".into()),
            rules_matched: vec!["suspicious-network-call".into()],
        });

        submit_verdict(&state, &AuthSubject("worker-1".into()), verdict).await.unwrap();

        let scan = state.store.get_by_name_version("pkg", "1.0").await.unwrap().unwrap();
        assert_eq!(scan.status, ScanStatus::Finished);
        assert_eq!(scan.score, Some(9));
    }

    #[tokio::test]
    async fn double_finalize_success_conflicts() {
        let state = state().await;
        state.store.insert_scan("pkg", "1.0", "queuer", vec![]).await.unwrap();

        let verdict = Verdict::Success(SuccessVerdict {
            name: "pkg".into(),
            version: "1.0".into(),
            commit: "abc123".into(),
            score: 9,
            inspector_url: Some("https://inspector.test/pkg/1.0".into()),
            rules_matched: vec![],
        });
        submit_verdict(&state, &AuthSubject("worker-1".into()), verdict.clone()).await.unwrap();

        let err = submit_verdict(&state, &AuthSubject("worker-1".into()), verdict).await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn duplicate_failure_is_accepted_as_latest_reason() {
        let state = state().await;
        state.store.insert_scan("pkg", "1.0", "queuer", vec![]).await.unwrap();

        let first = Verdict::Failure(FailureVerdict { name: "pkg".into(), version: "1.0".into(), reason: "boom".into() });
        submit_verdict(&state, &AuthSubject("worker-1".into()), first).await.unwrap();

        let second = Verdict::Failure(FailureVerdict { name: "pkg".into(), version: "1.0".into(), reason: "boom again".into() });
        submit_verdict(&state, &AuthSubject("worker-1".into()), second).await.unwrap();

        let scan = state.store.get_by_name_version("pkg", "1.0").await.unwrap().unwrap();
        assert_eq!(scan.status, ScanStatus::Failed);
        assert_eq!(scan.fail_reason.as_deref(), Some("boom again"));
    }
}
