//! Report service (spec.md §4.F): validates a scan's eligibility for
//! reporting, then forwards an observation to the upstream index.

use chrono::Utc;
use tracing::info;

use crate::api_types::{Observation, ObservationExtra, ReportPackageRequest};
use crate::auth::AuthSubject;
use crate::state::AppState;
use crate::upstream;
use packwarden_core::catalogue::ScanQuery;
use packwarden_core::{CoreError, CoreResult};

/// Runs the validation pipeline in order (first failure surfaces), then
/// posts an observation and marks the scan reported.
///
/// The observation POST and the `mark_reported` update are not atomic: if
/// the POST succeeds and the mark fails, retrying is safe (the duplicate
/// POST is the upstream's problem to deduplicate), per spec.md §4.F.
pub async fn report_package(state: &AppState, auth: &AuthSubject, req: ReportPackageRequest) -> CoreResult<()> {
    // 1. the scan's package name exists in the catalogue at all.
    let same_name = state.store.find_scans(&ScanQuery::Name { name: req.name.clone() }).await?;
    if same_name.is_empty() {
        return Err(CoreError::not_found(format!("no scans found for package {}", req.name)));
    }

    // 2. no other version of `name` already has `reported_at` set.
    if let Some(other) = state.store.find_other_reported(&req.name, &req.version).await? {
        return Err(CoreError::conflict(format!(
            "{}@{} is already reported",
            req.name, other.version
        )));
    }

    // 3. the specific (name, version) exists.
    let scan = state
        .store
        .get_by_name_version(&req.name, &req.version)
        .await?
        .ok_or_else(|| CoreError::not_found(format!("{}@{} not found", req.name, req.version)))?;

    // 4. inspector_url is derivable.
    let inspector_url = req
        .inspector_url
        .clone()
        .or_else(|| scan.inspector_url.clone())
        .ok_or_else(|| CoreError::invalid("inspector_url not given and not found in database"))?;

    // 5. the package is reachable on the upstream index.
    upstream::verify_reachable(&state.http, &state.config.pypi_api_url, &req.name, &req.version).await?;

    let observation = Observation {
        kind: "is_malware",
        summary: req.additional_information.clone(),
        inspector_url,
        extra: ObservationExtra { yara_rules: scan.rules.clone() },
    };

    let url = format!("{}/report/{}", state.config.reporter_url, req.name);
    state
        .http
        .post(&url)
        .json(&observation)
        .send()
        .await?
        .error_for_status()?;

    let now = Utc::now();
    state.store.mark_reported(scan.scan_id, auth.as_str(), now).await?;

    info!(name = req.name, version = req.version, reported_by = auth.as_str(), "package reported");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use packwarden_core::catalogue::fake::FakeCatalogueStore;
    use packwarden_core::{CacheSize, JobCache, RuleSnapshotService};
    use std::sync::Arc;

    fn config() -> Config {
        Config {
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
        }
    }

    async fn state() -> AppState {
        let store: Arc<dyn packwarden_core::CatalogueStore> = Arc::new(FakeCatalogueStore::new());
        let config = Arc::new(config());
        let http = reqwest::Client::new();
        let rules = Arc::new(RuleSnapshotService::new(http.clone(), config.rules_repository.clone(), config.github_token.clone()));
        let cache = Arc::new(JobCache::new(store.clone(), CacheSize::Disabled, chrono::Duration::seconds(config.job_timeout_secs)));
        AppState { store, cache, rules, http, config }
    }

    fn req(name: &str, version: &str) -> ReportPackageRequest {
        ReportPackageRequest {
            name: name.to_string(),
            version: version.to_string(),
            inspector_url: None,
            additional_information: "flagged by scanner".to_string(),
        }
    }

    #[tokio::test]
    async fn unknown_package_name_is_not_found() {
        let state = state().await;
        let err = report_package(&state, &AuthSubject("auth0|tester".into()), req("nope", "1")).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn already_reported_other_version_conflicts() {
        let state = state().await;
        state.store.insert_scan("pkg", "1.0", "w", vec![]).await.unwrap();
        let newer = state.store.insert_scan("pkg", "2.0", "w", vec![]).await.unwrap();
        state.store.mark_reported(newer.scan_id, "reporter", Utc::now()).await.unwrap();

        let err = report_package(&state, &AuthSubject("auth0|tester".into()), req("pkg", "1.0")).await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict(msg) if msg.contains("2.0")));
    }

    #[tokio::test]
    async fn missing_specific_version_is_not_found() {
        let state = state().await;
        state.store.insert_scan("pkg", "1.0", "w", vec![]).await.unwrap();

        let err = report_package(&state, &AuthSubject("auth0|tester".into()), req("pkg", "9.9")).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn missing_inspector_url_is_invalid() {
        let state = state().await;
        state.store.insert_scan("pkg", "1.0", "w", vec![]).await.unwrap();

        let err = report_package(&state, &AuthSubject("auth0|tester".into()), req("pkg", "1.0")).await.unwrap_err();
        assert!(matches!(err, CoreError::Invalid(_)));
    }
}
