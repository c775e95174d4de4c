//! Lookup service (spec.md §4.G): read-side queries and statistics.

use chrono::{DateTime, Utc};

use crate::api_types::{
    LookupResponse, MaliciousPackage, Page, PackageSpecifier, PackageView, ScansDigestResponse,
};
use crate::state::AppState;
use packwarden_core::catalogue::{ScanQuery, Stats};
use packwarden_core::CoreResult;

/// `LookupPackages`: projects matching scans into the stable wire shape,
/// paginating only when both `page` and `size` are given.
pub async fn lookup_packages(
    state: &AppState,
    name: Option<String>,
    version: Option<String>,
    since: Option<DateTime<Utc>>,
    page: Option<u32>,
    size: Option<u32>,
) -> CoreResult<LookupResponse> {
    let query = ScanQuery::build(name, version, since)?;
    let scans = state.store.find_scans(&query).await?;
    let views: Vec<PackageView> = scans.iter().map(PackageView::from).collect();

    match (page, size) {
        (Some(page), Some(size)) => {
            let total = views.len();
            let start = (page as usize).saturating_mul(size as usize);
            let items = views.into_iter().skip(start).take(size as usize).collect();
            Ok(LookupResponse::Page(Page { items, page, size, total }))
        }
        _ => Ok(LookupResponse::All(views)),
    }
}

/// `GetStats`: aggregate counters over the last 24 hours.
pub async fn get_stats(state: &AppState) -> CoreResult<Stats> {
    state.store.stats(Utc::now()).await
}

/// The malicious-package digest (SPEC_FULL.md supplemented feature):
/// scans finished since `since`, split into the full list and the subset
/// whose score clears `score_threshold`.
pub async fn scans_digest(state: &AppState, since: DateTime<Utc>) -> CoreResult<ScansDigestResponse> {
    let scans = state.store.find_finished_since(since).await?;

    let all_scans = scans
        .iter()
        .map(|scan| PackageSpecifier { name: scan.name.clone(), version: scan.version.clone() })
        .collect();

    let malicious_packages = scans
        .iter()
        .filter_map(|scan| {
            let score = scan.score?;
            if score < state.config.score_threshold {
                return None;
            }
            let inspector_url = scan.inspector_url.clone()?;
            Some(MaliciousPackage {
                name: scan.name.clone(),
                version: scan.version.clone(),
                score,
                inspector_url,
                rules: scan.rules.clone(),
            })
        })
        .collect();

    Ok(ScansDigestResponse { all_scans, malicious_packages })
}
