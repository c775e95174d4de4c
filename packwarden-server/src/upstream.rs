//! PyPI lookups: resolving a package's distribution URLs when queuing a
//! scan, and checking reachability when validating a report. The PyPI JSON
//! API is the "upstream index" spec.md's §4.F/§6 refer to.

use packwarden_core::{CoreError, CoreResult};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct PypiProjectResponse {
    urls: Vec<PypiUrlEntry>,
}

#[derive(Debug, Deserialize)]
struct PypiUrlEntry {
    url: String,
}

/// Fetches the distribution (sdist/wheel) URLs for `name@version`.
///
/// Maps a 404 from PyPI to `CoreError::NotFound`, matching spec.md §7's
/// "Upstream HTTP 404s from PyPI... map to NotFound".
pub async fn fetch_distribution_urls(
    http: &reqwest::Client,
    pypi_api_base: &str,
    name: &str,
    version: &str,
) -> CoreResult<Vec<String>> {
    let url = format!("{pypi_api_base}/{name}/{version}/json");
    let response = http.get(&url).send().await?;

    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Err(CoreError::not_found(format!("{name}@{version} not found on PyPI")));
    }

    let body: PypiProjectResponse = response.error_for_status()?.json().await?;
    Ok(body.urls.into_iter().map(|entry| entry.url).collect())
}

/// Confirms `name@version` is reachable on the upstream index, without
/// needing its distribution URLs. Used by the report validation pipeline
/// (spec.md §4.F step 5).
pub async fn verify_reachable(
    http: &reqwest::Client,
    pypi_api_base: &str,
    name: &str,
    version: &str,
) -> CoreResult<()> {
    let url = format!("{pypi_api_base}/{name}/{version}/json");
    let response = http.head(&url).send().await?;

    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Err(CoreError::not_found(format!("{name}@{version} not found on PyPI")));
    }
    // Some index mirrors don't implement HEAD; fall back to GET.
    if response.status() == reqwest::StatusCode::METHOD_NOT_ALLOWED {
        let response = http.get(&url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(CoreError::not_found(format!("{name}@{version} not found on PyPI")));
        }
        response.error_for_status()?;
        return Ok(());
    }

    response.error_for_status()?;
    Ok(())
}
