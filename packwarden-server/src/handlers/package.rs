use axum::extract::{Query, State};
use axum::Json;

use crate::api_types::{
    BatchQueueOutcome, BatchQueueResult, LookupQuery, LookupResponse, QueuePackageRequest,
    QueuePackageResponse, parse_since,
};
use crate::auth::AuthSubject;
use crate::errors::AppResult;
use crate::services::lookup;
use crate::state::AppState;
use crate::upstream;
use packwarden_core::domain::Verdict;
use packwarden_core::CoreError;

/// `PUT /package`: a worker's terminal verdict for a job.
pub async fn submit_verdict(
    State(state): State<AppState>,
    auth: AuthSubject,
    Json(verdict): Json<Verdict>,
) -> AppResult<()> {
    crate::services::ingestion::submit_verdict(&state, &auth, verdict).await?;
    Ok(())
}

/// `POST /package`: queue a new scan. Resolves distribution URLs from the
/// upstream index; 404s if the package/version isn't found there, 409s if
/// (name, version) is already queued.
pub async fn queue_package(
    State(state): State<AppState>,
    auth: AuthSubject,
    Json(body): Json<QueuePackageRequest>,
) -> AppResult<Json<QueuePackageResponse>> {
    let download_urls =
        upstream::fetch_distribution_urls(&state.http, &state.config.pypi_api_url, &body.name, &body.version).await?;

    let scan = state
        .store
        .insert_scan(&body.name, &body.version, auth.as_str(), download_urls)
        .await?;

    Ok(Json(QueuePackageResponse { id: scan.scan_id }))
}

/// `POST /batch/package`: queue many scans in one call. Each item's
/// outcome is reported individually rather than failing the whole batch on
/// the first conflict or upstream miss.
pub async fn batch_queue_package(
    State(state): State<AppState>,
    auth: AuthSubject,
    Json(body): Json<Vec<QueuePackageRequest>>,
) -> AppResult<Json<Vec<BatchQueueResult>>> {
    let mut results = Vec::with_capacity(body.len());

    for item in body {
        let outcome = match upstream::fetch_distribution_urls(
            &state.http,
            &state.config.pypi_api_url,
            &item.name,
            &item.version,
        )
        .await
        {
            Ok(download_urls) => match state.store.insert_scan(&item.name, &item.version, auth.as_str(), download_urls).await {
                Ok(scan) => BatchQueueOutcome::Queued { id: scan.scan_id },
                Err(CoreError::AlreadyExists(_)) => BatchQueueOutcome::AlreadyQueued,
                Err(other) => return Err(other.into()),
            },
            Err(CoreError::NotFound(_)) => BatchQueueOutcome::NotFoundUpstream,
            Err(other) => return Err(other.into()),
        };

        results.push(BatchQueueResult { name: item.name, version: item.version, outcome });
    }

    Ok(Json(results))
}

/// `GET /package?name=&version=&since=&page=&size=`.
pub async fn lookup_packages(
    State(state): State<AppState>,
    _auth: AuthSubject,
    Query(query): Query<LookupQuery>,
) -> AppResult<Json<LookupResponse>> {
    let since = query.since.as_deref().map(parse_since).transpose()?;
    let response = lookup::lookup_packages(&state, query.name, query.version, since, query.page, query.size).await?;
    Ok(Json(response))
}
