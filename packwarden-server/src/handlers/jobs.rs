use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use crate::api_types::{BatchQuery, JobDescriptor};
use crate::auth::AuthSubject;
use crate::errors::AppResult;
use crate::services::dispatch;
use crate::state::AppState;

/// `POST /jobs?batch=N`: up to `batch` job descriptors.
pub async fn get_jobs(
    State(state): State<AppState>,
    auth: AuthSubject,
    Query(query): Query<BatchQuery>,
) -> AppResult<Json<Vec<JobDescriptor>>> {
    let jobs = dispatch::request_jobs(&state, &auth, query.batch).await?;
    Ok(Json(jobs))
}

/// `POST /job`: `RequestJobs(auth, 1)` collapsed to a single descriptor, or
/// a no-job sentinel for legacy callers.
pub async fn get_job(State(state): State<AppState>, auth: AuthSubject) -> AppResult<axum::response::Response> {
    use axum::response::IntoResponse;

    match dispatch::request_job(&state, &auth).await? {
        Some(job) => Ok(Json(job).into_response()),
        None => Ok((StatusCode::OK, Json(json!({ "detail": "No job available" }))).into_response()),
    }
}
