use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::api_types::{parse_since, ScansDigestResponse};
use crate::auth::AuthSubject;
use crate::errors::AppResult;
use crate::services::lookup;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SinceQuery {
    pub since: String,
}

/// `GET /scans?since=`: the malicious-package digest (SPEC_FULL.md
/// supplemented feature, ungated by the spec.md endpoint table).
pub async fn scans_digest(
    State(state): State<AppState>,
    _auth: AuthSubject,
    Query(query): Query<SinceQuery>,
) -> AppResult<Json<ScansDigestResponse>> {
    let since = parse_since(&query.since)?;
    let digest = lookup::scans_digest(&state, since).await?;
    Ok(Json(digest))
}
