use axum::extract::State;
use axum::Json;

use crate::api_types::StatsResponse;
use crate::auth::AuthSubject;
use crate::errors::AppResult;
use crate::services::lookup;
use crate::state::AppState;

/// `GET /stats`: ingested/failed counts and mean scan duration over the
/// last 24 hours.
pub async fn get_stats(State(state): State<AppState>, _auth: AuthSubject) -> AppResult<Json<StatsResponse>> {
    let stats = lookup::get_stats(&state).await?;
    Ok(Json(StatsResponse {
        ingested: stats.ingested,
        average_scan_time: stats.average_scan_time_secs,
        failed: stats.failed,
    }))
}
