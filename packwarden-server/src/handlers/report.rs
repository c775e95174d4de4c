use axum::extract::State;
use axum::Json;

use crate::api_types::ReportPackageRequest;
use crate::auth::AuthSubject;
use crate::errors::AppResult;
use crate::services::report;
use crate::state::AppState;

/// `POST /report`: validates a scan's eligibility for reporting and
/// forwards an observation to the upstream index.
pub async fn report_package(
    State(state): State<AppState>,
    auth: AuthSubject,
    Json(body): Json<ReportPackageRequest>,
) -> AppResult<()> {
    report::report_package(&state, &auth, body).await?;
    Ok(())
}
