use axum::extract::State;
use axum::Json;

use crate::api_types::RulesResponse;
use crate::auth::AuthSubject;
use crate::errors::AppResult;
use crate::state::AppState;

/// `GET /rules`: the currently active rule bundle.
pub async fn get_rules(State(state): State<AppState>, _auth: AuthSubject) -> Json<RulesResponse> {
    let snapshot = state.rules.current().await;
    Json(RulesResponse {
        hash: snapshot.commit_hash.clone(),
        rules: snapshot.rules.clone(),
    })
}

/// `POST /update-rules/`: refreshes the snapshot and ensures every rule
/// name it contains has a corresponding `Rule` row (spec.md §4.A).
pub async fn update_rules(State(state): State<AppState>, _auth: AuthSubject) -> AppResult<()> {
    let snapshot = state.rules.refresh().await?;
    let names: Vec<String> = snapshot.rules.keys().cloned().collect();
    state.store.upsert_rule_names(&names).await?;
    Ok(())
}
