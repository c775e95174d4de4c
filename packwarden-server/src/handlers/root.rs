use axum::extract::State;
use axum::Json;

use crate::api_types::ServerMetadata;
use crate::state::AppState;

/// `GET /`: server and rule-bundle identity, unauthenticated.
pub async fn root_handler(State(state): State<AppState>) -> Json<ServerMetadata> {
    let rules_commit = state.rules.current().await.commit_hash.clone();
    Json(ServerMetadata {
        server_commit: server_commit(),
        rules_commit,
    })
}

fn server_commit() -> String {
    option_env!("VERGEN_GIT_SHA")
        .or(option_env!("GIT_HASH"))
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}-dev", env!("CARGO_PKG_VERSION")))
}
