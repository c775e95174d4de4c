//! Route table. Endpoint names reflect semantics, not a specific framework
//! (spec.md §6); paths are wired exactly as the endpoint table names them.

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::handlers::{jobs, package, report, root, rules, scans, stats};
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root::root_handler))
        .route("/update-rules/", post(rules::update_rules))
        .route("/rules", get(rules::get_rules))
        .route("/jobs", post(jobs::get_jobs))
        .route("/job", post(jobs::get_job))
        .route("/package", put(package::submit_verdict).post(package::queue_package).get(package::lookup_packages))
        .route("/batch/package", post(package::batch_queue_package))
        .route("/scans", get(scans::scans_digest))
        .route("/report", post(report::report_package))
        .route("/stats", get(stats::get_stats))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
