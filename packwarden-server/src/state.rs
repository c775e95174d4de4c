//! Process-wide shared resources, initialized at boot and handed to every
//! handler as explicit `State<AppState>` — never hidden singletons that
//! allocate on first use inside a handler, per SPEC_FULL.md's ambient-stack
//! notes (mirroring `ferrex-server::infra::app_state::AppState`).

use std::sync::Arc;

use packwarden_core::{CatalogueStore, JobCache, RuleSnapshotService};

use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CatalogueStore>,
    pub cache: Arc<JobCache<dyn CatalogueStore>>,
    pub rules: Arc<RuleSnapshotService>,
    pub http: reqwest::Client,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn job_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.config.job_timeout_secs)
    }
}
