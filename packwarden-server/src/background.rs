//! Background tasks spawned at startup: the periodic rule-snapshot
//! refresh and, when the job cache is enabled, its periodic reaper
//! (§4.C `Refill`, which also requeues lease-expired jobs).

use std::time::Duration;

use tracing::{error, info};

use crate::state::AppState;

const RULE_REFRESH_INTERVAL: Duration = Duration::from_secs(300);
const CACHE_REFILL_INTERVAL: Duration = Duration::from_secs(15);

/// Refreshes the rule snapshot on a fixed interval, logging and keeping
/// the previous snapshot on failure (spec.md §7).
pub fn spawn_rule_refresh_loop(state: AppState) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(RULE_REFRESH_INTERVAL);
        loop {
            ticker.tick().await;
            match state.rules.refresh().await {
                Ok(snapshot) => {
                    let names: Vec<String> = snapshot.rules.keys().cloned().collect();
                    if let Err(err) = state.store.upsert_rule_names(&names).await {
                        error!(error = %err, "failed to upsert rule names after refresh");
                    }
                }
                Err(err) => error!(error = %err, "periodic rule snapshot refresh failed"),
            }
        }
    });
}

/// Periodically drives the job cache's `Refill`, requeuing lease-expired
/// jobs and topping the ready queue back up from the catalogue store.
/// Only relevant when the cache is enabled; a no-op loop otherwise would
/// just be wasted ticks, so this isn't spawned when the cache is disabled.
pub fn spawn_cache_reaper_loop(state: AppState) {
    if !state.cache.enabled() {
        info!("job cache disabled, skipping reaper loop");
        return;
    }

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(CACHE_REFILL_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(err) = state.cache.refill_and_reap().await {
                error!(error = %err, "job cache reaper cycle failed");
            }
        }
    });
}
