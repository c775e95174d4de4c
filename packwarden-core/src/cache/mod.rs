//! In-process accelerator sitting between the dispatch/ingestion services
//! and the catalogue store, batching both job handout and result
//! persistence to amortize database round-trips under load.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::catalogue::CatalogueStore;
use crate::domain::{Scan, ScanStatus, Verdict};
use crate::error::CoreResult;

/// Configured size of the job cache. `Disabled` means dispatch and
/// ingestion talk to the catalogue store directly; `Enabled(n)` sizes the
/// `ready` and `results` queues to `n`.
#[derive(Debug, Clone, Copy)]
pub enum CacheSize {
    Disabled,
    Enabled(usize),
}

impl CacheSize {
    pub fn from_configured(size: i64) -> Self {
        if size > 1 {
            Self::Enabled(size as usize)
        } else {
            Self::Disabled
        }
    }
}

struct PendingEntry {
    scan: Scan,
}

/// Batches job dispatch and result persistence in front of a
/// [`CatalogueStore`].
///
/// `refill_lock` and `persist_lock` guard `Refill` and `PersistAll`
/// respectively; at most one refiller and one persister run at a time.
/// `Acquire` takes the refill lock only when `ready` is empty.
pub struct JobCache<S: CatalogueStore + ?Sized> {
    store: Arc<S>,
    capacity: usize,
    enabled: bool,
    timeout: chrono::Duration,

    ready: Mutex<VecDeque<Scan>>,
    pending: Mutex<Vec<PendingEntry>>,
    results: Mutex<VecDeque<Verdict>>,

    refill_lock: Mutex<()>,
    persist_lock: Mutex<()>,
}

impl<S: CatalogueStore + ?Sized> JobCache<S> {
    pub fn new(store: Arc<S>, size: CacheSize, timeout: chrono::Duration) -> Self {
        let (enabled, capacity) = match size {
            CacheSize::Disabled => (false, 1),
            CacheSize::Enabled(n) => (true, n),
        };
        Self {
            store,
            capacity,
            enabled,
            timeout,
            ready: Mutex::new(VecDeque::with_capacity(capacity)),
            pending: Mutex::new(Vec::new()),
            results: Mutex::new(VecDeque::with_capacity(capacity)),
            refill_lock: Mutex::new(()),
            persist_lock: Mutex::new(()),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the next job for `leaseholder`, or `None` if nothing is
    /// eligible. Refills from the catalogue store when the ready queue is
    /// empty.
    pub async fn acquire(&self, leaseholder: &str) -> CoreResult<Option<Scan>> {
        if !self.enabled {
            let now = Utc::now();
            let mut leased = self.store.lease_jobs(1, leaseholder, now, self.timeout).await?;
            return Ok(leased.pop());
        }

        let mut scan = {
            let _guard = self.refill_lock.lock().await;
            let empty = self.ready.lock().await.is_empty();
            if empty {
                self.refill().await?;
            }
            self.ready.lock().await.pop_front()
        };

        if let Some(scan) = scan.as_mut() {
            let now = Utc::now();
            scan.status = ScanStatus::Pending;
            scan.pending_at = Some(now);
            scan.pending_by = Some(leaseholder.to_string());
            self.pending.lock().await.push(PendingEntry { scan: scan.clone() });
        }

        Ok(scan)
    }

    /// Public entry point for a periodic reaper task: acquires the refill
    /// lock and runs one `Refill` cycle, requeuing lease-expired jobs and
    /// topping the ready queue back up. Safe to call on a fixed interval
    /// alongside `acquire`'s on-demand refills.
    pub async fn refill_and_reap(&self) -> CoreResult<()> {
        let _guard = self.refill_lock.lock().await;
        self.refill().await
    }

    /// Requeues lease-expired pending scans into `ready`, then tops `ready`
    /// up from the catalogue store. Caller must not hold `refill_lock`.
    async fn refill(&self) -> CoreResult<()> {
        let requeued = self.requeue_timeouts().await;
        if !requeued.is_empty() {
            debug!(count = requeued.len(), "requeued lease-expired scans");
        }

        let exclude: Vec<(String, String)> = {
            let pending = self.pending.lock().await;
            pending.iter().map(|e| (e.scan.name.clone(), e.scan.version.clone())).collect()
        };

        let remaining_capacity = self.capacity.saturating_sub(requeued.len());
        if remaining_capacity == 0 {
            return Ok(());
        }

        let fetched = self.store.find_ready(remaining_capacity as u32, &exclude).await?;
        info!(count = fetched.len(), "fetched scans from catalogue store to refill queue with");

        let mut ready = self.ready.lock().await;
        for scan in fetched {
            if ready.len() >= self.capacity {
                debug!("overfetched, ignoring extras");
                break;
            }
            ready.push_back(scan);
        }
        Ok(())
    }

    async fn requeue_timeouts(&self) -> Vec<Scan> {
        let now = Utc::now();
        let mut pending = self.pending.lock().await;
        let mut kept = Vec::with_capacity(pending.len());
        let mut requeued = Vec::new();

        for entry in pending.drain(..) {
            if entry.scan.lease_expired(now, self.timeout) {
                let mut scan = entry.scan;
                scan.status = ScanStatus::Queued;
                scan.pending_at = None;
                scan.pending_by = None;
                requeued.push(scan);
            } else {
                kept.push(entry);
            }
        }
        *pending = kept;
        drop(pending);

        if !requeued.is_empty() {
            let mut ready = self.ready.lock().await;
            for scan in &requeued {
                if ready.len() < self.capacity {
                    ready.push_back(scan.clone());
                }
            }
        }

        requeued
    }

    /// Buffers `verdict`, flushing the whole batch to the catalogue store
    /// when the results queue fills (or immediately, when the cache is
    /// disabled).
    pub async fn submit(&self, verdict: Verdict) -> CoreResult<()> {
        if !self.enabled {
            let _guard = self.persist_lock.lock().await;
            self.results.lock().await.push_back(verdict);
            return self.persist_all().await;
        }

        let removed = {
            let mut pending = self.pending.lock().await;
            let before = pending.len();
            pending.retain(|e| !(e.scan.name == verdict.name() && e.scan.version == verdict.version()));
            before != pending.len()
        };
        if removed {
            debug!(name = verdict.name(), version = verdict.version(), "removed scan from pending list");
        } else {
            warn!(name = verdict.name(), version = verdict.version(), "scan not found in pending list");
        }

        let _guard = self.persist_lock.lock().await;
        let full = self.results.lock().await.len() >= self.capacity;
        if full {
            self.persist_all().await?;
            info!("results queue full, drained and wrote to catalogue store");
        }
        self.results.lock().await.push_back(verdict);
        Ok(())
    }

    /// Drains the results queue and reconciles every buffered verdict
    /// against the catalogue store in a single transaction (spec.md §4.C:
    /// "flushes all buffered verdicts to B atomically"). Caller should hold
    /// `persist_lock`.
    pub async fn persist_all(&self) -> CoreResult<()> {
        let drained: Vec<Verdict> = {
            let mut results = self.results.lock().await;
            results.drain(..).collect()
        };

        let mut seen: HashSet<(String, String)> = HashSet::new();
        let mut batch: Vec<(uuid::Uuid, Verdict)> = Vec::with_capacity(drained.len());
        for verdict in drained {
            let key = (verdict.name().to_string(), verdict.version().to_string());
            if !seen.insert(key.clone()) {
                debug!(name = %key.0, version = %key.1, "superseded by a later verdict in the same batch");
            }

            let Some(scan) = self.store.get_by_name_version(&key.0, &key.1).await? else {
                warn!(name = %key.0, version = %key.1, "verdict submitted for a scan that doesn't exist, skipping");
                continue;
            };

            batch.push((scan.scan_id, verdict));
        }

        let now = Utc::now();
        self.store.finalize_batch(&batch, "cache", now).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::fake::FakeCatalogueStore;
    use crate::domain::SuccessVerdict;

    fn cache(size: usize, timeout_secs: i64) -> JobCache<FakeCatalogueStore> {
        JobCache::new(Arc::new(FakeCatalogueStore::new()), CacheSize::from_configured(size as i64), chrono::Duration::seconds(timeout_secs))
    }

    #[tokio::test]
    async fn disabled_below_threshold() {
        let c = cache(1, 60);
        assert!(!c.enabled());
    }

    #[tokio::test]
    async fn acquire_refills_then_drains() {
        let c = cache(4, 60);
        c.store.insert_scan("numpy", "1.24.3", "w0", vec!["url1".into()]).await.unwrap();

        let job = c.acquire("worker-a").await.unwrap().expect("job available");
        assert_eq!(job.name, "numpy");
        assert_eq!(job.pending_by.as_deref(), Some("worker-a"));

        let none = c.acquire("worker-b").await.unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn submit_removes_from_pending_and_persists_on_full() {
        let c = cache(2, 60);
        c.store.insert_scan("x", "1", "w0", vec![]).await.unwrap();
        let job = c.acquire("worker-a").await.unwrap().unwrap();

        let verdict = Verdict::Success(SuccessVerdict {
            name: job.name.clone(),
            version: job.version.clone(),
            commit: "c0ffee".into(),
            score: 1,
            inspector_url: Some("u".into()),
            rules_matched: vec!["r1".into()],
        });
        c.submit(verdict).await.unwrap();

        assert!(c.pending.lock().await.is_empty());
    }
}
