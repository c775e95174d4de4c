//! In-memory [`CatalogueStore`] double used by unit and integration tests.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{Scan, ScanStatus, SuccessVerdict, Verdict};
use crate::error::{CoreError, CoreResult};

use super::{CatalogueStore, ScanQuery, Stats};

#[derive(Default)]
struct Inner {
    scans: HashMap<Uuid, Scan>,
    rule_names: std::collections::HashSet<String>,
}

#[derive(Default)]
pub struct FakeCatalogueStore {
    inner: Mutex<Inner>,
}

impl FakeCatalogueStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn find_by_name_version(inner: &Inner, name: &str, version: &str) -> Option<Scan> {
        inner
            .scans
            .values()
            .find(|s| s.name == name && s.version == version)
            .cloned()
    }
}

#[async_trait::async_trait]
impl CatalogueStore for FakeCatalogueStore {
    async fn insert_scan(
        &self,
        name: &str,
        version: &str,
        queued_by: &str,
        download_urls: Vec<String>,
    ) -> CoreResult<Scan> {
        let mut inner = self.inner.lock().unwrap();
        if Self::find_by_name_version(&inner, name, version).is_some() {
            return Err(CoreError::already_exists(format!("{name}@{version}")));
        }
        let scan = Scan::new_queued(name.to_string(), version.to_string(), queued_by.to_string(), download_urls);
        inner.scans.insert(scan.scan_id, scan.clone());
        Ok(scan)
    }

    async fn find_scans(&self, query: &ScanQuery) -> CoreResult<Vec<Scan>> {
        let inner = self.inner.lock().unwrap();
        let mut out: Vec<Scan> = inner
            .scans
            .values()
            .filter(|s| match query {
                ScanQuery::NameAndVersion { name, version } => &s.name == name && &s.version == version,
                ScanQuery::NameSince { name, since } => &s.name == name && s.queued_at.is_some_and(|q| q >= *since),
                ScanQuery::Name { name } => &s.name == name,
                ScanQuery::Since { since } => s.queued_at.is_some_and(|q| q >= *since),
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| b.queued_at.cmp(&a.queued_at));
        Ok(out)
    }

    async fn find_ready(
        &self,
        limit: u32,
        exclude: &[(String, String)],
    ) -> CoreResult<Vec<Scan>> {
        let inner = self.inner.lock().unwrap();
        let mut out: Vec<Scan> = inner
            .scans
            .values()
            .filter(|s| {
                s.status == ScanStatus::Queued
                    && !exclude.iter().any(|(n, v)| n == &s.name && v == &s.version)
            })
            .cloned()
            .collect();
        out.sort_by_key(|s| s.queued_at);
        out.truncate(limit as usize);
        Ok(out)
    }

    async fn find_finished_since(&self, since: DateTime<Utc>) -> CoreResult<Vec<Scan>> {
        let inner = self.inner.lock().unwrap();
        let mut out: Vec<Scan> = inner
            .scans
            .values()
            .filter(|s| {
                matches!(s.status, ScanStatus::Finished | ScanStatus::Failed)
                    && s.finished_at.is_some_and(|f| f >= since)
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| b.finished_at.cmp(&a.finished_at));
        Ok(out)
    }

    async fn get_by_name_version(&self, name: &str, version: &str) -> CoreResult<Option<Scan>> {
        let inner = self.inner.lock().unwrap();
        Ok(Self::find_by_name_version(&inner, name, version))
    }

    async fn find_other_reported(&self, name: &str, exclude_version: &str) -> CoreResult<Option<Scan>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .scans
            .values()
            .find(|s| s.name == name && s.version != exclude_version && s.reported_at.is_some())
            .cloned())
    }

    async fn lease_jobs(
        &self,
        batch: u32,
        leaseholder: &str,
        now: DateTime<Utc>,
        timeout: chrono::Duration,
    ) -> CoreResult<Vec<Scan>> {
        let mut inner = self.inner.lock().unwrap();
        let mut eligible_ids: Vec<Uuid> = inner
            .scans
            .values()
            .filter(|s| s.status == ScanStatus::Queued || s.lease_expired(now, timeout))
            .map(|s| s.scan_id)
            .collect();

        eligible_ids.sort_by_key(|id| {
            let s = &inner.scans[id];
            (s.pending_at.is_some(), s.pending_at.or(s.queued_at))
        });
        eligible_ids.truncate(batch as usize);

        let mut out = Vec::with_capacity(eligible_ids.len());
        for id in eligible_ids {
            let scan = inner.scans.get_mut(&id).unwrap();
            scan.status = ScanStatus::Pending;
            scan.pending_at = Some(now);
            scan.pending_by = Some(leaseholder.to_string());
            out.push(scan.clone());
        }
        Ok(out)
    }

    async fn finalize_success(
        &self,
        scan_id: Uuid,
        result: &SuccessVerdict,
        finished_by: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        for name in &result.rules_matched {
            inner.rule_names.insert(name.clone());
        }
        let Some(scan) = inner.scans.get_mut(&scan_id) else {
            return Err(CoreError::not_found(format!("scan {scan_id} not found")));
        };
        if scan.status == ScanStatus::Finished {
            return Ok(());
        }
        scan.status = ScanStatus::Finished;
        scan.finished_at = Some(now);
        scan.finished_by = Some(finished_by.to_string());
        scan.score = Some(result.score);
        scan.inspector_url = result.inspector_url.clone();
        scan.commit_hash = Some(result.commit.clone());
        scan.rules = result.rules_matched.clone();
        Ok(())
    }

    async fn finalize_failure(
        &self,
        scan_id: Uuid,
        reason: &str,
        finished_by: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let Some(scan) = inner.scans.get_mut(&scan_id) else {
            return Err(CoreError::not_found(format!("scan {scan_id} not found")));
        };
        if scan.status == ScanStatus::Finished {
            return Ok(());
        }
        scan.status = ScanStatus::Failed;
        scan.finished_at = Some(now);
        scan.finished_by = Some(finished_by.to_string());
        scan.fail_reason = Some(reason.to_string());
        Ok(())
    }

    /// Reconciles a batch of verdicts under a single lock acquisition,
    /// matching the Postgres implementation's single-transaction atomicity.
    async fn finalize_batch(
        &self,
        items: &[(Uuid, Verdict)],
        finished_by: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        for (scan_id, verdict) in items {
            match verdict {
                Verdict::Success(result) => {
                    for name in &result.rules_matched {
                        inner.rule_names.insert(name.clone());
                    }
                    let Some(scan) = inner.scans.get_mut(scan_id) else {
                        return Err(CoreError::not_found(format!("scan {scan_id} not found")));
                    };
                    if scan.status == ScanStatus::Finished {
                        continue;
                    }
                    scan.status = ScanStatus::Finished;
                    scan.finished_at = Some(now);
                    scan.finished_by = Some(finished_by.to_string());
                    scan.score = Some(result.score);
                    scan.inspector_url = result.inspector_url.clone();
                    scan.commit_hash = Some(result.commit.clone());
                    scan.rules = result.rules_matched.clone();
                }
                Verdict::Failure(failure) => {
                    let Some(scan) = inner.scans.get_mut(scan_id) else {
                        return Err(CoreError::not_found(format!("scan {scan_id} not found")));
                    };
                    if scan.status == ScanStatus::Finished {
                        continue;
                    }
                    scan.status = ScanStatus::Failed;
                    scan.finished_at = Some(now);
                    scan.finished_by = Some(finished_by.to_string());
                    scan.fail_reason = Some(failure.reason.clone());
                }
            }
        }
        Ok(())
    }

    async fn mark_reported(&self, scan_id: Uuid, subject: &str, now: DateTime<Utc>) -> CoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let Some(scan) = inner.scans.get_mut(&scan_id) else {
            return Err(CoreError::not_found(format!("scan {scan_id} not found")));
        };
        scan.reported_at = Some(now);
        scan.reported_by = Some(subject.to_string());
        Ok(())
    }

    async fn upsert_rule_names(&self, names: &[String]) -> CoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        for name in names {
            inner.rule_names.insert(name.clone());
        }
        Ok(())
    }

    async fn stats(&self, now: DateTime<Utc>) -> CoreResult<Stats> {
        let inner = self.inner.lock().unwrap();
        let since = now - chrono::Duration::hours(24);
        let ingested = inner
            .scans
            .values()
            .filter(|s| s.queued_at.is_some_and(|q| q > since))
            .count() as i64;
        let failed = inner
            .scans
            .values()
            .filter(|s| s.status == ScanStatus::Failed && s.finished_at.is_some_and(|f| f > since))
            .count() as i64;
        let durations: Vec<f64> = inner
            .scans
            .values()
            .filter(|s| s.status == ScanStatus::Finished && s.finished_at.is_some_and(|f| f > since))
            .filter_map(|s| match (s.pending_at, s.finished_at) {
                (Some(p), Some(f)) => Some((f - p).num_milliseconds() as f64 / 1000.0),
                _ => None,
            })
            .collect();
        let average_scan_time_secs = if durations.is_empty() {
            0.0
        } else {
            durations.iter().sum::<f64>() / durations.len() as f64
        };
        Ok(Stats {
            ingested,
            average_scan_time_secs,
            failed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplicate_insert_conflicts() {
        let store = FakeCatalogueStore::new();
        store.insert_scan("numpy", "1.24.3", "w1", vec!["u1".into()]).await.unwrap();
        let err = store.insert_scan("numpy", "1.24.3", "w1", vec![]).await.unwrap_err();
        assert!(matches!(err, CoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn lease_then_reclaim_on_expiry() {
        let store = FakeCatalogueStore::new();
        store.insert_scan("evilpkg", "0.1", "w1", vec![]).await.unwrap();

        let t0 = Utc::now();
        let leased = store.lease_jobs(1, "worker-a", t0, chrono::Duration::seconds(120)).await.unwrap();
        assert_eq!(leased.len(), 1);
        assert_eq!(leased[0].pending_by.as_deref(), Some("worker-a"));

        let none = store.lease_jobs(1, "worker-b", t0 + chrono::Duration::seconds(10), chrono::Duration::seconds(120)).await.unwrap();
        assert!(none.is_empty());

        let t1 = t0 + chrono::Duration::seconds(130);
        let reclaimed = store.lease_jobs(1, "worker-b", t1, chrono::Duration::seconds(120)).await.unwrap();
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].pending_by.as_deref(), Some("worker-b"));
    }

    #[tokio::test]
    async fn finalize_success_is_idempotent() {
        let store = FakeCatalogueStore::new();
        let scan = store.insert_scan("x", "1", "w1", vec![]).await.unwrap();
        let verdict = SuccessVerdict {
            name: "x".into(),
            version: "1".into(),
            commit: "c0ffee".into(),
            score: 3,
            inspector_url: Some("u".into()),
            rules_matched: vec!["r1".into()],
        };
        let now = Utc::now();
        store.finalize_success(scan.scan_id, &verdict, "w1", now).await.unwrap();
        store.finalize_success(scan.scan_id, &verdict, "w1", now + chrono::Duration::seconds(1)).await.unwrap();

        let reloaded = store.get_by_name_version("x", "1").await.unwrap().unwrap();
        assert_eq!(reloaded.finished_at, Some(now));
    }
}
