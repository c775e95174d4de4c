//! The package catalogue store: durable storage of scans, rules, download
//! URLs, and their association, behind a port trait so the dispatch,
//! ingestion, report, and lookup services never depend on Postgres directly.

mod postgres;

#[cfg(any(test, feature = "test-util"))]
pub mod fake;

pub use postgres::PostgresCatalogueStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{Scan, SuccessVerdict, Verdict};
use crate::error::{CoreError, CoreResult};

/// A validated combination of lookup parameters for `FindScans`.
///
/// Only four combinations are constructible; anything else fails with
/// `CoreError::Invalid` at construction time, so callers can't accidentally
/// build a query the store doesn't know how to run.
#[derive(Debug, Clone)]
pub enum ScanQuery {
    NameAndVersion { name: String, version: String },
    NameSince { name: String, since: DateTime<Utc> },
    Name { name: String },
    Since { since: DateTime<Utc> },
}

impl ScanQuery {
    pub fn build(
        name: Option<String>,
        version: Option<String>,
        since: Option<DateTime<Utc>>,
    ) -> CoreResult<Self> {
        match (name, version, since) {
            (Some(name), Some(version), None) => Ok(Self::NameAndVersion { name, version }),
            (Some(name), None, Some(since)) => Ok(Self::NameSince { name, since }),
            (Some(name), None, None) => Ok(Self::Name { name }),
            (None, None, Some(since)) => Ok(Self::Since { since }),
            _ => Err(CoreError::invalid(
                "invalid parameter combination: valid combinations are (name, version), (name, since), (name), (since)",
            )),
        }
    }
}

/// Aggregate statistics over the last 24 hours.
#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub ingested: i64,
    pub average_scan_time_secs: f64,
    pub failed: i64,
}

/// Durable storage for scans, rules, and download URLs.
///
/// Every write here must be transactional; `lease_jobs` in particular must
/// use row-level locking with skip-locked semantics so concurrent leasers
/// never observe the same row.
#[async_trait]
pub trait CatalogueStore: Send + Sync {
    /// Fails with `AlreadyExists` when (name, version) is already taken.
    async fn insert_scan(
        &self,
        name: &str,
        version: &str,
        queued_by: &str,
        download_urls: Vec<String>,
    ) -> CoreResult<Scan>;

    /// Returns matching scans ordered by `queued_at` descending, with rules
    /// and download URLs eagerly loaded.
    async fn find_scans(&self, query: &ScanQuery) -> CoreResult<Vec<Scan>>;

    /// Up to `limit` scans with `status = QUEUED`, ordered by `queued_at`
    /// ascending, excluding any (name, version) pair in `exclude`. Used by
    /// the job cache's refill path, which loads candidates without leasing
    /// them (leasing happens when the scan is actually handed to a worker).
    async fn find_ready(
        &self,
        limit: u32,
        exclude: &[(String, String)],
    ) -> CoreResult<Vec<Scan>>;

    /// Scans finished at or after `since`, for the malicious-package digest.
    async fn find_finished_since(&self, since: DateTime<Utc>) -> CoreResult<Vec<Scan>>;

    async fn get_by_name_version(&self, name: &str, version: &str) -> CoreResult<Option<Scan>>;

    /// Any scan with `name` that has `reported_at` set, other than
    /// `exclude_version`.
    async fn find_other_reported(
        &self,
        name: &str,
        exclude_version: &str,
    ) -> CoreResult<Option<Scan>>;

    /// Atomically selects up to `batch` eligible scans, transitions them to
    /// `PENDING` with a fresh lease, and returns them with download URLs
    /// loaded. Ordered by `pending_at NULLS FIRST, queued_at ASC`.
    async fn lease_jobs(
        &self,
        batch: u32,
        leaseholder: &str,
        now: DateTime<Utc>,
        timeout: chrono::Duration,
    ) -> CoreResult<Vec<Scan>>;

    /// Idempotent: a no-op if the scan is already `FINISHED`. Upserts and
    /// attaches the matched rules in the same transaction.
    async fn finalize_success(
        &self,
        scan_id: Uuid,
        result: &SuccessVerdict,
        finished_by: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<()>;

    /// Idempotent: a no-op if the scan is already `FINISHED`.
    async fn finalize_failure(
        &self,
        scan_id: Uuid,
        reason: &str,
        finished_by: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<()>;

    /// Applies a batch of verdicts within a single transaction, used by the
    /// job cache's `PersistAll` to flush its buffered results atomically
    /// (spec.md §4.C). Each item is reconciled with the same idempotence as
    /// `finalize_success`/`finalize_failure`: a row already `FINISHED` is
    /// left untouched.
    async fn finalize_batch(
        &self,
        items: &[(Uuid, Verdict)],
        finished_by: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<()>;

    async fn mark_reported(&self, scan_id: Uuid, subject: &str, now: DateTime<Utc>) -> CoreResult<()>;

    /// Idempotent bulk insert of rule names.
    async fn upsert_rule_names(&self, names: &[String]) -> CoreResult<()>;

    async fn stats(&self, now: DateTime<Utc>) -> CoreResult<Stats>;
}
