//! Wire-level request/response shapes for the HTTP boundary (spec.md §6).
//!
//! These are distinct from `packwarden_core::domain` types: the domain
//! types are the authoritative internal model, these are what's actually
//! serialized on the wire (timestamps as Unix seconds, status as a
//! lowercase string, etc).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use packwarden_core::domain::Scan;
use packwarden_core::CoreError;

/// `GET /` response.
#[derive(Debug, Clone, Serialize)]
pub struct ServerMetadata {
    pub server_commit: String,
    pub rules_commit: String,
}

/// `GET /rules` response.
#[derive(Debug, Clone, Serialize)]
pub struct RulesResponse {
    pub hash: String,
    pub rules: BTreeMap<String, String>,
}

/// One element of the `POST /jobs` / `POST /job` response.
#[derive(Debug, Clone, Serialize)]
pub struct JobDescriptor {
    pub name: String,
    pub version: String,
    pub distributions: Vec<String>,
    pub hash: String,
}

/// Query parameters for `POST /jobs`.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchQuery {
    #[serde(default = "default_batch")]
    pub batch: u32,
}

fn default_batch() -> u32 {
    1
}

/// `POST /package` request body: queue a new scan.
#[derive(Debug, Clone, Deserialize)]
pub struct QueuePackageRequest {
    pub name: String,
    pub version: String,
}

/// `POST /package` response.
#[derive(Debug, Clone, Serialize)]
pub struct QueuePackageResponse {
    pub id: uuid::Uuid,
}

/// One element of a `POST /batch/package` response: the outcome of queuing
/// a single package, since a batch submission can partially fail without
/// aborting the rest (distinct from `POST /package`, which is all-or-nothing
/// for a single package).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct BatchQueueResult {
    pub name: String,
    pub version: String,
    pub outcome: BatchQueueOutcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchQueueOutcome {
    Queued { id: uuid::Uuid },
    AlreadyQueued,
    NotFoundUpstream,
}

/// Query parameters for `GET /package`.
#[derive(Debug, Clone, Deserialize)]
pub struct LookupQuery {
    pub name: Option<String>,
    pub version: Option<String>,
    pub since: Option<String>,
    pub page: Option<u32>,
    pub size: Option<u32>,
}

/// A single scan, projected for `GET /package` and `GET /scans`.
#[derive(Debug, Clone, Serialize)]
pub struct PackageView {
    pub name: String,
    pub version: String,
    pub status: String,
    pub score: Option<i32>,
    pub inspector_url: Option<String>,
    pub commit_hash: Option<String>,
    pub fail_reason: Option<String>,
    pub rules: Vec<String>,
    pub distributions: Vec<String>,
    pub queued_at: Option<i64>,
    pub pending_at: Option<i64>,
    pub finished_at: Option<i64>,
    pub reported_at: Option<i64>,
}

impl From<&Scan> for PackageView {
    fn from(scan: &Scan) -> Self {
        Self {
            name: scan.name.clone(),
            version: scan.version.clone(),
            status: scan.status.as_wire_str().to_string(),
            score: scan.score,
            inspector_url: scan.inspector_url.clone(),
            commit_hash: scan.commit_hash.clone(),
            fail_reason: scan.fail_reason.clone(),
            rules: scan.rules.clone(),
            distributions: scan.download_urls.clone(),
            queued_at: scan.queued_at.map(|t| t.timestamp()),
            pending_at: scan.pending_at.map(|t| t.timestamp()),
            finished_at: scan.finished_at.map(|t| t.timestamp()),
            reported_at: scan.reported_at.map(|t| t.timestamp()),
        }
    }
}

/// `GET /package` response: either the full list, or one page of it.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum LookupResponse {
    All(Vec<PackageView>),
    Page(Page),
}

#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub items: Vec<PackageView>,
    pub page: u32,
    pub size: u32,
    pub total: usize,
}

/// `GET /scans?since=` response: the malicious-package digest, per
/// SPEC_FULL.md's supplemented features.
#[derive(Debug, Clone, Serialize)]
pub struct ScansDigestResponse {
    pub all_scans: Vec<PackageSpecifier>,
    pub malicious_packages: Vec<MaliciousPackage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PackageSpecifier {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MaliciousPackage {
    pub name: String,
    pub version: String,
    pub score: i32,
    pub inspector_url: String,
    pub rules: Vec<String>,
}

/// `POST /report` request body.
#[derive(Debug, Clone, Deserialize)]
pub struct ReportPackageRequest {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub inspector_url: Option<String>,
    pub additional_information: String,
}

/// Outbound observation posted to the upstream index's observation sink.
#[derive(Debug, Clone, Serialize)]
pub struct Observation {
    pub kind: &'static str,
    pub summary: String,
    pub inspector_url: String,
    pub extra: ObservationExtra,
}

#[derive(Debug, Clone, Serialize)]
pub struct ObservationExtra {
    pub yara_rules: Vec<String>,
}

/// `GET /stats` response.
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub ingested: i64,
    pub average_scan_time: f64,
    pub failed: i64,
}

/// Parses a wire timestamp, which per spec.md §6 may be given as either an
/// integer Unix-seconds value or an ISO-8601 string.
pub fn parse_since(since: &str) -> Result<DateTime<Utc>, CoreError> {
    if let Ok(secs) = since.parse::<i64>() {
        return DateTime::<Utc>::from_timestamp(secs, 0)
            .ok_or_else(|| CoreError::invalid(format!("timestamp out of range: {since}")));
    }
    DateTime::parse_from_rfc3339(since)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| CoreError::invalid(format!("invalid timestamp: {since}")))
}
