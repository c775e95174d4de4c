use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

/// Lifecycle status of a [`Scan`].
///
/// Transitions only along: `Queued -> Pending -> {Finished, Failed}`, and
/// `Pending -> Queued` on lease expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanStatus {
    Queued,
    Pending,
    Finished,
    Failed,
}

impl ScanStatus {
    pub const fn as_db_str(self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Pending => "PENDING",
            Self::Finished => "FINISHED",
            Self::Failed => "FAILED",
        }
    }

    pub const fn as_wire_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Pending => "pending",
            Self::Finished => "finished",
            Self::Failed => "failed",
        }
    }
}

impl TryFrom<&str> for ScanStatus {
    type Error = CoreError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "QUEUED" => Ok(Self::Queued),
            "PENDING" => Ok(Self::Pending),
            "FINISHED" => Ok(Self::Finished),
            "FAILED" => Ok(Self::Failed),
            other => Err(CoreError::Internal(format!("unknown scan status: {other}"))),
        }
    }
}

/// A unique (name, version) scan submission and its lifecycle record.
///
/// This struct is a plain data carrier; the lifecycle invariants are
/// enforced by the catalogue store, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scan {
    pub scan_id: Uuid,
    pub name: String,
    pub version: String,
    pub status: ScanStatus,

    pub score: Option<i32>,
    pub inspector_url: Option<String>,
    pub commit_hash: Option<String>,
    pub fail_reason: Option<String>,

    pub queued_at: Option<DateTime<Utc>>,
    pub queued_by: String,

    pub pending_at: Option<DateTime<Utc>>,
    pub pending_by: Option<String>,

    pub finished_at: Option<DateTime<Utc>>,
    pub finished_by: Option<String>,

    pub reported_at: Option<DateTime<Utc>>,
    pub reported_by: Option<String>,

    pub download_urls: Vec<String>,
    pub rules: Vec<String>,
}

impl Scan {
    /// Construct a freshly queued scan. Used by `InsertScan`.
    pub fn new_queued(name: String, version: String, queued_by: String, download_urls: Vec<String>) -> Self {
        Self {
            scan_id: Uuid::new_v4(),
            name,
            version,
            status: ScanStatus::Queued,
            score: None,
            inspector_url: None,
            commit_hash: None,
            fail_reason: None,
            queued_at: Some(Utc::now()),
            queued_by,
            pending_at: None,
            pending_by: None,
            finished_at: None,
            finished_by: None,
            reported_at: None,
            reported_by: None,
            download_urls,
            rules: Vec::new(),
        }
    }

    /// Whether the scan's lease has expired as of `now`, given `timeout`.
    pub fn lease_expired(&self, now: DateTime<Utc>, timeout: chrono::Duration) -> bool {
        matches!(self.status, ScanStatus::Pending)
            && self.pending_at.is_some_and(|pending_at| now - pending_at > timeout)
    }
}

/// A single distribution archive URL bound to one scan. Owned exclusively by
/// its scan; deleted along with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadUrl {
    pub id: Uuid,
    pub scan_id: Uuid,
    pub url: String,
}
