//! Core data model: scans, rules, download URLs, and verdicts.

mod rule;
mod scan;
mod verdict;

pub use rule::Rule;
pub use scan::{DownloadUrl, Scan, ScanStatus};
pub use verdict::{FailureVerdict, SuccessVerdict, Verdict};
