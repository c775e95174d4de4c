use serde::{Deserialize, Serialize};

/// A worker's terminal report for a job.
///
/// The two variants are distinguished structurally: a failure body carries
/// `reason` and nothing else; a success body carries `commit` and the scan
/// results. No explicit discriminant field is sent over the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Verdict {
    Success(SuccessVerdict),
    Failure(FailureVerdict),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessVerdict {
    pub name: String,
    pub version: String,
    pub commit: String,
    #[serde(default)]
    pub score: i32,
    #[serde(default)]
    pub inspector_url: Option<String>,
    #[serde(default)]
    pub rules_matched: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureVerdict {
    pub name: String,
    pub version: String,
    pub reason: String,
}

impl Verdict {
    pub fn name(&self) -> &str {
        match self {
            Self::Success(s) => &s.name,
            Self::Failure(f) => &f.name,
        }
    }

    pub fn version(&self) -> &str {
        match self {
            Self::Success(s) => &s.version,
            Self::Failure(f) => &f.version,
        }
    }
}
