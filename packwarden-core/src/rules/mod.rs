//! Materializes the active YARA rule bundle from the upstream rule
//! repository and caches it behind an atomic pointer swap so readers never
//! block on network I/O.

use std::io::Read;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::{CoreError, CoreResult};

/// Access tokens equal to this value short-circuit `Fetch`: no network call
/// is made and an empty snapshot stamped with commit `"test"` is returned.
/// Lets integration tests and local runs exercise the dispatch path without
/// a real GitHub token.
pub const TEST_TOKEN: &str = "test";

const RULE_EXTENSION: &str = ".yara";

/// Immutable `(commit, {name -> body})` snapshot of the active rule bundle.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleSnapshot {
    pub commit_hash: String,
    pub rules: std::collections::BTreeMap<String, String>,
}

/// Fetches, caches, and republishes the rule snapshot.
///
/// `Current` never fails and never blocks on I/O; `Refresh` fetches a new
/// snapshot and only swaps it in on success, leaving the previous snapshot
/// (and any rule names it introduced) untouched on failure.
pub struct RuleSnapshotService {
    http: reqwest::Client,
    repository: String,
    access_token: String,
    current: RwLock<Arc<RuleSnapshot>>,
}

impl RuleSnapshotService {
    pub fn new(http: reqwest::Client, repository: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            http,
            repository: repository.into(),
            access_token: access_token.into(),
            current: RwLock::new(Arc::new(RuleSnapshot::default())),
        }
    }

    /// Returns the most recently materialized snapshot without blocking on
    /// network I/O.
    pub async fn current(&self) -> Arc<RuleSnapshot> {
        self.current.read().expect("rule snapshot lock poisoned").clone()
    }

    /// Fetches a fresh snapshot from the upstream repository, or an empty
    /// one immediately if the configured token is the test sentinel.
    pub async fn fetch(&self) -> CoreResult<RuleSnapshot> {
        if self.access_token == TEST_TOKEN {
            return Ok(RuleSnapshot {
                commit_hash: "test".to_string(),
                rules: std::collections::BTreeMap::new(),
            });
        }

        let commit_hash = self.fetch_commit_hash().await?;
        let rules = self.fetch_and_parse_zip().await?;

        Ok(RuleSnapshot { commit_hash, rules })
    }

    async fn fetch_commit_hash(&self) -> CoreResult<String> {
        let url = format!("https://api.github.com/repos/{}/commits/main", self.repository);
        let response = self
            .http
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.access_token))
            .header("Accept", "application/vnd.github.sha")
            .send()
            .await?
            .error_for_status()?;
        Ok(response.text().await?)
    }

    async fn fetch_and_parse_zip(&self) -> CoreResult<std::collections::BTreeMap<String, String>> {
        let url = format!("https://api.github.com/repos/{}/zipball/", self.repository);
        let response = self
            .http
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.access_token))
            .send()
            .await?
            .error_for_status()?;
        let bytes = response.bytes().await?;

        let cursor = std::io::Cursor::new(bytes);
        let mut archive = zip::ZipArchive::new(cursor)
            .map_err(|e| CoreError::upstream(format!("malformed rule archive: {e}")))?;

        let mut rules = std::collections::BTreeMap::new();
        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .map_err(|e| CoreError::upstream(format!("malformed rule archive entry: {e}")))?;

            let name = entry.name().to_string();
            if !name.ends_with(RULE_EXTENSION) {
                continue;
            }

            let stem = name
                .rsplit('/')
                .next()
                .unwrap_or(&name)
                .trim_end_matches(RULE_EXTENSION)
                .to_string();

            let mut contents = String::new();
            entry
                .read_to_string(&mut contents)
                .map_err(|e| CoreError::upstream(format!("rule file {name} is not valid UTF-8: {e}")))?;

            rules.insert(stem, contents);
        }

        Ok(rules)
    }

    /// Fetches a new snapshot and, on success, atomically publishes it.
    /// Propagates upstream failures; on failure the previous snapshot stays
    /// current.
    pub async fn refresh(&self) -> CoreResult<Arc<RuleSnapshot>> {
        match self.fetch().await {
            Ok(snapshot) => {
                info!(commit = %snapshot.commit_hash, rule_count = snapshot.rules.len(), "rule snapshot refreshed");
                let arc = Arc::new(snapshot);
                *self.current.write().expect("rule snapshot lock poisoned") = arc.clone();
                Ok(arc)
            }
            Err(err) => {
                error!(error = %err, "rule snapshot refresh failed, keeping previous snapshot");
                Err(err)
            }
        }
    }

    /// Replaces the current snapshot directly, bypassing the network fetch.
    /// Used at startup once an initial refresh has succeeded, and by tests.
    pub fn publish(&self, snapshot: RuleSnapshot) {
        *self.current.write().expect("rule snapshot lock poisoned") = Arc::new(snapshot);
    }
}

/// Names that are new relative to the given rule set.
pub fn new_rule_names<'a>(snapshot: &'a RuleSnapshot, known: &std::collections::HashSet<String>) -> Vec<&'a str> {
    snapshot
        .rules
        .keys()
        .filter(|name| !known.contains(name.as_str()))
        .map(String::as_str)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service_with_token(token: &str) -> RuleSnapshotService {
        RuleSnapshotService::new(reqwest::Client::new(), "vipyrsec/security-intelligence", token)
    }

    #[tokio::test]
    async fn test_token_short_circuits_fetch() {
        let service = service_with_token(TEST_TOKEN);
        let snapshot = service.fetch().await.unwrap();
        assert_eq!(snapshot.commit_hash, "test");
        assert!(snapshot.rules.is_empty());
    }

    #[tokio::test]
    async fn current_returns_default_before_first_refresh() {
        let service = service_with_token("irrelevant");
        let current = service.current().await;
        assert_eq!(current.commit_hash, "");
    }

    #[tokio::test]
    async fn publish_swaps_current_snapshot() {
        let service = service_with_token("irrelevant");
        let mut rules = std::collections::BTreeMap::new();
        rules.insert("r1".to_string(), "rule r1 { condition: true }".to_string());
        service.publish(RuleSnapshot { commit_hash: "abc123".to_string(), rules });

        let current = service.current().await;
        assert_eq!(current.commit_hash, "abc123");
        assert!(current.rules.contains_key("r1"));
    }
}
