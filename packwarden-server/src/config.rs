//! Server configuration loaded from environment variables.
//!
//! Unlike the teacher's layered, file-backed scanner config, this is flat
//! env-var config: spec.md §6 names a fixed set of variables and no file
//! format for them.

use std::env;

use tracing::{info, warn};

/// Configuration loaded via environment variables, per spec.md §6.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_url: String,
    pub db_connection_pool_persistent_size: u32,
    pub db_connection_pool_max_size: u32,

    /// Lease timeout, in seconds, that drives PENDING-job reclamation.
    pub job_timeout_secs: i64,

    /// Size of the in-process job cache (§4.C). `<= 1` disables it.
    pub job_cache_size: i64,

    pub reporter_url: String,
    pub github_token: String,
    pub rules_repository: String,

    /// Base URL for PyPI's per-release JSON API, used to resolve
    /// distribution URLs when queuing a scan and to check reachability
    /// when validating a report (spec.md §4.F step 5).
    pub pypi_api_url: String,

    pub auth0_domain: Option<String>,
    pub auth0_audience: Option<String>,

    pub log_config_file: Option<String>,

    /// Score at or above which a finished scan is surfaced in the
    /// malicious-package digest (`GET /scans?since=`).
    pub score_threshold: i32,

    pub server_host: String,
    pub server_port: u16,

    // Sentry-style observability keys: parsed but inert per spec.md §1's
    // non-goal on log shipping/metric exporters/tracing.
    pub sentry_dsn: Option<String>,
    pub sentry_environment: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            db_url: env::var("DATABASE_URL")
                .or_else(|_| env::var("db_url"))
                .unwrap_or_else(|_| "postgres://localhost/packwarden".to_string()),

            db_connection_pool_persistent_size: env::var("db_connection_pool_persistent_size")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),

            db_connection_pool_max_size: env::var("db_connection_pool_max_size")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),

            job_timeout_secs: env::var("job_timeout")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(120),

            job_cache_size: env::var("job_cache_size")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),

            reporter_url: env::var("reporter_url")
                .unwrap_or_else(|_| "https://pypi.org/_/observations".to_string()),

            github_token: env::var("github_token")
                .unwrap_or_else(|_| packwarden_core::rules::TEST_TOKEN.to_string()),

            rules_repository: env::var("rules_repository")
                .unwrap_or_else(|_| "vipyrsec/security-intelligence".to_string()),

            pypi_api_url: env::var("pypi_api_url").unwrap_or_else(|_| "https://pypi.org/pypi".to_string()),

            auth0_domain: env::var("auth0_domain").ok(),
            auth0_audience: env::var("auth0_audience").ok(),

            log_config_file: env::var("log_config_file").ok(),

            score_threshold: env::var("score_threshold")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),

            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .unwrap_or(8000),

            sentry_dsn: env::var("sentry_dsn").ok(),
            sentry_environment: env::var("sentry_environment").ok(),
        };

        config.log_startup();
        Ok(config)
    }

    fn log_startup(&self) {
        info!(
            pool_persistent = self.db_connection_pool_persistent_size,
            pool_max = self.db_connection_pool_max_size,
            job_timeout_secs = self.job_timeout_secs,
            job_cache_size = self.job_cache_size,
            "server configuration loaded"
        );
        if self.github_token == packwarden_core::rules::TEST_TOKEN {
            warn!("github_token is the test sentinel value; rule snapshot fetch is short-circuited");
        }
        if self.sentry_dsn.is_some() {
            info!("sentry_dsn configured (observability export is out of scope, key is inert)");
        }
        if self.auth0_domain.is_none() || self.auth0_audience.is_none() {
            warn!("auth0_domain/auth0_audience not fully configured; auth boundary will accept any bearer token as its own subject");
        }
    }
}
