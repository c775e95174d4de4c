use std::fmt;

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{DownloadUrl, Scan, ScanStatus, SuccessVerdict, Verdict};
use crate::error::{CoreError, CoreResult};

use super::{CatalogueStore, ScanQuery, Stats};

/// Postgres-backed implementation of [`CatalogueStore`].
pub struct PostgresCatalogueStore {
    pool: PgPool,
}

impl fmt::Debug for PostgresCatalogueStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresCatalogueStore")
            .field("pool_size", &self.pool.size())
            .field("idle_connections", &self.pool.num_idle())
            .finish()
    }
}

impl PostgresCatalogueStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn load_download_urls(
        executor: &PgPool,
        scan_id: Uuid,
    ) -> CoreResult<Vec<String>> {
        let rows = sqlx::query("SELECT url FROM download_urls WHERE scan_id = $1 ORDER BY url")
            .bind(scan_id)
            .fetch_all(executor)
            .await?;
        Ok(rows.into_iter().map(|row| row.get::<String, _>("url")).collect())
    }

    async fn load_rule_names(executor: &PgPool, scan_id: Uuid) -> CoreResult<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT r.name
            FROM package_rules pr
            JOIN rules r ON r.id = pr.rule_id
            WHERE pr.scan_id = $1
            ORDER BY r.name
            "#,
        )
        .bind(scan_id)
        .fetch_all(executor)
        .await?;
        Ok(rows.into_iter().map(|row| row.get::<String, _>("name")).collect())
    }

    fn scan_from_row(row: &sqlx::postgres::PgRow) -> CoreResult<Scan> {
        let status_str: String = row.get("status");
        Ok(Scan {
            scan_id: row.get("scan_id"),
            name: row.get("name"),
            version: row.get("version"),
            status: ScanStatus::try_from(status_str.as_str())?,
            score: row.get("score"),
            inspector_url: row.get("inspector_url"),
            commit_hash: row.get("commit_hash"),
            fail_reason: row.get("fail_reason"),
            queued_at: row.get("queued_at"),
            queued_by: row.get("queued_by"),
            pending_at: row.get("pending_at"),
            pending_by: row.get("pending_by"),
            finished_at: row.get("finished_at"),
            finished_by: row.get("finished_by"),
            reported_at: row.get("reported_at"),
            reported_by: row.get("reported_by"),
            download_urls: Vec::new(),
            rules: Vec::new(),
        })
    }

    async fn hydrate(&self, mut scan: Scan) -> CoreResult<Scan> {
        scan.download_urls = Self::load_download_urls(&self.pool, scan.scan_id).await?;
        scan.rules = Self::load_rule_names(&self.pool, scan.scan_id).await?;
        Ok(scan)
    }

    async fn hydrate_all(&self, scans: Vec<Scan>) -> CoreResult<Vec<Scan>> {
        let mut out = Vec::with_capacity(scans.len());
        for scan in scans {
            out.push(self.hydrate(scan).await?);
        }
        Ok(out)
    }

    /// Upserts `names` and attaches them to `scan_id`, all within `tx`. Used by
    /// both verdict finalization and the cache's deferred persistence path.
    async fn attach_rules(
        tx: &mut Transaction<'_, Postgres>,
        scan_id: Uuid,
        names: &[String],
    ) -> CoreResult<()> {
        for name in names {
            let rule_id: Uuid = sqlx::query_scalar(
                r#"
                INSERT INTO rules (id, name) VALUES ($1, $2)
                ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
                RETURNING id
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(name)
            .fetch_one(&mut **tx)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO package_rules (scan_id, rule_id) VALUES ($1, $2)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(scan_id)
            .bind(rule_id)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    /// Applies a success verdict within an already-open transaction. A
    /// no-op if the scan is already `FINISHED`. Shared by `finalize_success`
    /// (its own single-item transaction) and `finalize_batch` (one
    /// transaction for the whole batch).
    async fn finalize_success_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        scan_id: Uuid,
        result: &SuccessVerdict,
        finished_by: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM scans WHERE scan_id = $1 FOR UPDATE")
                .bind(scan_id)
                .fetch_optional(&mut **tx)
                .await?;

        let Some(status) = status else {
            return Err(CoreError::not_found(format!("scan {scan_id} not found")));
        };

        if status == ScanStatus::Finished.as_db_str() {
            return Ok(());
        }

        sqlx::query(
            r#"
            UPDATE scans
            SET status = 'FINISHED',
                finished_at = $1,
                finished_by = $2,
                score = $3,
                inspector_url = $4,
                commit_hash = $5
            WHERE scan_id = $6
            "#,
        )
        .bind(now)
        .bind(finished_by)
        .bind(result.score)
        .bind(&result.inspector_url)
        .bind(&result.commit)
        .bind(scan_id)
        .execute(&mut **tx)
        .await?;

        Self::attach_rules(tx, scan_id, &result.rules_matched).await?;
        Ok(())
    }

    /// Applies a failure verdict within an already-open transaction. A
    /// no-op if the scan is already `FINISHED`.
    async fn finalize_failure_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        scan_id: Uuid,
        reason: &str,
        finished_by: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM scans WHERE scan_id = $1 FOR UPDATE")
                .bind(scan_id)
                .fetch_optional(&mut **tx)
                .await?;

        let Some(status) = status else {
            return Err(CoreError::not_found(format!("scan {scan_id} not found")));
        };

        if status == ScanStatus::Finished.as_db_str() {
            return Ok(());
        }

        sqlx::query(
            r#"
            UPDATE scans
            SET status = 'FAILED', finished_at = $1, finished_by = $2, fail_reason = $3
            WHERE scan_id = $4
            "#,
        )
        .bind(now)
        .bind(finished_by)
        .bind(reason)
        .bind(scan_id)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl CatalogueStore for PostgresCatalogueStore {
    async fn insert_scan(
        &self,
        name: &str,
        version: &str,
        queued_by: &str,
        download_urls: Vec<String>,
    ) -> CoreResult<Scan> {
        let mut tx = self.pool.begin().await?;
        let scan_id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO scans (scan_id, name, version, status, queued_at, queued_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(scan_id)
        .bind(name)
        .bind(version)
        .bind(ScanStatus::Queued.as_db_str())
        .bind(now)
        .bind(queued_by)
        .execute(&mut *tx)
        .await?;

        for url in &download_urls {
            sqlx::query(
                "INSERT INTO download_urls (id, scan_id, url) VALUES ($1, $2, $3)",
            )
            .bind(Uuid::new_v4())
            .bind(scan_id)
            .bind(url)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(scan_id = %scan_id, name, version, "scan queued");

        Ok(Scan {
            scan_id,
            name: name.to_string(),
            version: version.to_string(),
            status: ScanStatus::Queued,
            score: None,
            inspector_url: None,
            commit_hash: None,
            fail_reason: None,
            queued_at: Some(now),
            queued_by: queued_by.to_string(),
            pending_at: None,
            pending_by: None,
            finished_at: None,
            finished_by: None,
            reported_at: None,
            reported_by: None,
            download_urls,
            rules: Vec::new(),
        })
    }

    async fn find_scans(&self, query: &ScanQuery) -> CoreResult<Vec<Scan>> {
        let rows = match query {
            ScanQuery::NameAndVersion { name, version } => {
                sqlx::query("SELECT * FROM scans WHERE name = $1 AND version = $2 ORDER BY queued_at DESC")
                    .bind(name)
                    .bind(version)
                    .fetch_all(&self.pool)
                    .await?
            }
            ScanQuery::NameSince { name, since } => {
                sqlx::query("SELECT * FROM scans WHERE name = $1 AND queued_at >= $2 ORDER BY queued_at DESC")
                    .bind(name)
                    .bind(since)
                    .fetch_all(&self.pool)
                    .await?
            }
            ScanQuery::Name { name } => {
                sqlx::query("SELECT * FROM scans WHERE name = $1 ORDER BY queued_at DESC")
                    .bind(name)
                    .fetch_all(&self.pool)
                    .await?
            }
            ScanQuery::Since { since } => {
                sqlx::query("SELECT * FROM scans WHERE queued_at >= $1 ORDER BY queued_at DESC")
                    .bind(since)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        let scans = rows.iter().map(Self::scan_from_row).collect::<CoreResult<Vec<_>>>()?;
        self.hydrate_all(scans).await
    }

    async fn find_ready(
        &self,
        limit: u32,
        exclude: &[(String, String)],
    ) -> CoreResult<Vec<Scan>> {
        let (names, versions): (Vec<&str>, Vec<&str>) = exclude
            .iter()
            .map(|(n, v)| (n.as_str(), v.as_str()))
            .unzip();

        let rows = sqlx::query(
            r#"
            SELECT *
            FROM scans
            WHERE status = 'QUEUED'
              AND NOT (name, version) IN (
                  SELECT * FROM UNNEST($1::text[], $2::text[])
              )
            ORDER BY queued_at ASC
            LIMIT $3
            "#,
        )
        .bind(&names[..])
        .bind(&versions[..])
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let scans = rows.iter().map(Self::scan_from_row).collect::<CoreResult<Vec<_>>>()?;
        self.hydrate_all(scans).await
    }

    async fn find_finished_since(&self, since: DateTime<Utc>) -> CoreResult<Vec<Scan>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM scans
            WHERE status IN ('FINISHED', 'FAILED') AND finished_at >= $1
            ORDER BY finished_at DESC
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        let scans = rows.iter().map(Self::scan_from_row).collect::<CoreResult<Vec<_>>>()?;
        self.hydrate_all(scans).await
    }

    async fn get_by_name_version(&self, name: &str, version: &str) -> CoreResult<Option<Scan>> {
        let row = sqlx::query("SELECT * FROM scans WHERE name = $1 AND version = $2")
            .bind(name)
            .bind(version)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(self.hydrate(Self::scan_from_row(&row)?).await?)),
            None => Ok(None),
        }
    }

    async fn find_other_reported(
        &self,
        name: &str,
        exclude_version: &str,
    ) -> CoreResult<Option<Scan>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM scans
            WHERE name = $1 AND version <> $2 AND reported_at IS NOT NULL
            ORDER BY reported_at DESC
            LIMIT 1
            "#,
        )
        .bind(name)
        .bind(exclude_version)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(Some(self.hydrate(Self::scan_from_row(&row)?).await?)),
            None => Ok(None),
        }
    }

    async fn lease_jobs(
        &self,
        batch: u32,
        leaseholder: &str,
        now: DateTime<Utc>,
        timeout: chrono::Duration,
    ) -> CoreResult<Vec<Scan>> {
        let mut tx = self.pool.begin().await?;
        let expiry_cutoff = now - timeout;

        let rows = sqlx::query(
            r#"
            WITH eligible AS (
                SELECT scan_id
                FROM scans
                WHERE status = 'QUEUED'
                   OR (status = 'PENDING' AND pending_at < $1)
                ORDER BY pending_at ASC NULLS FIRST, queued_at ASC
                FOR UPDATE SKIP LOCKED
                LIMIT $2
            )
            UPDATE scans
            SET status = 'PENDING', pending_at = $3, pending_by = $4
            FROM eligible
            WHERE scans.scan_id = eligible.scan_id
            RETURNING scans.*
            "#,
        )
        .bind(expiry_cutoff)
        .bind(batch as i64)
        .bind(now)
        .bind(leaseholder)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let scans = rows.iter().map(Self::scan_from_row).collect::<CoreResult<Vec<_>>>()?;
        let scans = self.hydrate_all(scans).await?;

        if !scans.is_empty() {
            info!(count = scans.len(), leaseholder, "leased jobs");
        }

        Ok(scans)
    }

    async fn finalize_success(
        &self,
        scan_id: Uuid,
        result: &SuccessVerdict,
        finished_by: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        let mut tx = self.pool.begin().await?;
        Self::finalize_success_in_tx(&mut tx, scan_id, result, finished_by, now).await?;
        tx.commit().await?;
        info!(scan_id = %scan_id, score = result.score, "scan finished");
        Ok(())
    }

    async fn finalize_failure(
        &self,
        scan_id: Uuid,
        reason: &str,
        finished_by: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        let mut tx = self.pool.begin().await?;
        Self::finalize_failure_in_tx(&mut tx, scan_id, reason, finished_by, now).await?;
        tx.commit().await?;
        warn!(scan_id = %scan_id, reason, "scan failed");
        Ok(())
    }

    /// Reconciles a batch of verdicts within a single transaction, so a
    /// crash mid-flush cannot leave the job cache's buffered results
    /// partially persisted (spec.md §4.C).
    async fn finalize_batch(
        &self,
        items: &[(Uuid, Verdict)],
        finished_by: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        if items.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for (scan_id, verdict) in items {
            match verdict {
                Verdict::Success(result) => {
                    Self::finalize_success_in_tx(&mut tx, *scan_id, result, finished_by, now).await?;
                }
                Verdict::Failure(failure) => {
                    Self::finalize_failure_in_tx(&mut tx, *scan_id, &failure.reason, finished_by, now).await?;
                }
            }
        }
        tx.commit().await?;
        info!(count = items.len(), "verdict batch persisted");
        Ok(())
    }

    async fn mark_reported(&self, scan_id: Uuid, subject: &str, now: DateTime<Utc>) -> CoreResult<()> {
        sqlx::query("UPDATE scans SET reported_at = $1, reported_by = $2 WHERE scan_id = $3")
            .bind(now)
            .bind(subject)
            .bind(scan_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert_rule_names(&self, names: &[String]) -> CoreResult<()> {
        let mut tx = self.pool.begin().await?;
        for name in names {
            sqlx::query(
                r#"
                INSERT INTO rules (id, name) VALUES ($1, $2)
                ON CONFLICT (name) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(name)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn stats(&self, now: DateTime<Utc>) -> CoreResult<Stats> {
        let since = now - chrono::Duration::hours(24);

        let ingested: i64 =
            sqlx::query_scalar("SELECT COUNT(*)::bigint FROM scans WHERE queued_at > $1")
                .bind(since)
                .fetch_one(&self.pool)
                .await?;

        let average_scan_time_secs: Option<f64> = sqlx::query_scalar(
            r#"
            SELECT EXTRACT(EPOCH FROM AVG(finished_at - pending_at))
            FROM scans
            WHERE status = 'FINISHED' AND finished_at > $1 AND pending_at IS NOT NULL
            "#,
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        let failed: i64 = sqlx::query_scalar(
            "SELECT COUNT(*)::bigint FROM scans WHERE status = 'FAILED' AND finished_at > $1",
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(Stats {
            ingested,
            average_scan_time_secs: average_scan_time_secs.unwrap_or(0.0),
            failed,
        })
    }
}
