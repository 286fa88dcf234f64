//! Job read operations: get and list — `spec.md` §4.1.

use anyhow::Result;
use sqlx::Row;

use super::super::db::QueueStore;
use super::super::{JobCounts, JobPage};
use crate::model::{Job, JobKind, JobStatus, Quality};

pub(super) fn row_to_job(row: &sqlx::sqlite::SqliteRow) -> Job {
    let kind_str: String = row.get("kind");
    let status_str: String = row.get("status");
    let quality_str: String = row.get("quality");
    Job {
        id: row.get("id"),
        kind: JobKind::from_str(&kind_str).unwrap_or(JobKind::Track),
        parent_id: row.get("parent_id"),
        title: row.get("title"),
        artist: row.get("artist"),
        quality: Quality::from_str(&quality_str).unwrap_or(Quality::Mp3_320),
        status: JobStatus::from_str(&status_str).unwrap_or(JobStatus::Failed),
        progress: row.get::<i64, _>("progress") as u8,
        bytes_downloaded: row.get::<i64, _>("bytes_downloaded") as u64,
        total_bytes: row.get::<Option<i64>, _>("total_bytes").map(|v| v as u64),
        error: row.get("error"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        completed_at: row.get("completed_at"),
        retry_count: row.get::<i64, _>("retry_count") as u32,
        attempt_token: row.get("attempt_token"),
        total_tracks: row.get::<Option<i64>, _>("total_tracks").map(|v| v as u32),
        completed_tracks: row
            .get::<Option<i64>, _>("completed_tracks")
            .map(|v| v as u32),
        failed_tracks: row.get::<Option<i64>, _>("failed_tracks").map(|v| v as u32),
    }
}

impl QueueStore {
    /// Fetch a single job by id.
    pub async fn get(&self, id: &str) -> Result<Option<Job>> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_job))
    }

    /// List jobs, stable order by `created_at`, then `id` — `spec.md` §4.1.
    /// `filter_status`, if given, restricts to that status only.
    pub async fn list(
        &self,
        offset: u64,
        limit: u64,
        filter_status: Option<JobStatus>,
    ) -> Result<JobPage> {
        let (rows, total) = if let Some(status) = filter_status {
            let status = status.as_str();
            let rows = sqlx::query(
                "SELECT * FROM jobs WHERE status = ?1 ORDER BY created_at ASC, id ASC LIMIT ?2 OFFSET ?3",
            )
            .bind(status)
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await?;
            let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE status = ?1")
                .bind(status)
                .fetch_one(&self.pool)
                .await?;
            (rows, total)
        } else {
            let rows = sqlx::query(
                "SELECT * FROM jobs ORDER BY created_at ASC, id ASC LIMIT ?1 OFFSET ?2",
            )
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await?;
            let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
                .fetch_one(&self.pool)
                .await?;
            (rows, total)
        };

        Ok(JobPage {
            items: rows.iter().map(row_to_job).collect(),
            total: total as u64,
        })
    }

    /// Snapshot of row counts by status, for the bus's `QueueStats` event.
    pub async fn counts(&self) -> Result<JobCounts> {
        let rows = sqlx::query("SELECT status, COUNT(*) as n FROM jobs GROUP BY status")
            .fetch_all(&self.pool)
            .await?;
        let mut counts = JobCounts::default();
        for row in rows {
            let status: String = row.get("status");
            let n: i64 = row.get("n");
            let n = n as u64;
            counts.total += n;
            match status.as_str() {
                "pending" => counts.pending = n,
                "downloading" => counts.downloading = n,
                "completed" => counts.completed = n,
                "failed" => counts.failed = n,
                _ => {}
            }
        }
        Ok(counts)
    }

    /// All children of `parent_id`, any status — used by cancel propagation.
    pub async fn list_children(&self, parent_id: &str) -> Result<Vec<Job>> {
        let rows = sqlx::query("SELECT * FROM jobs WHERE parent_id = ?1 ORDER BY created_at ASC, id ASC")
            .bind(parent_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_job).collect())
    }

    /// Count children of `parent_id` currently `downloading` — used by the
    /// scheduler's per-parent cap check (`spec.md` §4.2).
    pub async fn count_downloading_children(&self, parent_id: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM jobs WHERE parent_id = ?1 AND status = 'downloading'",
        )
        .bind(parent_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }

    /// Atomically select and dispatch the oldest `pending` child whose parent
    /// (if any) is under `per_parent_cap` — `spec.md` §4.2 steps 2–3. Returns
    /// the dispatched job id, or `None` if nothing is eligible.
    pub async fn dispatch_next_pending(
        &self,
        per_parent_cap: u64,
        attempt_token: &str,
    ) -> Result<Option<String>> {
        let now = super::super::db::unix_timestamp();
        let mut tx = self.pool.begin().await?;
        // Only `track` rows are ever dispatched to a worker: album/playlist
        // parents are bookkeeping rows whose own status tracks their
        // children's aggregate progress, never a download in their own right.
        let candidates = sqlx::query(
            "SELECT id, parent_id FROM jobs WHERE status = 'pending' AND kind = 'track' ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(&mut *tx)
        .await?;

        for row in candidates {
            let id: String = row.get("id");
            let parent_id: Option<String> = row.get("parent_id");

            if let Some(parent) = &parent_id {
                let in_flight: i64 = sqlx::query_scalar(
                    "SELECT COUNT(*) FROM jobs WHERE parent_id = ?1 AND status = 'downloading'",
                )
                .bind(parent)
                .fetch_one(&mut *tx)
                .await?;
                if in_flight as u64 >= per_parent_cap {
                    continue;
                }
            }

            let affected = sqlx::query(
                "UPDATE jobs SET status = 'downloading', attempt_token = ?1, updated_at = ?2 WHERE id = ?3 AND status = 'pending'",
            )
            .bind(attempt_token)
            .bind(now)
            .bind(&id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if affected == 1 {
                tx.commit().await?;
                return Ok(Some(id));
            }
            // Raced with another dispatcher; try the next candidate within the
            // same transaction view.
        }

        tx.commit().await?;
        Ok(None)
    }
}
