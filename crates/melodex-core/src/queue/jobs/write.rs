//! Job write operations — `spec.md` §4.1: Insert, UpdateStatus (CAS),
//! UpdateProgress (unconditional), IncrementParentCounters, Delete (cascade),
//! ClearCompleted.

use anyhow::Result;
use sqlx::Row;

use super::super::db::{unix_timestamp, QueueStore};
use crate::error::CoreError;
use crate::model::{Job, JobStatus};

impl QueueStore {
    /// Insert a new job. Fails with `AlreadyQueued` if `id` collides with any
    /// row not already in a terminal status.
    pub async fn insert(&self, job: &Job) -> Result<(), CoreError> {
        if let Ok(Some(existing)) = self.get(&job.id).await {
            if !existing.status.is_terminal() {
                return Err(CoreError::AlreadyQueued(job.id.clone()));
            }
        }

        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, kind, parent_id, title, artist, quality, status,
                progress, bytes_downloaded, total_bytes, error,
                created_at, updated_at, completed_at, retry_count, attempt_token,
                total_tracks, completed_tracks, failed_tracks
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7,
                ?8, ?9, ?10, ?11,
                ?12, ?13, ?14, ?15, ?16,
                ?17, ?18, ?19
            )
            ON CONFLICT(id) DO UPDATE SET
                kind = excluded.kind,
                parent_id = excluded.parent_id,
                title = excluded.title,
                artist = excluded.artist,
                quality = excluded.quality,
                status = excluded.status,
                progress = excluded.progress,
                bytes_downloaded = excluded.bytes_downloaded,
                total_bytes = excluded.total_bytes,
                error = excluded.error,
                updated_at = excluded.updated_at,
                completed_at = excluded.completed_at,
                retry_count = excluded.retry_count,
                attempt_token = excluded.attempt_token,
                total_tracks = excluded.total_tracks,
                completed_tracks = excluded.completed_tracks,
                failed_tracks = excluded.failed_tracks
            "#,
        )
        .bind(&job.id)
        .bind(job.kind.as_str())
        .bind(&job.parent_id)
        .bind(&job.title)
        .bind(&job.artist)
        .bind(job.quality.as_str())
        .bind(job.status.as_str())
        .bind(job.progress as i64)
        .bind(job.bytes_downloaded as i64)
        .bind(job.total_bytes.map(|v| v as i64))
        .bind(&job.error)
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(job.completed_at)
        .bind(job.retry_count as i64)
        .bind(&job.attempt_token)
        .bind(job.total_tracks.map(|v| v as i64))
        .bind(job.completed_tracks.map(|v| v as i64))
        .bind(job.failed_tracks.map(|v| v as i64))
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::Internal(e.to_string()))?;

        Ok(())
    }

    /// Conditional status transition: succeeds only if the row's current
    /// status equals `from`. `patch` fields, when `Some`, are written in the
    /// same statement.
    #[allow(clippy::too_many_arguments)]
    pub async fn update_status(
        &self,
        id: &str,
        from: JobStatus,
        to: JobStatus,
        progress: Option<u8>,
        bytes_downloaded: Option<u64>,
        total_bytes: Option<u64>,
        error: Option<String>,
        completed_at: Option<i64>,
        attempt_token: Option<String>,
    ) -> Result<(), CoreError> {
        if !from.can_transition_to(to) {
            return Err(CoreError::Internal(format!(
                "illegal status transition {:?} -> {:?}",
                from, to
            )));
        }
        let now = unix_timestamp();

        let affected = sqlx::query(
            r#"
            UPDATE jobs SET
                status = ?1,
                progress = COALESCE(?2, progress),
                bytes_downloaded = COALESCE(?3, bytes_downloaded),
                total_bytes = COALESCE(?4, total_bytes),
                error = COALESCE(?5, error),
                completed_at = COALESCE(?6, completed_at),
                attempt_token = COALESCE(?7, attempt_token),
                updated_at = ?8
            WHERE id = ?9 AND status = ?10
            "#,
        )
        .bind(to.as_str())
        .bind(progress.map(|v| v as i64))
        .bind(bytes_downloaded.map(|v| v as i64))
        .bind(total_bytes.map(|v| v as i64))
        .bind(error)
        .bind(completed_at)
        .bind(attempt_token)
        .bind(now)
        .bind(id)
        .bind(from.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::Internal(e.to_string()))?
        .rows_affected();

        if affected == 1 {
            Ok(())
        } else {
            Err(CoreError::StaleState)
        }
    }

    /// Unconditional fast path used by the worker while streaming bytes;
    /// never transitions status.
    pub async fn update_progress(
        &self,
        id: &str,
        progress: u8,
        bytes_downloaded: u64,
        total_bytes: Option<u64>,
    ) -> Result<()> {
        let now = unix_timestamp();
        sqlx::query(
            r#"
            UPDATE jobs SET
                progress = ?1,
                bytes_downloaded = ?2,
                total_bytes = COALESCE(?3, total_bytes),
                updated_at = ?4
            WHERE id = ?5
            "#,
        )
        .bind(progress as i64)
        .bind(bytes_downloaded as i64)
        .bind(total_bytes.map(|v| v as i64))
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Atomic read-modify-write of a parent's counters; returns the updated
    /// row so the caller can decide whether the parent is now complete.
    pub async fn increment_parent_counters(
        &self,
        parent_id: &str,
        completed_delta: i64,
        failed_delta: i64,
    ) -> Result<Job> {
        let now = unix_timestamp();
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            UPDATE jobs SET
                completed_tracks = COALESCE(completed_tracks, 0) + ?1,
                failed_tracks = COALESCE(failed_tracks, 0) + ?2,
                updated_at = ?3
            WHERE id = ?4
            "#,
        )
        .bind(completed_delta)
        .bind(failed_delta)
        .bind(now)
        .bind(parent_id)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query("SELECT * FROM jobs WHERE id = ?1")
            .bind(parent_id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(super::read::row_to_job(&row))
    }

    /// Set `retry_count` directly, independent of a status transition —
    /// used both by the scheduler's automatic retry bookkeeping and by a
    /// manual `RetryDownload` resetting the counter to 0 (`spec.md` §4.2).
    pub async fn set_retry_count(&self, id: &str, retry_count: u32) -> Result<()> {
        let now = unix_timestamp();
        sqlx::query("UPDATE jobs SET retry_count = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(retry_count as i64)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete a job; cascades to children when `id` is a parent (enforced by
    /// the `ON DELETE CASCADE` foreign key).
    pub async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM jobs WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete all `completed` rows. Parents with unfinished children are
    /// untouched because only rows whose own status is `completed` match.
    pub async fn clear_completed(&self) -> Result<u64> {
        let affected = sqlx::query("DELETE FROM jobs WHERE status = 'completed'")
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(affected)
    }
}
