//! Job and worker scheduler — `spec.md` §4.2/§5.
//!
//! Generalizes the teacher's `scheduler::parallel::run_jobs_parallel` (a
//! `JoinSet`-bounded loop that claims the next queued job and runs it to
//! completion, grounded together with `scheduler/run/shared.rs`'s
//! register-run-unregister pattern around a single job) from a single batch
//! run into a long-lived pool of worker tasks that keep polling the store
//! for work, apply the per-parent concurrency cap `run_jobs_parallel` never
//! needed, and route every finished attempt's outcome through the retry
//! policy.

mod budget;

pub use budget::{BudgetGuard, ConcurrencyBudget};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::task::JoinSet;

use crate::bus::{QueueStatsEvent, StatusEvent};
use crate::control::{AbortReason, JobControl};
use crate::error::CoreError;
use crate::model::{Job, JobKind, JobStatus};
use crate::pipeline::{self, PipelineContext, PipelineOutcome};
use crate::queue::QueueStore;
use crate::retry::RetryPolicy;

/// Idle backoff when a worker finds no eligible job, so an empty queue
/// doesn't spin the polling loop — no teacher analogue (`claim_next_queued_job`
/// is only ever called from a bounded batch run there, never from an
/// indefinitely-polling worker).
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Coordinates dispatch, concurrency limits, cancellation, and the
/// automatic retry policy. One instance per running core; cheap to share
/// via `Arc`.
pub struct Scheduler {
    queue: Arc<QueueStore>,
    control: Arc<JobControl>,
    budget: Arc<ConcurrencyBudget>,
    pipeline_ctx: PipelineContext,
    per_parent_cap: u64,
    retry_policy: RetryPolicy,
    shutting_down: Arc<AtomicBool>,
    attempt_counter: AtomicU64,
    workers: tokio::sync::Mutex<JoinSet<()>>,
}

impl Scheduler {
    /// `per_parent_cap` defaults to `concurrency` (`spec.md` §4.2: "tracks of
    /// a single album are never throttled against each other beyond the
    /// global cap").
    pub fn new(
        queue: Arc<QueueStore>,
        pipeline_ctx: PipelineContext,
        concurrency: usize,
        retry_policy: RetryPolicy,
    ) -> Arc<Self> {
        Arc::new(Self {
            queue,
            control: Arc::new(JobControl::new()),
            budget: Arc::new(ConcurrencyBudget::new(concurrency)),
            pipeline_ctx,
            per_parent_cap: concurrency as u64,
            retry_policy,
            shutting_down: Arc::new(AtomicBool::new(false)),
            attempt_counter: AtomicU64::new(0),
            workers: tokio::sync::Mutex::new(JoinSet::new()),
        })
    }

    pub fn control(&self) -> &Arc<JobControl> {
        &self.control
    }

    pub fn bus(&self) -> &crate::bus::CallbackBus {
        &self.pipeline_ctx.bus
    }

    /// Live-swap the output directory (`spec.md` §6 `SetDownloadPath`);
    /// takes effect for every job dispatched after the call, without
    /// restarting the scheduler or its workers.
    pub fn set_output_dir(&self, path: std::path::PathBuf) {
        *self.pipeline_ctx.output_dir.write().unwrap() = path;
    }

    /// Spawn `count` worker tasks (`spec.md` §5: "parallel worker tasks,
    /// sized to concurrency"). Each loops indefinitely, polling the store
    /// for work until `shutdown` is called.
    pub async fn start(self: &Arc<Self>, count: usize) {
        let mut workers = self.workers.lock().await;
        for _ in 0..count.max(1) {
            let scheduler = Arc::clone(self);
            workers.spawn(async move { scheduler.worker_loop().await });
        }
    }

    async fn worker_loop(self: Arc<Self>) {
        loop {
            if self.shutting_down.load(Ordering::Relaxed) {
                return;
            }
            if !self.try_dispatch_and_run().await {
                tokio::time::sleep(IDLE_POLL_INTERVAL).await;
            }
        }
    }

    /// One dispatch attempt: reserve a budget slot, try to claim a pending
    /// child (`spec.md` §4.2 steps 1-4), run its pipeline, and resolve the
    /// outcome. Returns `true` if a job was actually dispatched, so the
    /// caller skips the idle backoff.
    async fn try_dispatch_and_run(&self) -> bool {
        let Some(guard) = self.budget.try_acquire_one() else {
            return false;
        };

        let attempt_token = self.next_attempt_token();
        let job_id = match self
            .queue
            .dispatch_next_pending(self.per_parent_cap, &attempt_token)
            .await
        {
            Ok(Some(id)) => id,
            Ok(None) => return false,
            Err(e) => {
                tracing::warn!(error = %e, "dispatch_next_pending failed");
                return false;
            }
        };

        let job = match self.queue.get(&job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                tracing::warn!(job = %job_id, "dispatched job vanished before fetch");
                return true;
            }
            Err(e) => {
                tracing::warn!(job = %job_id, error = %e, "failed to fetch dispatched job");
                return true;
            }
        };

        self.emit_status(&job_id, JobStatus::Downloading, None).await;

        let attempt = self.control.register(job_id.clone(), attempt_token.clone());
        let outcome = pipeline::run(&self.pipeline_ctx, &job, &attempt).await;
        drop(guard);

        self.resolve_outcome(&job, &attempt_token, outcome).await;
        self.control.unregister(&job_id);
        true
    }

    fn next_attempt_token(&self) -> String {
        let n = self.attempt_counter.fetch_add(1, Ordering::Relaxed);
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        format!("attempt-{nanos}-{n}")
    }

    fn now(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64
    }

    /// Apply `spec.md` §4.2's outcome handling: success commits, transient
    /// failure goes through the linear retry policy, permanent failure goes
    /// to `failed`, and an abort is a no-op here (the requester already
    /// applied the paused/cancelled transition before signalling abort). Bails
    /// out before touching the store if `attempt_token` has been superseded
    /// (e.g. a forced re-dispatch already registered a newer attempt).
    async fn resolve_outcome(&self, job: &Job, attempt_token: &str, outcome: PipelineOutcome) {
        if !self.control.is_current(&job.id, attempt_token) {
            tracing::debug!(job = %job.id, "attempt superseded, dropping outcome");
            return;
        }
        match outcome {
            PipelineOutcome::Completed => {
                if let Err(e) = self
                    .queue
                    .update_status(
                        &job.id,
                        JobStatus::Downloading,
                        JobStatus::Completed,
                        Some(100),
                        None,
                        None,
                        None,
                        Some(self.now()),
                        None,
                    )
                    .await
                {
                    tracing::warn!(job = %job.id, error = %e, "failed to commit completed status");
                    return;
                }
                self.emit_status(&job.id, JobStatus::Completed, None).await;
                if let Some(parent_id) = &job.parent_id {
                    if let Err(e) = self.queue.increment_parent_counters(parent_id, 1, 0).await {
                        tracing::warn!(job = %job.id, parent = %parent_id, error = %e, "failed to increment parent completed counter");
                        return;
                    }
                    self.finalize_parent_if_done(parent_id).await;
                }
            }
            PipelineOutcome::TransientFailure(e) => {
                self.apply_transient_failure(job, attempt_token, e).await;
            }
            PipelineOutcome::PermanentFailure(e) => {
                self.fail_job(job, e).await;
            }
            PipelineOutcome::Aborted(_) => {
                // Status already transitioned by the pause/cancel request
                // itself; the scheduler has nothing further to commit.
            }
        }
    }

    /// Transient failure: `spec.md` §4.2's retry policy increments
    /// `retry_count` and, under the cap, sends the job back to `pending`
    /// after a linear backoff sleep. The model's status table has no direct
    /// `downloading -> pending` edge, so this goes through the allowed
    /// `downloading -> failed -> pending` hop instead of a same-call jump —
    /// both transitions are emitted on the bus, so a subscriber sees the job
    /// briefly `failed` mid-retry rather than an edge absent from the table
    /// (a deliberate reading of an otherwise contradictory spec passage, see
    /// `DESIGN.md`).
    async fn apply_transient_failure(&self, job: &Job, attempt_token: &str, error: CoreError) {
        let retry_count = job.retry_count + 1;
        match self.retry_policy.decide(retry_count) {
            crate::retry::RetryDecision::RetryAfter(delay) => {
                if let Err(e) = self
                    .queue
                    .update_status(
                        &job.id,
                        JobStatus::Downloading,
                        JobStatus::Failed,
                        None,
                        None,
                        None,
                        Some(error.to_string()),
                        None,
                        None,
                    )
                    .await
                {
                    tracing::warn!(job = %job.id, error = %e, "failed to record transient failure");
                    return;
                }
                self.emit_status(&job.id, JobStatus::Failed, Some(error.to_string())).await;
                if let Err(e) = self.queue.set_retry_count(&job.id, retry_count).await {
                    tracing::warn!(job = %job.id, error = %e, "failed to persist retry_count");
                }
                tracing::info!(
                    job = %job.id,
                    attempt = %attempt_token,
                    delay_secs = delay.as_secs(),
                    "transient failure, will retry"
                );
                tokio::time::sleep(delay).await;

                if let Err(e) = self
                    .queue
                    .update_status(
                        &job.id,
                        JobStatus::Failed,
                        JobStatus::Pending,
                        None,
                        None,
                        None,
                        None,
                        None,
                        None,
                    )
                    .await
                {
                    tracing::warn!(job = %job.id, error = %e, "failed to requeue after backoff");
                    return;
                }
                self.emit_status(&job.id, JobStatus::Pending, None).await;
            }
            crate::retry::RetryDecision::NoRetry => {
                self.fail_job(job, error).await;
            }
        }
    }

    async fn fail_job(&self, job: &Job, error: CoreError) {
        if let Err(e) = self
            .queue
            .update_status(
                &job.id,
                JobStatus::Downloading,
                JobStatus::Failed,
                None,
                None,
                None,
                Some(error.to_string()),
                None,
                None,
            )
            .await
        {
            tracing::warn!(job = %job.id, error = %e, "failed to commit failed status");
            return;
        }
        self.emit_status(&job.id, JobStatus::Failed, Some(error.to_string())).await;
        if let Some(parent_id) = &job.parent_id {
            if let Err(e) = self.queue.increment_parent_counters(parent_id, 0, 1).await {
                tracing::warn!(job = %job.id, parent = %parent_id, error = %e, "failed to increment parent failure counter");
                return;
            }
            self.finalize_parent_if_done(parent_id).await;
        }
    }

    /// A parent becomes `completed` the moment `completed_tracks +
    /// failed_tracks = total_tracks` (`spec.md` §3) — regardless of whether
    /// every child actually succeeded; partial success is derived from the
    /// counts at read time, never stored as its own status.
    async fn finalize_parent_if_done(&self, parent_id: &str) {
        let parent = match self.queue.get(parent_id).await {
            Ok(Some(p)) => p,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(parent = %parent_id, error = %e, "failed to refetch parent");
                return;
            }
        };
        let (Some(total), Some(completed), Some(failed)) =
            (parent.total_tracks, parent.completed_tracks, parent.failed_tracks)
        else {
            return;
        };
        if completed + failed < total || parent.status != JobStatus::Downloading {
            return;
        }
        if self
            .queue
            .update_status(
                parent_id,
                JobStatus::Downloading,
                JobStatus::Completed,
                Some(100),
                None,
                None,
                None,
                Some(self.now()),
                None,
            )
            .await
            .is_ok()
        {
            self.emit_status(parent_id, JobStatus::Completed, None).await;
        }
    }

    async fn emit_status(&self, job_id: &str, new_status: JobStatus, error: Option<String>) {
        self.pipeline_ctx.bus.emit_status(StatusEvent {
            job_id: job_id.to_string(),
            new_status,
            error,
        });
        if let Ok(counts) = self.queue.counts().await {
            self.pipeline_ctx.bus.emit_stats(QueueStatsEvent {
                total: counts.total,
                pending: counts.pending,
                downloading: counts.downloading,
                completed: counts.completed,
                failed: counts.failed,
            });
        }
    }

    /// Pause a `downloading` job: transitions it to `paused` and signals the
    /// in-flight attempt to stop at its next checkpoint, leaving the temp
    /// artifact on disk (`spec.md` §4.2).
    pub async fn pause(&self, job_id: &str) -> Result<(), CoreError> {
        self.queue
            .update_status(
                job_id,
                JobStatus::Downloading,
                JobStatus::Paused,
                None,
                None,
                None,
                None,
                None,
                None,
            )
            .await?;
        self.control.request_abort(&job_id.to_string(), AbortReason::Pause);
        self.emit_status(job_id, JobStatus::Paused, None).await;
        Ok(())
    }

    /// Resume a `paused` job back to `pending`; the scheduler will pick it
    /// up again and resume via HTTP Range against the preserved artifact.
    pub async fn resume(&self, job_id: &str) -> Result<(), CoreError> {
        self.queue
            .update_status(
                job_id,
                JobStatus::Paused,
                JobStatus::Pending,
                None,
                None,
                None,
                None,
                None,
                None,
            )
            .await?;
        self.emit_status(job_id, JobStatus::Pending, None).await;
        Ok(())
    }

    /// Cancel a job from any non-terminal status, signalling any in-flight
    /// attempt to stop and delete its temp artifact. If `job_id` is a
    /// parent, propagates to all non-terminal children (`spec.md` §4.2).
    pub async fn cancel(&self, job_id: &str) -> Result<(), CoreError> {
        let job = self
            .queue
            .get(job_id)
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))?
            .ok_or_else(|| CoreError::NotFound(job_id.to_string()))?;

        if job.status.is_terminal() {
            return Err(CoreError::StaleState);
        }

        self.queue
            .update_status(
                job_id,
                job.status,
                JobStatus::Cancelled,
                None,
                None,
                None,
                None,
                None,
                None,
            )
            .await?;
        self.control.request_abort(&job_id.to_string(), AbortReason::Cancel);
        self.emit_status(job_id, JobStatus::Cancelled, None).await;

        if matches!(job.kind, JobKind::Album | JobKind::Playlist) {
            let children = self
                .queue
                .list_children(job_id)
                .await
                .map_err(|e| CoreError::Internal(e.to_string()))?;
            for child in children {
                if child.status.is_terminal() {
                    continue;
                }
                if self
                    .queue
                    .update_status(
                        &child.id,
                        child.status,
                        JobStatus::Cancelled,
                        None,
                        None,
                        None,
                        None,
                        None,
                        None,
                    )
                    .await
                    .is_ok()
                {
                    self.emit_status(&child.id, JobStatus::Cancelled, None).await;
                }
                self.control.request_abort(&child.id, AbortReason::Cancel);
            }
        }
        Ok(())
    }

    /// Manual retry: `failed -> pending`, resetting `retry_count` to 0 —
    /// distinct from the scheduler's own automatic retry, which preserves
    /// `retry_count` across attempts (`spec.md` §4.2).
    pub async fn retry(&self, job_id: &str) -> Result<(), CoreError> {
        self.queue
            .update_status(
                job_id,
                JobStatus::Failed,
                JobStatus::Pending,
                None,
                None,
                None,
                Some(String::new()),
                None,
                None,
            )
            .await?;
        self.queue
            .set_retry_count(job_id, 0)
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))?;
        self.emit_status(job_id, JobStatus::Pending, None).await;
        Ok(())
    }

    /// Refuse new work, signal every in-flight attempt to abort, and wait
    /// (bounded) for workers to reach a checkpoint — `spec.md` §5's shutdown
    /// sequence.
    pub async fn shutdown(&self, timeout: Duration) {
        self.shutting_down.store(true, Ordering::Relaxed);
        for job_id in self.control.active_job_ids() {
            self.control.request_abort(&job_id, AbortReason::Pause);
        }
        let mut workers = self.workers.lock().await;
        let _ = tokio::time::timeout(timeout, async {
            while workers.join_next().await.is_some() {}
        })
        .await;
    }
}
