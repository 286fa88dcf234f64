//! Job control: shared abort tokens for cooperative pause/cancel, and the
//! attempt-token bookkeeping that guards against a superseded attempt
//! retroactively completing or failing a job it no longer owns — `spec.md`
//! §4.2 and the "Attempt token" glossary entry.
//!
//! Grounded in the teacher's `control.rs` `JobControl` abort-token registry;
//! the teacher's Unix-socket-based out-of-process control (`control_socket.rs`)
//! has no counterpart here since §6 describes an in-process function table,
//! not a wire protocol, and is dropped in the trim pass.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::model::JobId;

/// Error returned when a download is stopped by user pause/cancel at a
/// cooperative checkpoint.
#[derive(Debug)]
pub struct JobAborted;

impl std::fmt::Display for JobAborted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "job aborted by user")
    }
}

impl std::error::Error for JobAborted {}

/// Why an attempt was asked to stop — decides what the pipeline does with a
/// job's temp artifact on abort (`spec.md` §4.4: "leave temp artifact iff
/// status is paused; delete it iff status is cancelled").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    Pause,
    Cancel,
}

/// Per-attempt state handed to a worker when the scheduler dispatches a job.
#[derive(Clone)]
pub struct AttemptHandle {
    pub token: String,
    abort: Arc<AtomicBool>,
    reason: Arc<RwLock<Option<AbortReason>>>,
}

impl AttemptHandle {
    pub fn should_abort(&self) -> bool {
        self.abort.load(Ordering::Relaxed)
    }

    /// Why the current attempt was aborted, if it was. `None` if
    /// `should_abort()` is false, or if abort was requested without a reason
    /// (never happens via `JobControl::request_abort`, but kept fallible
    /// rather than panicking on an unexpected state).
    pub fn abort_reason(&self) -> Option<AbortReason> {
        *self.reason.read().unwrap()
    }
}

/// Shared registry of job id -> current attempt. Used by the scheduler to
/// hand an abort token to each dispatched job and by the control surface to
/// signal pause/cancel.
#[derive(Default)]
pub struct JobControl {
    attempts: RwLock<HashMap<JobId, AttemptHandle>>,
}

impl JobControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly dispatched attempt, returning its handle. Replaces
    /// any prior attempt for the same job id — the old handle's token no
    /// longer matches, so a late callback from it is recognized as stale by
    /// `is_current`.
    pub fn register(&self, job_id: JobId, token: String) -> AttemptHandle {
        let handle = AttemptHandle {
            token,
            abort: Arc::new(AtomicBool::new(false)),
            reason: Arc::new(RwLock::new(None)),
        };
        self.attempts
            .write()
            .unwrap()
            .insert(job_id, handle.clone());
        handle
    }

    /// Unregister a job (call when its attempt finishes, success or failure).
    pub fn unregister(&self, job_id: &JobId) {
        self.attempts.write().unwrap().remove(job_id);
    }

    /// Request abort for a job's current attempt (pause or cancel). The
    /// worker observes the token at the next cooperative checkpoint.
    pub fn request_abort(&self, job_id: &JobId, reason: AbortReason) {
        if let Some(handle) = self.attempts.read().unwrap().get(job_id) {
            *handle.reason.write().unwrap() = Some(reason);
            handle.abort.store(true, Ordering::Relaxed);
        }
    }

    /// Job ids with a currently registered attempt — used by shutdown to
    /// fan out an abort signal to every in-flight worker.
    pub fn active_job_ids(&self) -> Vec<JobId> {
        self.attempts.read().unwrap().keys().cloned().collect()
    }

    /// Whether `token` is still the registered attempt for `job_id`. A worker
    /// whose token fails this check has been superseded (e.g. by a forced
    /// retry re-dispatch) and must not mutate the job's terminal status.
    pub fn is_current(&self, job_id: &JobId, token: &str) -> bool {
        self.attempts
            .read()
            .unwrap()
            .get(job_id)
            .map(|h| h.token == token)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_is_observed_by_handle() {
        let control = JobControl::new();
        let handle = control.register("job1".to_string(), "t1".to_string());
        assert!(!handle.should_abort());
        control.request_abort(&"job1".to_string(), AbortReason::Cancel);
        assert!(handle.should_abort());
        assert_eq!(handle.abort_reason(), Some(AbortReason::Cancel));
    }

    #[test]
    fn re_register_supersedes_prior_attempt() {
        let control = JobControl::new();
        let first = control.register("job1".to_string(), "t1".to_string());
        assert!(control.is_current(&"job1".to_string(), "t1"));

        let _second = control.register("job1".to_string(), "t2".to_string());
        assert!(!control.is_current(&"job1".to_string(), "t1"));
        assert!(control.is_current(&"job1".to_string(), "t2"));
        // The old handle still exists and can be aborted independently, but
        // its token is no longer current, so callers must check is_current
        // before honoring a completion from it.
        assert!(!first.should_abort());
    }

    #[test]
    fn unregister_clears_current_attempt() {
        let control = JobControl::new();
        control.register("job1".to_string(), "t1".to_string());
        control.unregister(&"job1".to_string());
        assert!(!control.is_current(&"job1".to_string(), "t1"));
    }
}
