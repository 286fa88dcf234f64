//! Event payloads emitted on the [`super::CallbackBus`] — `spec.md` §4.5.

use crate::model::{JobId, JobStatus};

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub job_id: JobId,
    pub percent: u8,
    pub bytes_processed: u64,
    pub total_bytes: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct StatusEvent {
    pub job_id: JobId,
    pub new_status: JobStatus,
    pub error: Option<String>,
}

/// `spec.md` §9 Open Question: rather than overloading the byte fields of
/// `ProgressEvent` to carry track counts for album/playlist parents, this
/// event shape is kept separate — the resolution the spec adopts.
#[derive(Debug, Clone)]
pub struct QueueStatsEvent {
    pub total: u64,
    pub pending: u64,
    pub downloading: u64,
    pub completed: u64,
    pub failed: u64,
}
