//! Job data model: kinds, status, the closed transition table, and the tag set
//! handed to the [`crate::tagger`] stage.

use serde::{Deserialize, Serialize};

/// Job identifier. Caller-supplied and stable (track/album/playlist id from the
/// provider), not a store-assigned row id — see `SPEC_FULL.md` §3.
pub type JobId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Track,
    Album,
    Playlist,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::Track => "track",
            JobKind::Album => "album",
            JobKind::Playlist => "playlist",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "track" => Some(JobKind::Track),
            "album" => Some(JobKind::Album),
            "playlist" => Some(JobKind::Playlist),
            _ => None,
        }
    }
}

/// Closed status set. See `spec.md` §3 for the allowed-transition table; enforced
/// by [`crate::queue::JobStatus::can_transition_to`] and by the store's
/// conditional `UpdateStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Downloading,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Downloading => "downloading",
            JobStatus::Paused => "paused",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "downloading" => Some(JobStatus::Downloading),
            "paused" => Some(JobStatus::Paused),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }

    /// The allowed-transitions table from `spec.md` §3. Terminal states allow no
    /// further transitions.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Downloading)
                | (Pending, Cancelled)
                | (Downloading, Paused)
                | (Downloading, Completed)
                | (Downloading, Failed)
                | (Downloading, Cancelled)
                | (Paused, Downloading)
                | (Paused, Cancelled)
                | (Failed, Pending)
                | (Failed, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Cancelled)
    }
}

/// Quality is opaque to the core: stored immutably on the job, forwarded to
/// `MetadataProvider::resolve_download_url`, never interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Mp3_128,
    Mp3_320,
    Flac,
}

impl Quality {
    pub fn as_str(self) -> &'static str {
        match self {
            Quality::Mp3_128 => "mp3_128",
            Quality::Mp3_320 => "mp3_320",
            Quality::Flac => "flac",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "mp3_128" => Some(Quality::Mp3_128),
            "mp3_320" => Some(Quality::Mp3_320),
            "flac" => Some(Quality::Flac),
            _ => None,
        }
    }
}

/// One row of the queue: a parent (album/playlist) or a child (track).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub parent_id: Option<JobId>,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub quality: Quality,
    pub status: JobStatus,
    pub progress: u8,
    pub bytes_downloaded: u64,
    pub total_bytes: Option<u64>,
    pub error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub completed_at: Option<i64>,
    pub retry_count: u32,
    pub attempt_token: Option<String>,
    /// Parent-only counters; `None` for children.
    pub total_tracks: Option<u32>,
    pub completed_tracks: Option<u32>,
    pub failed_tracks: Option<u32>,
}

impl Job {
    /// True iff this is a partial-success parent: some children completed, some
    /// failed. Derived, never stored — `spec.md` §3.
    pub fn is_partial_success(&self) -> bool {
        matches!((self.completed_tracks, self.failed_tracks), (Some(c), Some(f)) if c > 0 && f > 0)
    }
}

/// Typed metadata record handed from `MetadataProvider::get_track_metadata` to the
/// pipeline's Tag stage. Unknown/extra fields beyond this set are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagSet {
    pub title: String,
    pub artist: Vec<String>,
    pub album: String,
    pub track_number: Option<u32>,
    pub disc_number: Option<u32>,
    /// ISO-8601 date, stored as a plain string (the core never parses it further).
    pub release_date: Option<String>,
    pub genres: Vec<String>,
    #[serde(skip)]
    pub cover_jpeg: Option<Vec<u8>>,
    pub lyrics_plain: Option<String>,
    pub lyrics_synced: Option<String>,
}
