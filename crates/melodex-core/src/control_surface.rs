//! `ControlSurface` — the in-process function table UI layers drive the
//! core through, `spec.md` §6.
//!
//! No teacher analogue: the teacher exposes an out-of-process Unix-socket
//! wire protocol (`control.rs`/`control_socket.rs`) for a GUI in a separate
//! process, where §6 instead describes a single function table called
//! in-process. Grounded in the teacher's `CliCommand::run_from_args`
//! top-level dispatch shape for "one method per operation, one error
//! taxonomy returned to the caller" and in `config::load_or_init`'s
//! load-validate-persist posture for `SetDownloadPath`.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::bus::{Callbacks, SinkRegistration};
use crate::config::CoreSettings;
use crate::error::CoreError;
use crate::metadata::MetadataProvider;
use crate::model::{Job, JobKind, JobStatus, Quality};
use crate::queue::{JobCounts, JobPage, QueueStore};
use crate::scheduler::Scheduler;

/// Stable, negative control-surface error codes — `spec.md` §6. Wraps
/// [`CoreError`] for the codes it already covers and adds the handful of
/// control-surface-only failure modes (`CoreError` has no notion of "the
/// scheduler never started").
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("core not initialized")]
    NotInitialized,
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("store error: {0}")]
    Store(String),
    #[error("migration failed: {0}")]
    MigrationFailed(String),
    #[error("scheduler start failed: {0}")]
    SchedulerStartFailed(String),
}

impl ControlError {
    pub fn control_code(&self) -> i32 {
        match self {
            ControlError::NotInitialized => -1,
            ControlError::Core(e) => e.control_code(),
            ControlError::Store(_) => -4,
            ControlError::MigrationFailed(_) => -5,
            ControlError::SchedulerStartFailed(_) => -6,
        }
    }
}

/// Custom list enqueue payload — `spec.md` §6's `{id, title, creator,
/// track_ids[]}`. `creator` has no dedicated `Job` column; it is stored in
/// the parent row's `artist` field, the closest existing attribute.
#[derive(Debug, Clone)]
pub struct CustomListRequest {
    pub id: String,
    pub title: String,
    pub creator: Option<String>,
    pub track_ids: Vec<String>,
}

/// Owns the store, scheduler, and metadata seam, and exposes exactly the
/// operation table `spec.md` §6 names. Cheap to share via `Arc`; every
/// method is `async` and talks to the store/scheduler, never blocking on UI
/// callbacks (those go out through the bus, not back through a return
/// value).
pub struct ControlSurface {
    queue: Arc<QueueStore>,
    scheduler: Arc<Scheduler>,
    metadata: Arc<dyn MetadataProvider>,
}

impl ControlSurface {
    pub fn new(queue: Arc<QueueStore>, scheduler: Arc<Scheduler>, metadata: Arc<dyn MetadataProvider>) -> Self {
        Self {
            queue,
            scheduler,
            metadata,
        }
    }

    fn default_quality(settings: &CoreSettings, quality: Option<Quality>) -> Quality {
        quality.unwrap_or_else(|| Quality::from_str(&settings.download.quality).unwrap_or(Quality::Mp3_320))
    }

    /// Enqueue a single track (`spec.md` §6 "Enqueue track").
    pub async fn enqueue_track(
        &self,
        settings: &CoreSettings,
        track_id: &str,
        quality: Option<Quality>,
    ) -> Result<String, ControlError> {
        let job = new_child_job(track_id, None, Self::default_quality(settings, quality));
        self.queue.insert(&job).await?;
        Ok(job.id)
    }

    /// Enqueue an album: expands children via `MetadataProvider`, inserts
    /// the parent bookkeeping row already `downloading` (only children are
    /// ever dispatched to a worker — `spec.md` §4.2), then every child
    /// `pending`.
    pub async fn enqueue_album(
        &self,
        settings: &CoreSettings,
        album_id: &str,
        quality: Option<Quality>,
    ) -> Result<String, ControlError> {
        let track_ids = self.metadata.expand_album(album_id).await?;
        self.enqueue_parent(settings, album_id, JobKind::Album, None, track_ids, quality)
            .await
    }

    /// Enqueue a playlist — same shape as album, via `expand_playlist`.
    pub async fn enqueue_playlist(
        &self,
        settings: &CoreSettings,
        playlist_id: &str,
        quality: Option<Quality>,
    ) -> Result<String, ControlError> {
        let track_ids = self.metadata.expand_playlist(playlist_id).await?;
        self.enqueue_parent(settings, playlist_id, JobKind::Playlist, None, track_ids, quality)
            .await
    }

    /// Enqueue a caller-supplied custom list; no `MetadataProvider` call
    /// needed since the track ids are already given.
    pub async fn enqueue_custom_list(
        &self,
        settings: &CoreSettings,
        request: CustomListRequest,
        quality: Option<Quality>,
    ) -> Result<String, ControlError> {
        self.enqueue_parent(
            settings,
            &request.id.clone(),
            JobKind::Playlist,
            Some((request.title, request.creator)),
            request.track_ids,
            quality,
        )
        .await
    }

    async fn enqueue_parent(
        &self,
        settings: &CoreSettings,
        parent_id: &str,
        kind: JobKind,
        title_creator: Option<(String, Option<String>)>,
        track_ids: Vec<String>,
        quality: Option<Quality>,
    ) -> Result<String, ControlError> {
        let quality = Self::default_quality(settings, quality);
        let (title, artist) = match title_creator {
            Some((title, creator)) => (Some(title), creator),
            None => (None, None),
        };
        let mut parent = new_child_job(parent_id, None, quality);
        parent.kind = kind;
        parent.title = title;
        parent.artist = artist;
        parent.status = JobStatus::Downloading;
        parent.total_tracks = Some(track_ids.len() as u32);
        parent.completed_tracks = Some(0);
        parent.failed_tracks = Some(0);
        self.queue.insert(&parent).await?;

        for track_id in &track_ids {
            let child = new_child_job(track_id, Some(parent_id), quality);
            self.queue.insert(&child).await?;
        }
        Ok(parent.id)
    }

    pub async fn pause(&self, job_id: &str) -> Result<(), ControlError> {
        Ok(self.scheduler.pause(job_id).await?)
    }

    pub async fn resume(&self, job_id: &str) -> Result<(), ControlError> {
        Ok(self.scheduler.resume(job_id).await?)
    }

    pub async fn cancel(&self, job_id: &str) -> Result<(), ControlError> {
        Ok(self.scheduler.cancel(job_id).await?)
    }

    pub async fn retry(&self, job_id: &str) -> Result<(), ControlError> {
        Ok(self.scheduler.retry(job_id).await?)
    }

    /// Delete every `completed` row; parents with unfinished children are
    /// untouched (`spec.md` §4.1).
    pub async fn clear_completed(&self) -> Result<u64, ControlError> {
        self.queue
            .clear_completed()
            .await
            .map_err(|e| ControlError::Store(e.to_string()))
    }

    /// Cancel every non-terminal job, then delete every row — `spec.md` §6
    /// "cancels all and empties the store".
    pub async fn stop_all(&self) -> Result<(), ControlError> {
        let page = self
            .queue
            .list(0, i64::MAX as u64, None)
            .await
            .map_err(|e| ControlError::Store(e.to_string()))?;
        for job in &page.items {
            if !job.status.is_terminal() {
                let _ = self.scheduler.cancel(&job.id).await;
            }
        }
        for job in &page.items {
            let _ = self.queue.delete(&job.id).await;
        }
        Ok(())
    }

    pub async fn list(&self, offset: u64, limit: u64, filter_status: Option<JobStatus>) -> Result<JobPage, ControlError> {
        self.queue
            .list(offset, limit, filter_status)
            .await
            .map_err(|e| ControlError::Store(e.to_string()))
    }

    pub async fn stats(&self) -> Result<JobCounts, ControlError> {
        self.queue
            .counts()
            .await
            .map_err(|e| ControlError::Store(e.to_string()))
    }

    pub fn set_download_path(&self, path: PathBuf) -> Result<(), ControlError> {
        if path.as_os_str().is_empty() {
            return Err(ControlError::Core(CoreError::InvalidParameter(
                "download path must not be empty".into(),
            )));
        }
        std::fs::create_dir_all(&path).map_err(|e| ControlError::Core(CoreError::Filesystem(e)))?;
        self.scheduler.set_output_dir(path);
        Ok(())
    }

    pub fn register_callbacks(&self, callbacks: Callbacks) -> SinkRegistration {
        self.scheduler.bus().register(callbacks)
    }
}

fn new_child_job(id: &str, parent_id: Option<&str>, quality: Quality) -> Job {
    let now = unix_timestamp();
    Job {
        id: id.to_string(),
        kind: JobKind::Track,
        parent_id: parent_id.map(|s| s.to_string()),
        title: None,
        artist: None,
        quality,
        status: JobStatus::Pending,
        progress: 0,
        bytes_downloaded: 0,
        total_bytes: None,
        error: None,
        created_at: now,
        updated_at: now,
        completed_at: None,
        retry_count: 0,
        attempt_token: None,
        total_tracks: None,
        completed_tracks: None,
        failed_tracks: None,
    }
}

fn unix_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::CallbackBus;
    use crate::fetch::FetchOptions;
    use crate::metadata::StaticMetadataProvider;
    use crate::pipeline::PipelineContext;
    use crate::retry::RetryPolicy;
    use std::sync::RwLock;

    async fn test_surface(metadata: StaticMetadataProvider) -> (ControlSurface, Arc<QueueStore>) {
        let queue = Arc::new(QueueStore::open_memory().await.unwrap());
        let ctx = PipelineContext {
            queue: Arc::clone(&queue),
            metadata: Arc::new(metadata),
            bus: CallbackBus::new(),
            output_dir: Arc::new(RwLock::new(PathBuf::from("/tmp"))),
            temp_dir: PathBuf::from("/tmp"),
            embed_artwork: true,
            lyrics_embed: false,
            lyrics_save_separate_file: false,
            fetch_options: FetchOptions::default(),
        };
        let scheduler = Scheduler::new(Arc::clone(&queue), ctx, 4, RetryPolicy::default());
        let metadata_arc: Arc<dyn MetadataProvider> = Arc::new(StaticMetadataProvider::new());
        let surface = ControlSurface::new(Arc::clone(&queue), scheduler, metadata_arc);
        (surface, queue)
    }

    #[tokio::test]
    async fn enqueue_track_inserts_pending_job() {
        let (surface, queue) = test_surface(StaticMetadataProvider::new()).await;
        let settings = CoreSettings::default();
        let job_id = surface.enqueue_track(&settings, "t1", None).await.unwrap();
        assert_eq!(job_id, "t1");
        let job = queue.get("t1").await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.quality, Quality::Mp3_320);
    }

    #[tokio::test]
    async fn enqueue_track_twice_while_non_terminal_is_already_queued() {
        let (surface, _queue) = test_surface(StaticMetadataProvider::new()).await;
        let settings = CoreSettings::default();
        surface.enqueue_track(&settings, "t1", None).await.unwrap();
        let err = surface.enqueue_track(&settings, "t1", None).await.unwrap_err();
        assert_eq!(err.control_code(), -15);
    }

    #[tokio::test]
    async fn enqueue_album_creates_parent_and_children() {
        let queue = Arc::new(QueueStore::open_memory().await.unwrap());
        let ctx = PipelineContext {
            queue: Arc::clone(&queue),
            metadata: Arc::new(StaticMetadataProvider::new()),
            bus: CallbackBus::new(),
            output_dir: Arc::new(RwLock::new(PathBuf::from("/tmp"))),
            temp_dir: PathBuf::from("/tmp"),
            embed_artwork: true,
            lyrics_embed: false,
            lyrics_save_separate_file: false,
            fetch_options: FetchOptions::default(),
        };
        let scheduler = Scheduler::new(Arc::clone(&queue), ctx, 4, RetryPolicy::default());
        let provider = StaticMetadataProvider::new().with_album("a1", vec!["t1".into(), "t2".into()]);
        let surface = ControlSurface::new(Arc::clone(&queue), scheduler, Arc::new(provider));

        let settings = CoreSettings::default();
        let job_id = surface.enqueue_album(&settings, "a1", None).await.unwrap();
        assert_eq!(job_id, "a1");

        let parent = queue.get("a1").await.unwrap().unwrap();
        assert_eq!(parent.status, JobStatus::Downloading);
        assert_eq!(parent.total_tracks, Some(2));

        let t1 = queue.get("t1").await.unwrap().unwrap();
        assert_eq!(t1.parent_id.as_deref(), Some("a1"));
        assert_eq!(t1.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn stop_all_cancels_and_empties_store() {
        let (surface, queue) = test_surface(StaticMetadataProvider::new()).await;
        let settings = CoreSettings::default();
        surface.enqueue_track(&settings, "t1", None).await.unwrap();
        surface.enqueue_track(&settings, "t2", None).await.unwrap();

        surface.stop_all().await.unwrap();

        assert!(queue.get("t1").await.unwrap().is_none());
        assert!(queue.get("t2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_download_path_rejects_empty_path() {
        let (surface, _queue) = test_surface(StaticMetadataProvider::new()).await;
        let err = surface.set_download_path(PathBuf::new()).unwrap_err();
        assert_eq!(err.control_code(), -10);
    }
}
