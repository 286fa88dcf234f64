//! DownloadPipeline — drives one child job end-to-end, `spec.md` §4.4.
//!
//! Grounded in the teacher's `scheduler/execute/*.rs` stage sequence
//! (download -> checksum -> finish) and `scheduler/run/{shared,fallback}.rs`'s
//! per-job driver loop, generalized from "download one segmented file" into
//! the five-stage Resolve/Fetch/Decrypt/Tag/Commit sequence this spec
//! requires, with a cipher stage and a tagging stage the teacher never had.

mod sanitize;

pub use sanitize::sanitize_filename_for_linux;

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::bus::{CallbackBus, ProgressEvent};
use crate::codec;
use crate::control::{AbortReason, AttemptHandle};
use crate::error::CoreError;
use crate::fetch::{self, FetchError, FetchOptions};
use crate::metadata::MetadataProvider;
use crate::model::{Job, Quality};
use crate::queue::QueueStore;
use crate::storage::{self, StorageWriter, StorageWriterBuilder};
use crate::tagger;

/// What a pipeline run produced, for the scheduler to act on. The pipeline
/// itself never retries or re-dispatches — it reports one outcome per call.
#[derive(Debug)]
pub enum PipelineOutcome {
    Completed,
    /// Eligible for the scheduler's retry policy (`spec.md` §4.2/§7).
    TransientFailure(CoreError),
    /// Not eligible for retry without an explicit user-initiated `Retry`.
    PermanentFailure(CoreError),
    /// Stopped at a cooperative checkpoint; the requested status transition
    /// (paused/cancelled) was already applied by whoever requested the abort.
    Aborted(AbortReason),
}

/// Shared, long-lived context the pipeline needs; cheap to clone, handed to
/// every worker by the scheduler.
#[derive(Clone)]
pub struct PipelineContext {
    pub queue: Arc<QueueStore>,
    pub metadata: Arc<dyn MetadataProvider>,
    pub bus: CallbackBus,
    /// Behind a lock so `SetDownloadPath` (`spec.md` §6) can change it for
    /// jobs dispatched after the call, without restarting the scheduler.
    pub output_dir: Arc<RwLock<PathBuf>>,
    pub temp_dir: PathBuf,
    pub embed_artwork: bool,
    pub lyrics_embed: bool,
    pub lyrics_save_separate_file: bool,
    pub fetch_options: FetchOptions,
}

/// Run one child job's pipeline to completion (or to the first checkpoint at
/// which cancellation/pause is observed). Callers are responsible for the
/// job's `pending -> downloading` transition before calling this, and for
/// dispatching the resulting outcome onto the store (`Completed`/`Failed`
/// transitions, parent counters already applied for `Completed` here per
/// the Commit stage below).
pub async fn run(ctx: &PipelineContext, job: &Job, attempt: &AttemptHandle) -> PipelineOutcome {
    if let Some(reason) = checkpoint(attempt) {
        return PipelineOutcome::Aborted(reason);
    }

    // --- Resolve --------------------------------------------------------
    let resolved = match ctx
        .metadata
        .resolve_download_url(&job.id, job.quality)
        .await
    {
        Ok(r) => r,
        Err(e) => return PipelineOutcome::PermanentFailure(e),
    };
    let tags = match ctx.metadata.get_track_metadata(&job.id).await {
        Ok(t) => t,
        Err(e) => return PipelineOutcome::PermanentFailure(e),
    };

    if let Some(reason) = checkpoint(attempt) {
        return PipelineOutcome::Aborted(reason);
    }

    let output_dir = ctx.output_dir.read().unwrap().clone();
    let final_path = output_path(&output_dir, job, &tags);
    let temp_path = ctx.temp_dir.join(format!("{}{}", job.id, storage::TEMP_SUFFIX));

    // --- Fetch ------------------------------------------------------------
    // File size alone can't tell resumed bytes from preallocated-but-unwritten
    // bytes (the temp file is fallocated to `expected_size` up front), so the
    // resume offset comes from the job's own persisted `bytes_downloaded`
    // checkpoint, not from `stat`ing the temp file.
    let resumable = temp_path.exists()
        && job.bytes_downloaded > 0
        && resolved
            .expected_size
            .map(|expected| job.bytes_downloaded < expected)
            .unwrap_or(true);
    let resume_offset = if resumable { job.bytes_downloaded } else { 0 };

    let storage = if resumable {
        match StorageWriter::open_existing(&temp_path) {
            Ok(s) => s,
            Err(e) => return PipelineOutcome::PermanentFailure(CoreError::Filesystem(to_io_error(e))),
        }
    } else {
        match create_fresh_temp(&temp_path, resolved.expected_size) {
            Ok(s) => s,
            Err(e) => return PipelineOutcome::PermanentFailure(CoreError::Filesystem(e)),
        }
    };

    let job_id = job.id.clone();
    let bus = ctx.bus.clone();
    let expected_size = resolved.expected_size;

    let fetch_result = fetch::fetch(
        &resolved.url,
        &resolved.headers,
        &storage,
        resume_offset,
        expected_size,
        ctx.fetch_options,
        {
            let attempt = attempt.clone();
            move || attempt.should_abort()
        },
        move |bytes, total| {
            let percent = progress_percent(bytes, total, 0);
            bus.emit_progress(ProgressEvent {
                job_id: job_id.clone(),
                percent,
                bytes_processed: bytes,
                total_bytes: total,
            });
        },
    );

    let fetch_outcome = match fetch_result {
        Ok(outcome) => outcome,
        Err(FetchError::Aborted) => {
            let reason = attempt.abort_reason().unwrap_or(AbortReason::Pause);
            if reason == AbortReason::Cancel {
                let _ = std::fs::remove_file(&temp_path);
            }
            return PipelineOutcome::Aborted(reason);
        }
        Err(FetchError::Core(e)) => {
            return if e.is_transient() {
                PipelineOutcome::TransientFailure(e)
            } else {
                PipelineOutcome::PermanentFailure(e)
            };
        }
    };

    // A server that ignores a Range request and returns 200 with the full
    // body can't be appended to safely: discard the partial and restart
    // from scratch on the next attempt rather than silently corrupt it.
    if resume_offset > 0 && fetch_outcome.status != 206 {
        let _ = std::fs::remove_file(&temp_path);
        return PipelineOutcome::TransientFailure(CoreError::Transient(
            crate::error::TransientKind::Network,
        ));
    }

    if let Some(reason) = checkpoint(attempt) {
        if reason == AbortReason::Cancel {
            let _ = std::fs::remove_file(&temp_path);
        }
        return PipelineOutcome::Aborted(reason);
    }

    // --- Decrypt ------------------------------------------------------
    match decrypt_temp_to_final(ctx, job, &temp_path, &final_path, attempt) {
        Ok(()) => {}
        Err(DecryptStageError::Aborted) => {
            let reason = attempt.abort_reason().unwrap_or(AbortReason::Pause);
            let _ = std::fs::remove_file(&final_path);
            if reason == AbortReason::Cancel {
                let _ = std::fs::remove_file(&temp_path);
            }
            return PipelineOutcome::Aborted(reason);
        }
        Err(DecryptStageError::Core(e)) => {
            let _ = std::fs::remove_file(&final_path);
            let _ = std::fs::remove_file(&temp_path);
            return PipelineOutcome::PermanentFailure(e);
        }
    }

    if let Some(reason) = checkpoint(attempt) {
        if reason == AbortReason::Cancel {
            let _ = std::fs::remove_file(&final_path);
        }
        return PipelineOutcome::Aborted(reason);
    }

    // --- Tag ------------------------------------------------------------
    // `embed_artwork`/`lyrics_embed` gate what goes into the container itself;
    // `lyrics_save_separate_file` is independent of both (`spec.md` §6's three
    // settings are not mutually exclusive: a user can want an LRC sidecar
    // without embedding lyrics in the file, or vice versa).
    let mut embedded_tags = tags.clone();
    if !ctx.embed_artwork {
        embedded_tags.cover_jpeg = None;
    }
    if !ctx.lyrics_embed {
        embedded_tags.lyrics_plain = None;
        embedded_tags.lyrics_synced = None;
    }
    if let Err(e) = tagger::write_tags(&final_path, &embedded_tags) {
        tracing::warn!(job = %job.id, error = %e, "tagging failed, continuing");
    }
    if ctx.lyrics_save_separate_file {
        if let Some(lrc) = tags.lyrics_synced.as_deref() {
            if let Err(e) = tagger::write_lrc_sidecar(&final_path, lrc) {
                tracing::warn!(job = %job.id, error = %e, "lyrics sidecar write failed");
            }
        }
    }

    // --- Commit ------------------------------------------------------------
    // Parent counter increment and status commit happen in the scheduler's
    // `resolve_outcome`, the single place that owns queue-state mutation.
    let _ = std::fs::remove_file(&temp_path);

    PipelineOutcome::Completed
}

/// Returns `Some(reason)` if the current attempt has been asked to abort.
fn checkpoint(attempt: &AttemptHandle) -> Option<AbortReason> {
    if attempt.should_abort() {
        Some(attempt.abort_reason().unwrap_or(AbortReason::Pause))
    } else {
        None
    }
}

fn create_fresh_temp(temp_path: &Path, expected_size: Option<u64>) -> std::io::Result<StorageWriter> {
    if let Some(parent) = temp_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut builder = StorageWriterBuilder::create(temp_path).map_err(to_io_error)?;
    if let Some(size) = expected_size {
        builder.preallocate(size).map_err(to_io_error)?;
    }
    Ok(builder.build())
}

fn to_io_error(e: anyhow::Error) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
}

/// Distinguishes a real decrypt failure from a cooperative abort, so `run`
/// can apply `spec.md` §4.4's different artifact-cleanup rule for each.
enum DecryptStageError {
    Aborted,
    Core(CoreError),
}

impl From<std::io::Error> for DecryptStageError {
    fn from(e: std::io::Error) -> Self {
        DecryptStageError::Core(CoreError::Filesystem(e))
    }
}

/// Decrypt the temp artifact into the final file. Any codec error (or I/O
/// error touching either file) is non-transient per `spec.md` §4.4: "Any
/// decrypt error -> non-transient DecryptFailed; remove partial final file"
/// (the removal itself is the caller's responsibility, done by `run` above).
fn decrypt_temp_to_final(
    ctx: &PipelineContext,
    job: &Job,
    temp_path: &Path,
    final_path: &Path,
    attempt: &AttemptHandle,
) -> Result<(), DecryptStageError> {
    let key = codec::derive_key(&job.id).map_err(|e| DecryptStageError::Core(CoreError::from(e)))?;
    let input_file = std::fs::File::open(temp_path)?;
    let total = input_file.metadata().ok().map(|m| m.len());
    let mut reader = std::io::BufReader::new(input_file);

    if let Some(parent) = final_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let output_file = std::fs::File::create(final_path)?;
    let mut writer = std::io::BufWriter::new(output_file);

    let bus = ctx.bus.clone();
    let job_id = job.id.clone();
    let abort_check = {
        let attempt = attempt.clone();
        move || attempt.should_abort()
    };
    let decrypt_result = codec::decrypt_stream_cancellable(
        &key,
        &mut reader,
        &mut writer,
        total,
        move |processed, total| {
            let percent = progress_percent(processed, if total > 0 { Some(total) } else { None }, 50);
            bus.emit_progress(ProgressEvent {
                job_id: job_id.clone(),
                percent,
                bytes_processed: processed,
                total_bytes: if total > 0 { Some(total) } else { None },
            });
        },
        abort_check,
    );

    use std::io::Write;
    match decrypt_result {
        Ok(()) => {
            writer.flush()?;
            Ok(())
        }
        Err(codec::CodecError::Aborted) => {
            let _ = writer.flush();
            Err(DecryptStageError::Aborted)
        }
        Err(e) => Err(DecryptStageError::Core(CoreError::from(e))),
    }
}

/// Half-the-bar progress: `base` is 0 for the Fetch stage and 50 for the
/// Decrypt stage, a simple 50/50 split per `spec.md` §4.4.
fn progress_percent(processed: u64, total: Option<u64>, base: u8) -> u8 {
    match total {
        Some(total) if total > 0 => {
            let ratio = ((processed.min(total) as f64 / total as f64) * 50.0) as u8;
            base.saturating_add(ratio.min(50))
        }
        _ => base,
    }
}

fn output_path(output_dir: &Path, job: &Job, tags: &crate::model::TagSet) -> PathBuf {
    let artist = if tags.artist.is_empty() {
        job.artist.clone().unwrap_or_default()
    } else {
        tags.artist.join(", ")
    };
    let title = if !tags.title.is_empty() {
        tags.title.clone()
    } else {
        job.title.clone().unwrap_or_else(|| job.id.clone())
    };
    let stem = if artist.is_empty() {
        title
    } else {
        format!("{artist} - {title}")
    };
    let filename = format!(
        "{}.{}",
        sanitize_filename_for_linux(&stem),
        extension_for(job.quality)
    );
    output_dir.join(filename)
}

fn extension_for(quality: Quality) -> &'static str {
    match quality {
        Quality::Flac => "flac",
        Quality::Mp3_128 | Quality::Mp3_320 => "mp3",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{ResolvedDownload, StaticMetadataProvider};
    use crate::model::{JobKind, JobStatus, TagSet};
    use std::collections::HashMap;

    fn sample_job(id: &str, quality: Quality) -> Job {
        Job {
            id: id.to_string(),
            kind: JobKind::Track,
            parent_id: None,
            title: Some("Fallback Title".into()),
            artist: Some("Fallback Artist".into()),
            quality,
            status: JobStatus::Downloading,
            progress: 0,
            bytes_downloaded: 0,
            total_bytes: None,
            error: None,
            created_at: 0,
            updated_at: 0,
            completed_at: None,
            retry_count: 0,
            attempt_token: Some("tok".into()),
            total_tracks: None,
            completed_tracks: None,
            failed_tracks: None,
        }
    }

    #[test]
    fn output_path_prefers_resolved_tags_over_job_fields() {
        let job = sample_job("t1", Quality::Mp3_320);
        let tags = TagSet {
            title: "Real Title".into(),
            artist: vec!["Real Artist".into()],
            ..Default::default()
        };
        let path = output_path(Path::new("/music"), &job, &tags);
        assert_eq!(path, Path::new("/music/Real Artist - Real Title.mp3"));
    }

    #[test]
    fn output_path_falls_back_to_job_fields_when_tags_empty() {
        let job = sample_job("t1", Quality::Flac);
        let tags = TagSet::default();
        let path = output_path(Path::new("/music"), &job, &tags);
        assert_eq!(path, Path::new("/music/Fallback Artist - Fallback Title.flac"));
    }

    #[test]
    fn progress_percent_splits_fetch_and_decrypt_halves() {
        assert_eq!(progress_percent(0, Some(100), 0), 0);
        assert_eq!(progress_percent(100, Some(100), 0), 50);
        assert_eq!(progress_percent(0, Some(100), 50), 50);
        assert_eq!(progress_percent(100, Some(100), 50), 100);
        // Unknown total: report the stage base rather than guessing.
        assert_eq!(progress_percent(42, None, 0), 0);
    }

    #[tokio::test]
    async fn resolve_failure_is_always_permanent() {
        let provider = StaticMetadataProvider::new().with_missing_track("gone");
        let ctx = PipelineContext {
            queue: Arc::new(QueueStore::open_memory().await.unwrap()),
            metadata: Arc::new(provider),
            bus: CallbackBus::new(),
            output_dir: Arc::new(std::sync::RwLock::new(PathBuf::from("/tmp"))),
            temp_dir: PathBuf::from("/tmp"),
            embed_artwork: true,
            lyrics_embed: false,
            lyrics_save_separate_file: false,
            fetch_options: FetchOptions::default(),
        };
        let job = sample_job("gone", Quality::Mp3_320);
        let control = crate::control::JobControl::new();
        let attempt = control.register(job.id.clone(), "tok".into());

        let outcome = run(&ctx, &job, &attempt).await;
        assert!(matches!(outcome, PipelineOutcome::PermanentFailure(_)));
    }

    #[tokio::test]
    async fn checkpoint_before_resolve_reports_abort_reason() {
        let provider = StaticMetadataProvider::new().with_track(
            "t1",
            ResolvedDownload {
                url: "https://example.invalid/t1".into(),
                expected_size: Some(10),
                headers: HashMap::new(),
            },
            TagSet::default(),
        );
        let ctx = PipelineContext {
            queue: Arc::new(QueueStore::open_memory().await.unwrap()),
            metadata: Arc::new(provider),
            bus: CallbackBus::new(),
            output_dir: Arc::new(std::sync::RwLock::new(PathBuf::from("/tmp"))),
            temp_dir: PathBuf::from("/tmp"),
            embed_artwork: true,
            lyrics_embed: false,
            lyrics_save_separate_file: false,
            fetch_options: FetchOptions::default(),
        };
        let job = sample_job("t1", Quality::Mp3_320);
        let control = crate::control::JobControl::new();
        let attempt = control.register(job.id.clone(), "tok".into());
        control.request_abort(&job.id, AbortReason::Pause);

        let outcome = run(&ctx, &job, &attempt).await;
        assert!(matches!(outcome, PipelineOutcome::Aborted(AbortReason::Pause)));
    }
}
