//! CLI for the melodex download-and-decrypt engine.

mod commands;
mod metadata_manifest;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use melodex_core::config::{self, CoreSettings};
use melodex_core::control_surface::ControlSurface;
use melodex_core::fetch::FetchOptions;
use melodex_core::metadata::MetadataProvider;
use melodex_core::model::{JobStatus, Quality};
use melodex_core::pipeline::PipelineContext;
use melodex_core::queue::QueueStore;
use melodex_core::retry::RetryPolicy;
use melodex_core::scheduler::Scheduler;

use commands::{
    run_add_album, run_add_custom, run_add_playlist, run_add_track, run_cancel,
    run_clear_completed, run_list, run_pause, run_resume, run_retry, run_scheduler,
    run_set_download_path, run_stats, run_stop_all,
};
use metadata_manifest::ManifestMetadataProvider;

/// Top-level CLI for the melodex download-and-decrypt engine.
#[derive(Debug, Parser)]
#[command(name = "melodex")]
#[command(about = "melodex: encrypted-audio download-and-decrypt engine", long_about = None)]
pub struct Cli {
    /// Path to a JSON metadata manifest standing in for the out-of-scope
    /// private API client (`spec.md` §1): maps track/album/playlist ids to
    /// stream URLs and tags. Required for `add-album`/`add-playlist`/`run`;
    /// unused by commands that only touch the queue.
    #[arg(long, global = true, value_name = "FILE")]
    pub metadata_manifest: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Enqueue a single track.
    AddTrack {
        track_id: String,
        #[arg(long, value_name = "QUALITY")]
        quality: Option<String>,
    },
    /// Enqueue an album (expands to one child job per track).
    AddAlbum {
        album_id: String,
        #[arg(long, value_name = "QUALITY")]
        quality: Option<String>,
    },
    /// Enqueue a playlist (expands to one child job per track).
    AddPlaylist {
        playlist_id: String,
        #[arg(long, value_name = "QUALITY")]
        quality: Option<String>,
    },
    /// Enqueue a caller-supplied custom list of track ids.
    AddCustom {
        id: String,
        title: String,
        #[arg(long)]
        creator: Option<String>,
        #[arg(long, value_name = "QUALITY")]
        quality: Option<String>,
        /// Track ids belonging to the list.
        track_ids: Vec<String>,
    },
    /// Pause a downloading job.
    Pause { job_id: String },
    /// Resume a paused job.
    Resume { job_id: String },
    /// Cancel a job (and, for a parent, all its non-terminal children).
    Cancel { job_id: String },
    /// Retry a failed job, resetting its retry counter.
    Retry { job_id: String },
    /// List queued jobs.
    List {
        #[arg(long, default_value = "0")]
        offset: u64,
        #[arg(long, default_value = "50")]
        limit: u64,
        #[arg(long, value_name = "STATUS")]
        status: Option<String>,
    },
    /// Print aggregate queue statistics.
    Stats,
    /// Delete all completed jobs from the queue.
    ClearCompleted,
    /// Cancel every non-terminal job and empty the queue.
    StopAll,
    /// Change the directory finished downloads are written to.
    SetDownloadPath { path: PathBuf },
    /// Run the worker pool, processing queued jobs until interrupted.
    Run {
        /// Override `download.concurrent_downloads` from settings.
        #[arg(long, value_name = "N")]
        concurrency: Option<usize>,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let settings = config::load_or_init()?;

        let queue = Arc::new(QueueStore::open_default().await?);
        let metadata: Arc<dyn MetadataProvider> = match &cli.metadata_manifest {
            Some(path) => Arc::new(ManifestMetadataProvider::load(path)?),
            None => Arc::new(ManifestMetadataProvider::empty()),
        };

        match cli.command {
            CliCommand::AddTrack { track_id, quality } => {
                let surface = control_surface(Arc::clone(&queue), Arc::clone(&metadata), &settings);
                run_add_track(&surface, &settings, &track_id, parse_quality(quality.as_deref())?).await?;
            }
            CliCommand::AddAlbum { album_id, quality } => {
                let surface = control_surface(Arc::clone(&queue), Arc::clone(&metadata), &settings);
                run_add_album(&surface, &settings, &album_id, parse_quality(quality.as_deref())?).await?;
            }
            CliCommand::AddPlaylist { playlist_id, quality } => {
                let surface = control_surface(Arc::clone(&queue), Arc::clone(&metadata), &settings);
                run_add_playlist(&surface, &settings, &playlist_id, parse_quality(quality.as_deref())?).await?;
            }
            CliCommand::AddCustom { id, title, creator, quality, track_ids } => {
                let surface = control_surface(Arc::clone(&queue), Arc::clone(&metadata), &settings);
                run_add_custom(&surface, &settings, &id, &title, creator, track_ids, parse_quality(quality.as_deref())?).await?;
            }
            CliCommand::Pause { job_id } => {
                let surface = control_surface(Arc::clone(&queue), Arc::clone(&metadata), &settings);
                run_pause(&surface, &job_id).await?;
            }
            CliCommand::Resume { job_id } => {
                let surface = control_surface(Arc::clone(&queue), Arc::clone(&metadata), &settings);
                run_resume(&surface, &job_id).await?;
            }
            CliCommand::Cancel { job_id } => {
                let surface = control_surface(Arc::clone(&queue), Arc::clone(&metadata), &settings);
                run_cancel(&surface, &job_id).await?;
            }
            CliCommand::Retry { job_id } => {
                let surface = control_surface(Arc::clone(&queue), Arc::clone(&metadata), &settings);
                run_retry(&surface, &job_id).await?;
            }
            CliCommand::List { offset, limit, status } => {
                let surface = control_surface(Arc::clone(&queue), Arc::clone(&metadata), &settings);
                run_list(&surface, offset, limit, parse_status(status.as_deref())?).await?;
            }
            CliCommand::Stats => {
                let surface = control_surface(Arc::clone(&queue), Arc::clone(&metadata), &settings);
                run_stats(&surface).await?;
            }
            CliCommand::ClearCompleted => {
                let surface = control_surface(Arc::clone(&queue), Arc::clone(&metadata), &settings);
                run_clear_completed(&surface).await?;
            }
            CliCommand::StopAll => {
                let surface = control_surface(Arc::clone(&queue), Arc::clone(&metadata), &settings);
                run_stop_all(&surface).await?;
            }
            CliCommand::SetDownloadPath { path } => {
                let surface = control_surface(Arc::clone(&queue), Arc::clone(&metadata), &settings);
                run_set_download_path(&surface, path)?;
            }
            CliCommand::Run { concurrency } => {
                let temp_dir = temp_dir()?;
                run_scheduler(queue, &settings, metadata, concurrency, temp_dir).await?;
            }
        }

        Ok(())
    }
}

/// Build a short-lived `ControlSurface` for a single CLI invocation. Its
/// `Scheduler` exists only to hand pause/cancel/retry requests to the store
/// (`spec.md` §4.1's `UpdateStatus` is durable across processes); it never
/// starts workers, so it cannot itself signal an in-flight attempt running
/// under a separate `melodex run` process — the teacher's CLI has the same
/// property ("pause... does not stop an already running download").
fn control_surface(queue: Arc<QueueStore>, metadata: Arc<dyn MetadataProvider>, settings: &CoreSettings) -> ControlSurface {
    let ctx = PipelineContext {
        queue: Arc::clone(&queue),
        metadata: Arc::clone(&metadata),
        bus: melodex_core::bus::CallbackBus::new(),
        output_dir: Arc::new(std::sync::RwLock::new(settings.download.output_dir.clone())),
        temp_dir: std::env::temp_dir().join("melodex"),
        embed_artwork: settings.download.embed_artwork,
        lyrics_embed: settings.lyrics.embed_in_file,
        lyrics_save_separate_file: settings.lyrics.save_separate_file,
        fetch_options: FetchOptions::default(),
    };
    let scheduler = Scheduler::new(Arc::clone(&queue), ctx, settings.download.concurrent_downloads, RetryPolicy::default());
    ControlSurface::new(queue, scheduler, metadata)
}

fn temp_dir() -> Result<PathBuf> {
    let dir = std::env::temp_dir().join("melodex");
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

fn parse_quality(s: Option<&str>) -> Result<Option<Quality>> {
    match s {
        None => Ok(None),
        Some(s) => Quality::from_str(s)
            .map(Some)
            .ok_or_else(|| anyhow::anyhow!("invalid quality '{s}' (expected mp3_128, mp3_320, or flac)")),
    }
}

fn parse_status(s: Option<&str>) -> Result<Option<JobStatus>> {
    match s {
        None => Ok(None),
        Some(s) => JobStatus::from_str(s)
            .map(Some)
            .ok_or_else(|| anyhow::anyhow!("invalid status '{s}'")),
    }
}

#[cfg(test)]
mod tests;
