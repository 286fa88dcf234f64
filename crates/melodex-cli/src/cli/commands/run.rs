//! `melodex run` — start the worker pool and drive queued jobs to
//! completion, `spec.md` §5. Grounded in the teacher's `run.rs` progress
//! printer and its `--jobs N` concurrency flag, generalized from a one-shot
//! "drain the queue and exit" loop into a long-lived scheduler that keeps
//! polling for new work until interrupted (`tokio::signal::ctrl_c`, the
//! same shutdown trigger as `hoffmang9-WesoForge`'s `shutdown.rs`).

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use melodex_core::bus::Callbacks;
use melodex_core::config::CoreSettings;
use melodex_core::fetch::FetchOptions;
use melodex_core::metadata::MetadataProvider;
use melodex_core::pipeline::PipelineContext;
use melodex_core::queue::QueueStore;
use melodex_core::retry::RetryPolicy;
use melodex_core::scheduler::Scheduler;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

pub async fn run_scheduler(
    queue: Arc<QueueStore>,
    settings: &CoreSettings,
    metadata: Arc<dyn MetadataProvider>,
    concurrency_override: Option<usize>,
    temp_dir: PathBuf,
) -> Result<()> {
    let concurrency = concurrency_override
        .unwrap_or(settings.download.concurrent_downloads)
        .clamp(melodex_core::config::MIN_CONCURRENCY, melodex_core::config::MAX_CONCURRENCY);

    let ctx = PipelineContext {
        queue: Arc::clone(&queue),
        metadata,
        bus: melodex_core::bus::CallbackBus::new(),
        output_dir: Arc::new(std::sync::RwLock::new(settings.download.output_dir.clone())),
        temp_dir,
        embed_artwork: settings.download.embed_artwork,
        lyrics_embed: settings.lyrics.embed_in_file,
        lyrics_save_separate_file: settings.lyrics.save_separate_file,
        fetch_options: FetchOptions::default(),
    };

    let scheduler = Scheduler::new(queue, ctx, concurrency, RetryPolicy::default());
    let _registration = scheduler.bus().register(progress_printer());

    scheduler.start(concurrency).await;
    println!("Running with concurrency {concurrency}. Press Ctrl-C to stop.");

    tokio::signal::ctrl_c().await?;
    println!("\nShutting down...");
    scheduler.shutdown(SHUTDOWN_TIMEOUT).await;
    println!("Stopped.");
    Ok(())
}

/// Println-based callback set, the CLI's stand-in for a GUI progress bar —
/// mirrors the teacher's `run.rs` rate-limited `\r`-overwritten progress
/// line, split across the bus's three event kinds instead of one
/// `ProgressStats` struct.
fn progress_printer() -> Callbacks {
    let last_job: Arc<std::sync::Mutex<Option<String>>> = Arc::new(std::sync::Mutex::new(None));
    let printed_newline = Arc::new(AtomicBool::new(true));

    let last_job_progress = Arc::clone(&last_job);
    let newline_progress = Arc::clone(&printed_newline);
    let progress = Arc::new(move |event: melodex_core::bus::ProgressEvent| {
        *last_job_progress.lock().unwrap() = Some(event.job_id.clone());
        newline_progress.store(false, Ordering::Relaxed);
        match event.total_bytes {
            Some(total) => print!(
                "\r{:<24} {:>3}%  {}/{} bytes",
                event.job_id, event.percent, event.bytes_processed, total
            ),
            None => print!("\r{:<24} {:>3}%  {} bytes", event.job_id, event.percent, event.bytes_processed),
        }
        let _ = std::io::Write::flush(&mut std::io::stdout());
    });

    let newline_status = Arc::clone(&printed_newline);
    let status = Arc::new(move |event: melodex_core::bus::StatusEvent| {
        if !newline_status.swap(true, Ordering::Relaxed) {
            println!();
        }
        match event.error {
            Some(err) => println!("{:<24} -> {} ({err})", event.job_id, event.new_status.as_str()),
            None => println!("{:<24} -> {}", event.job_id, event.new_status.as_str()),
        }
    });

    let stats = Arc::new(|event: melodex_core::bus::QueueStatsEvent| {
        tracing::debug!(
            total = event.total,
            pending = event.pending,
            downloading = event.downloading,
            completed = event.completed,
            failed = event.failed,
            "queue stats"
        );
    });

    Callbacks { progress, status, stats }
}
