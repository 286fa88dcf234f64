//! Resumable HTTP downloader — `spec.md` §4.4 stage 2, §5 cooperative
//! cancellation.
//!
//! Generalizes the teacher's `downloader::single::download_single` (a plain
//! sequential GET with a write-callback that aborts the transfer by
//! returning `Ok(0)` on storage failure) into a fetch that also supports an
//! HTTP Range resume and a cooperative-cancellation check in the same
//! write callback, reusing the connection-pooling/timeout/low-speed-limit
//! `curl::easy::Easy` options from `downloader/segment.rs`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{CoreError, TransientKind};
use crate::storage::StorageWriter;

#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    pub connect_timeout: Duration,
    pub low_speed_limit_bytes_per_sec: u32,
    pub low_speed_time: Duration,
    pub total_timeout: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            low_speed_limit_bytes_per_sec: 1024,
            low_speed_time: Duration::from_secs(60),
            total_timeout: Duration::from_secs(3600),
        }
    }
}

/// Outcome of one fetch attempt. `status` lets the pipeline decide whether a
/// Range resume was honored (206) or the server ignored it and returned the
/// whole body (200) — `spec.md` §5's "if the server refuses (no 206), the
/// partial is discarded and the fetch restarts".
#[derive(Debug)]
pub struct FetchOutcome {
    pub status: u32,
    pub bytes_written: u64,
}

/// Raised from the write callback when the caller's cancellation check
/// returns true mid-transfer — `spec.md` §5's cooperative checkpoint "before
/// each HTTP read".
#[derive(Debug)]
pub struct FetchAborted;

impl std::fmt::Display for FetchAborted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "fetch aborted by cancellation signal")
    }
}

impl std::error::Error for FetchAborted {}

#[derive(Debug)]
pub enum FetchError {
    Aborted,
    Core(CoreError),
}

impl From<CoreError> for FetchError {
    fn from(e: CoreError) -> Self {
        FetchError::Core(e)
    }
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Aborted => write!(f, "fetch aborted"),
            FetchError::Core(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for FetchError {}

/// GET `url`, writing the body sequentially into `storage` starting at
/// `offset`. When `offset > 0`, issues `Range: bytes={offset}-` so the
/// caller can resume a partially-downloaded temp artifact.
///
/// `should_abort` is polled from the write callback (the only suspension
/// point inside a single fetch, per `spec.md` §5); `on_progress` receives
/// the cumulative bytes written (offset-inclusive) and the total size if
/// known.
pub fn fetch(
    url: &str,
    headers: &HashMap<String, String>,
    storage: &StorageWriter,
    offset: u64,
    expected_size: Option<u64>,
    options: FetchOptions,
    should_abort: impl Fn() -> bool + Send + 'static,
    mut on_progress: impl FnMut(u64, Option<u64>),
) -> Result<FetchOutcome, FetchError> {
    let written = Arc::new(AtomicU64::new(offset));
    let written_cb = Arc::clone(&written);
    let storage_error: Arc<Mutex<Option<std::io::Error>>> = Arc::new(Mutex::new(None));
    let storage_error_cb = Arc::clone(&storage_error);
    let aborted = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let aborted_cb = Arc::clone(&aborted);
    let storage = storage.clone();

    let mut easy = curl::easy::Easy::new();
    easy.url(url)
        .map_err(|e| FetchError::Core(curl_to_core(&e)))?;
    easy.follow_location(true)
        .map_err(|e| FetchError::Core(curl_to_core(&e)))?;
    easy.max_redirections(10)
        .map_err(|e| FetchError::Core(curl_to_core(&e)))?;
    easy.connect_timeout(options.connect_timeout)
        .map_err(|e| FetchError::Core(curl_to_core(&e)))?;
    easy.low_speed_limit(options.low_speed_limit_bytes_per_sec)
        .map_err(|e| FetchError::Core(curl_to_core(&e)))?;
    easy.low_speed_time(options.low_speed_time)
        .map_err(|e| FetchError::Core(curl_to_core(&e)))?;
    easy.timeout(options.total_timeout)
        .map_err(|e| FetchError::Core(curl_to_core(&e)))?;

    if offset > 0 {
        easy.range(&format!("{offset}-"))
            .map_err(|e| FetchError::Core(curl_to_core(&e)))?;
    }

    let mut list = curl::easy::List::new();
    for (k, v) in headers {
        list.append(&format!("{}: {}", k.trim(), v.trim()))
            .map_err(|e| FetchError::Core(curl_to_core(&e)))?;
    }
    if !headers.is_empty() {
        easy.http_headers(list)
            .map_err(|e| FetchError::Core(curl_to_core(&e)))?;
    }

    {
        let mut transfer = easy.transfer();
        transfer
            .write_function(move |data| {
                if should_abort() {
                    aborted_cb.store(true, Ordering::Relaxed);
                    return Ok(0);
                }
                let off = written_cb.fetch_add(data.len() as u64, Ordering::Relaxed);
                match storage.write_at(off, data) {
                    Ok(()) => Ok(data.len()),
                    Err(e) => {
                        let io_err = e.downcast::<std::io::Error>().unwrap_or_else(|e| {
                            std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
                        });
                        let _ = storage_error_cb.lock().unwrap().replace(io_err);
                        Ok(0)
                    }
                }
            })
            .map_err(|e| FetchError::Core(curl_to_core(&e)))?;

        if let Err(e) = transfer.perform() {
            if aborted.load(Ordering::Relaxed) {
                return Err(FetchError::Aborted);
            }
            if e.is_write_error() {
                if let Some(io_err) = storage_error.lock().unwrap().take() {
                    return Err(FetchError::Core(CoreError::Filesystem(io_err)));
                }
            }
            return Err(FetchError::Core(curl_to_core(&e)));
        }
    }

    let code = easy
        .response_code()
        .map_err(|e| FetchError::Core(curl_to_core(&e)))?;
    if !(200..300).contains(&code) {
        return Err(FetchError::Core(http_status_to_core(code)));
    }

    let bytes_written = written.load(Ordering::Relaxed);
    if let Some(expected) = expected_size {
        if code != 206 && bytes_written != expected {
            return Err(FetchError::Core(CoreError::Transient(TransientKind::Network)));
        }
    }

    on_progress(bytes_written, expected_size);
    Ok(FetchOutcome {
        status: code,
        bytes_written,
    })
}

fn curl_to_core(e: &curl::Error) -> CoreError {
    if e.is_operation_timedout() {
        return CoreError::Transient(TransientKind::Timeout);
    }
    if e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_read_error()
        || e.is_recv_error()
        || e.is_send_error()
        || e.is_got_nothing()
    {
        return CoreError::Transient(TransientKind::Network);
    }
    CoreError::Internal(e.to_string())
}

fn http_status_to_core(code: u32) -> CoreError {
    match code {
        401 => CoreError::Unauthorized,
        403 => CoreError::Forbidden,
        404 => CoreError::NotFound(format!("HTTP {code}")),
        429 => CoreError::Transient(TransientKind::RateLimit),
        500..=599 => CoreError::Transient(TransientKind::Http5xx),
        _ => CoreError::Internal(format!("unexpected HTTP status {code}")),
    }
}
