//! Retry policy: transient/non-transient classification and the scheduler's
//! exact linear backoff — `spec.md` §4.2/§7.
//!
//! Grounded in the teacher's `retry::{policy,classify}` shape (an `ErrorKind`
//! plus a `RetryPolicy::decide`), but the backoff formula is linear
//! (`retry_count * base_delay`, giving `1s, 2s, 3s`) rather than the teacher's
//! `base * 2^(attempt-1)` exponential formula — the spec is prescriptive
//! about the literal delay sequence, so this workspace departs from the
//! teacher here on purpose (see `DESIGN.md`).

mod policy;

pub use policy::{RetryDecision, RetryPolicy};

use crate::error::{CoreError, TransientKind};

/// Maps a `CoreError` onto the scheduler's retry decision. Only
/// `CoreError::Transient` is ever retried automatically; every other variant
/// is non-transient per §4.2's enumeration (invalid credential == Forbidden/
/// Unauthorized, not found, permission denied == Forbidden, decryption
/// failure/invalid key length == Integrity).
pub fn classify(err: &CoreError) -> Option<TransientKind> {
    match err {
        CoreError::Transient(kind) => Some(*kind),
        _ => None,
    }
}
