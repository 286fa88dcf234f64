//! Error taxonomy shared across the core — `spec.md` §7.
//!
//! A single closed enum replaces the teacher's ad hoc per-module error types
//! (`retry::SegmentError`, `safe_resume`'s `ValidationError`); each variant maps
//! onto one of the stable control-surface codes in §6.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientKind {
    Network,
    Timeout,
    RateLimit,
    Http5xx,
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("transient error: {0:?}")]
    Transient(TransientKind),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("integrity error: {0}")]
    Integrity(String),

    #[error("filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("job {0} already queued")]
    AlreadyQueued(String),

    #[error("stale state: expected job to be in a different status")]
    StaleState,

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

impl CoreError {
    /// Whether the scheduler should treat this as transient and eligible for
    /// automatic retry, per §4.2/§7.
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::Transient(_))
    }

    /// Stable negative control-surface code, §6.
    pub fn control_code(&self) -> i32 {
        match self {
            CoreError::Configuration(_) => -3,
            CoreError::NotFound(_) => -11,
            CoreError::Unauthorized => -7,
            CoreError::Forbidden => -12,
            CoreError::Filesystem(_) => -9,
            CoreError::Transient(TransientKind::Network) => -8,
            CoreError::Transient(TransientKind::Timeout) => -13,
            CoreError::Transient(TransientKind::RateLimit) => -14,
            CoreError::Transient(TransientKind::Http5xx) => -8,
            CoreError::Integrity(_) => -2,
            CoreError::Internal(_) => -2,
            CoreError::StaleState => -2,
            CoreError::AlreadyQueued(_) => -15,
            CoreError::InvalidParameter(_) => -10,
        }
    }
}

impl From<crate::codec::CodecError> for CoreError {
    /// Decryption failure / invalid key length are `Integrity` errors —
    /// non-transient, `spec.md` §4.2/§7.
    fn from(err: crate::codec::CodecError) -> Self {
        match err {
            crate::codec::CodecError::Io(e) => CoreError::Filesystem(e),
            other => CoreError::Integrity(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_kinds_are_transient() {
        assert!(CoreError::Transient(TransientKind::Network).is_transient());
        assert!(CoreError::Transient(TransientKind::Http5xx).is_transient());
        assert!(!CoreError::Configuration("bad".into()).is_transient());
        assert!(!CoreError::Integrity("bad key".into()).is_transient());
    }

    #[test]
    fn control_codes_are_stable() {
        assert_eq!(CoreError::AlreadyQueued("x".into()).control_code(), -15);
        assert_eq!(CoreError::NotFound("x".into()).control_code(), -11);
        assert_eq!(CoreError::Forbidden.control_code(), -12);
        assert_eq!(
            CoreError::Transient(TransientKind::RateLimit).control_code(),
            -14
        );
    }
}
