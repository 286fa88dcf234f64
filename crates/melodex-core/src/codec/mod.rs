//! Blowfish-CBC stripe codec — `spec.md` §4.3.
//!
//! No teacher analogue (the teacher ships no cipher of its own); the
//! streaming shape is grounded in `checksum::sha256_path`'s fixed-buffer
//! read loop, generalized from hashing to in-place decryption. Fixed
//! parameters are compile-time constants per the spec's "MUST NOT be
//! changed" — no configurability is exposed, by design (`spec.md` §9's "no
//! reflection in the codec").

mod key;
mod stream;

pub use key::derive_key;
pub use stream::{decrypt_stream, decrypt_stream_cancellable};

use thiserror::Error;

/// Size of one encrypted chunk: the only part of a segment passed through
/// Blowfish-CBC.
pub const ENCRYPTED_CHUNK_SIZE: usize = 2048;
/// Size of the plain remainder written verbatim after the encrypted chunk.
pub const PLAIN_CHUNK_SIZE: usize = 4096;
/// Segment size over which the stripe pattern repeats.
pub const SEGMENT_SIZE: usize = ENCRYPTED_CHUNK_SIZE + PLAIN_CHUNK_SIZE;

/// Blowfish secret, 16 ASCII bytes.
pub const BLOWFISH_SECRET: &[u8; 16] = b"g4el58wc0zvf9na1";
/// Constant 8-byte IV, reused identically for every chunk's fresh cipher
/// instance — `spec.md` §4.3.
pub const IV: [u8; 8] = [0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07];

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("derived key has invalid length")]
    InvalidKey,
    #[error("decryption failed")]
    DecryptFailed,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Cooperative cancellation observed at a decrypted-segment boundary —
    /// `spec.md` §5's suspension-point list. Not an integrity failure: the
    /// caller is expected to discard or keep the partial output based on
    /// why the abort was requested, not to treat this as `DecryptFailed`.
    #[error("decryption aborted")]
    Aborted,
}

impl CodecError {
    /// Whether this maps onto `CoreError::Integrity` (`spec.md` §7: key
    /// derivation invalid, decryption failed — both non-transient).
    pub fn is_integrity_error(&self) -> bool {
        matches!(self, CodecError::InvalidKey | CodecError::DecryptFailed)
    }
}
