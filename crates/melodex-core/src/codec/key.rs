//! Per-track Blowfish key derivation — `spec.md` §4.3.

use md5::{Digest, Md5};

use super::{CodecError, BLOWFISH_SECRET};

/// Derive the 16-byte Blowfish-CBC key for a track id.
///
/// `k[i] = md5_hex(id)[i] XOR md5_hex(id)[i+16] XOR secret[i]`, where
/// `md5_hex(id)` is the lowercase hex *string* of the MD5 digest (32 ASCII
/// bytes), not the raw 16-byte digest — `spec.md` §4.3 step 2.
pub fn derive_key(track_id: &str) -> Result<[u8; 16], CodecError> {
    let digest = Md5::digest(track_id.as_bytes());
    let hex = hex::encode(digest); // 32 lowercase hex chars
    let hex = hex.as_bytes();
    debug_assert_eq!(hex.len(), 32);

    let mut key = [0u8; 16];
    for i in 0..16 {
        key[i] = hex[i] ^ hex[i + 16] ^ BLOWFISH_SECRET[i];
    }

    if !(4..=56).contains(&key.len()) {
        return Err(CodecError::InvalidKey);
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_always_16_bytes() {
        for id in ["", "test123", "a very long track identifier indeed", "日本語"] {
            let key = derive_key(id).unwrap();
            assert_eq!(key.len(), 16);
        }
    }

    #[test]
    fn derivation_is_deterministic() {
        let a = derive_key("track-42").unwrap();
        let b = derive_key("track-42").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn derivation_matches_reference_formula() {
        let id = "test123";
        let digest = Md5::digest(id.as_bytes());
        let hex = hex::encode(digest);
        let hex = hex.as_bytes();
        let mut expected = [0u8; 16];
        for i in 0..16 {
            expected[i] = hex[i] ^ hex[i + 16] ^ BLOWFISH_SECRET[i];
        }
        assert_eq!(derive_key(id).unwrap(), expected);
    }

    #[test]
    fn different_ids_give_different_keys() {
        let a = derive_key("test123").unwrap();
        let b = derive_key("test456").unwrap();
        assert_ne!(a, b);
    }
}
