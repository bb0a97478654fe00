//! Digest and credential generation.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

/// Length in bytes of generated session credentials.
pub const KEY_LENGTH: usize = 32;

/// Returns the base64-encoded SHA-256 digest of `data`.
///
/// Used to derive cache fingerprints, so equal inputs always produce equal
/// output and distinct inputs collide only with SHA-256 probability.
pub fn hash(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    BASE64.encode(digest)
}

/// Generates a fresh random credential as a base64 string.
pub fn generate_key() -> String {
    let mut key = [0u8; KEY_LENGTH];
    OsRng.fill_bytes(&mut key);
    BASE64.encode(key)
}
