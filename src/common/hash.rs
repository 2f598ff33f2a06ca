//! Hashing utilities for ringdht
//!
//! - BLAKE3 for content-derived item keys
//! - Flat modulo placement: `hash(key) % n`

/// Compute BLAKE3 hash of data, return hex string
pub fn blake3_hash(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

/// Stable 64-bit hash of a key (first 8 bytes of BLAKE3, little endian).
///
/// Unlike `std::hash`, this is identical across processes and platforms,
/// so every coordinator run places a key the same way.
pub fn key_hash(key: &str) -> u64 {
    let hash = blake3::hash(key.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(prefix)
}

/// Index of the owner of `key` among `n` peers ordered by ascending id.
///
/// This is a flat modulo scheme: changing `n` re-maps almost every key.
/// Returns `None` when `n == 0`.
pub fn owner_index(key: &str, n: usize) -> Option<usize> {
    if n == 0 {
        return None;
    }
    Some((key_hash(key) % n as u64) as usize)
}
