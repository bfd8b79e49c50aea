//! Privacy-preserving IP hashing.
//!
//! Raw client IPs are never persisted. Rate-limit keys and guestbook
//! provenance use the first 16 hex characters of `SHA-256(ip || salt)`
//! instead: stable for a given (ip, salt) pair, not invertible, and short
//! enough to keep key-value keys compact. This is a deduplication
//! identifier, not a general-purpose fingerprint.

use sha2::{Digest, Sha256};

/// Length of the hex identifier produced by [`hash_ip`].
pub const HASH_LEN: usize = 16;

/// Hashes an IP address with the operator salt into a fixed-length
/// identifier.
pub fn hash_ip(ip: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ip.as_bytes());
    hasher.update(salt.as_bytes());
    let digest = hasher.finalize();

    // 16 hex chars cover the first 8 digest bytes.
    hex_encode(&digest[..HASH_LEN / 2])
}

/// Encodes bytes as a lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}
