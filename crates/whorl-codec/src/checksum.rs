//! Blake3 checksums for archive entries and stored envelopes.
//!
//! Checksums are stored in the format `"blake3:<hex>"` so that the algorithm
//! is visible in manifests and inventory records.

use whorl_core::{Error, Result};

const PREFIX: &str = "blake3:";

/// Compares two strings in constant time.
///
/// Every byte of the longer input is visited regardless of where the first
/// mismatch is.
///
/// # Examples
///
/// ```
/// use whorl_codec::checksum::constant_time_compare;
///
/// assert!(constant_time_compare("blake3:abc123", "blake3:abc123"));
/// assert!(!constant_time_compare("blake3:abc123", "blake3:def456"));
/// assert!(!constant_time_compare("blake3:abc", "blake3:abcdef"));
/// ```
#[must_use]
#[allow(clippy::similar_names)]
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    let len_match = a.len() == b.len();
    let bytes_a = a.as_bytes();
    let bytes_b = b.as_bytes();

    let mut diff = 0u8;
    for i in 0..a.len().max(b.len()) {
        let byte_a = bytes_a.get(i).copied().unwrap_or(0);
        let byte_b = bytes_b.get(i).copied().unwrap_or(0);
        diff |= byte_a ^ byte_b;
    }

    len_match && diff == 0
}

/// Calculates the checksum of `data` as `"blake3:<hex>"`.
///
/// # Examples
///
/// ```
/// use whorl_codec::checksum::calculate_checksum;
///
/// let checksum = calculate_checksum(b"(module)");
/// assert!(checksum.starts_with("blake3:"));
/// assert_eq!(checksum.len(), 71);
/// ```
#[must_use]
pub fn calculate_checksum(data: &[u8]) -> String {
    format!("{PREFIX}{}", blake3::hash(data).to_hex())
}

/// Returns `true` if `data` matches `expected`.
#[must_use]
pub fn matches_checksum(data: &[u8], expected: &str) -> bool {
    constant_time_compare(&calculate_checksum(data), expected)
}

/// Verifies that `data` matches `expected`.
///
/// # Errors
///
/// Returns [`Error::CodecError`] naming `label` on mismatch.
pub fn verify_checksum(data: &[u8], expected: &str, label: &str) -> Result<()> {
    let actual = calculate_checksum(data);
    if !constant_time_compare(&actual, expected) {
        return Err(Error::codec(format!(
            "checksum mismatch for {label}: expected {expected}, got {actual}"
        )));
    }
    Ok(())
}

/// Checks that `checksum` is `blake3:` followed by 64 lowercase hex digits.
///
/// # Examples
///
/// ```
/// use whorl_codec::checksum::is_valid_checksum_format;
///
/// assert!(!is_valid_checksum_format("md5:abc123"));
/// assert!(!is_valid_checksum_format("blake3:short"));
/// ```
#[must_use]
pub fn is_valid_checksum_format(checksum: &str) -> bool {
    checksum.strip_prefix(PREFIX).is_some_and(|hex| {
        hex.len() == 64
            && hex
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
    })
}
