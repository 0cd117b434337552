use sha2::{Digest, Sha256};

/// Fingerprint of an empty (or whitespace-only) diff: the SHA-256 of "".
pub const EMPTY_FINGERPRINT: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Line endings folded to `\n`, surrounding whitespace trimmed.
#[must_use]
pub fn normalize_diff(diff: &str) -> String {
    diff.replace("\r\n", "\n").replace('\r', "\n").trim().to_string()
}

/// Lowercase hex SHA-256 of the normalized diff. Stable across processes.
#[must_use]
pub fn fingerprint(diff: &str) -> String {
    let normalized = normalize_diff(diff);
    if normalized.is_empty() {
        return EMPTY_FINGERPRINT.to_string();
    }
    let digest = Sha256::digest(normalized.as_bytes());
    hex_encode_lower(&digest)
}

fn hex_encode_lower(bytes: &[u8]) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(bytes.len().saturating_mul(2));
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

/// First characters of a fingerprint, for log lines.
pub(crate) fn short(fingerprint: &str) -> &str {
    fingerprint.get(..8).unwrap_or(fingerprint)
}
