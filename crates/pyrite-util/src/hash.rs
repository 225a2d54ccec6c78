use sha2::{Digest, Sha256};

/// Compute the SHA-256 hash of a byte slice, returning a lowercase hex string.
pub fn sha256_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Check that a digest string has the `algo:hex` shape used in lockfiles.
///
/// Accepts `sha256:<64 hex chars>` and, for forward compatibility, any
/// known-length digest with a recognized algorithm prefix.
pub fn is_valid_digest(digest: &str) -> bool {
    let Some((algo, hex)) = digest.split_once(':') else {
        return false;
    };
    let expected_len = match algo {
        "sha256" => 64,
        "sha384" => 96,
        "sha512" => 128,
        _ => return false,
    };
    hex.len() == expected_len && hex.bytes().all(|b| b.is_ascii_hexdigit())
}
