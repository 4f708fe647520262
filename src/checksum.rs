//! SHA-256 checksum computation and verification

use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncReadExt;

const CHUNK_SIZE: usize = 64 * 1024;

/// Compute the lowercase hex SHA-256 digest of a file
///
/// The file is streamed in fixed-size chunks so multi-gigabyte artifacts are
/// never held in memory.
pub async fn compute_digest(path: &Path) -> std::io::Result<String> {
    let mut file = fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];

    loop {
        let bytes_read = file.read(&mut buffer).await?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Check a file against an expected digest
///
/// `expected` must be lowercase hex, as produced by [`compute_digest`].
/// Returns false when `expected` is empty or the file cannot be read.
/// Callers decide what an undeclared checksum means.
pub async fn verify(path: &Path, expected: &str) -> bool {
    if expected.is_empty() {
        return false;
    }

    match compute_digest(path).await {
        Ok(actual) => {
            let matches = actual == expected;
            if !matches {
                tracing::warn!(
                    path = ?path,
                    expected = %expected,
                    actual = %actual,
                    "Checksum mismatch"
                );
            }
            matches
        }
        Err(e) => {
            tracing::warn!(path = ?path, error = %e, "Failed to read file for checksum");
            false
        }
    }
}

/// Digest of an in-memory string, used for deterministic cache file names
pub fn digest_str(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}
