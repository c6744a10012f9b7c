//! SHA-256 helpers used while streaming artifacts to disk.

use indicatif::ProgressBar;
use sha2::{Digest, Sha256};
use std::io::{Read, Write};
use std::path::Path;

/// Chunk size for streaming copies (64KB)
const CHUNK_SIZE: usize = 64 * 1024;

/// Copy `reader` into `writer`, hashing the bytes in the same pass.
///
/// Returns the number of bytes copied and the lowercase hex digest.
pub fn copy_hashed(
    reader: &mut dyn Read,
    writer: &mut dyn Write,
    pb: &ProgressBar,
) -> std::io::Result<(u64, String)> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;

    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..n]);
        writer.write_all(&buffer[..n])?;
        total += n as u64;
        pb.set_position(total);
    }
    writer.flush()?;

    Ok((total, hex::encode(hasher.finalize())))
}

/// Compute the SHA-256 of a file (used by `recipe hash`).
pub fn sha256_file(path: &Path) -> std::io::Result<String> {
    let mut f = std::fs::File::open(path)?;
    let (_, digest) = copy_hashed(&mut f, &mut std::io::sink(), &ProgressBar::hidden())?;
    Ok(digest)
}

/// Case-insensitive comparison of hex digests.
pub fn checksum_matches(expected: &str, actual: &str) -> bool {
    expected.trim().eq_ignore_ascii_case(actual)
}

#[cfg(test)]
mod tests {
    use super::*;

    // SHA256 of "hello world"
    const HELLO_SHA256: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[test]
    fn test_copy_hashed() {
        let mut out = Vec::new();
        let (n, digest) =
            copy_hashed(&mut &b"hello world"[..], &mut out, &ProgressBar::hidden()).unwrap();
        assert_eq!(n, 11);
        assert_eq!(out, b"hello world");
        assert_eq!(digest, HELLO_SHA256);
    }

    #[test]
    fn test_sha256_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("test.txt");
        std::fs::write(&file_path, b"hello world").unwrap();
        assert_eq!(sha256_file(&file_path).unwrap(), HELLO_SHA256);
    }

    #[test]
    fn test_case_insensitive_comparison() {
        assert!(checksum_matches(&HELLO_SHA256.to_uppercase(), HELLO_SHA256));
        assert!(!checksum_matches("wrong_hash", HELLO_SHA256));
    }
}
