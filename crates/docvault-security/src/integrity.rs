// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document integrity — SHA-256 fingerprints used as the deduplication key.

use std::io::Read;
use std::path::Path;

use docvault_core::error::{Result, VaultError};
use sha2::{Digest, Sha256};

/// Size of the read window used when hashing streams.
pub const HASH_WINDOW: usize = 8 * 1024;

/// Compute the SHA-256 hash of `data` and return it as a lowercase hex string.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Hash everything `reader` yields, 8 KiB at a time.
pub fn hash_reader<R: Read>(mut reader: R) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut window = [0u8; HASH_WINDOW];
    loop {
        let n = match reader.read(&mut window) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        hasher.update(&window[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Hash a file on disk without loading it whole.
pub fn hash_file(path: &Path) -> Result<String> {
    hash_reader(std::fs::File::open(path)?)
}

/// Verify that `data` matches the expected SHA-256 hex digest.
///
/// Returns `Err(VaultError::IntegrityMismatch)` with the expected and actual
/// values when it does not.
pub fn verify_hash(data: &[u8], expected_hex: &str) -> Result<()> {
    let actual = hash_bytes(data);
    if actual == expected_hex {
        Ok(())
    } else {
        Err(VaultError::IntegrityMismatch {
            expected: expected_hex.to_owned(),
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// SHA-256 of the empty byte slice (well-known constant).
    const EMPTY_SHA256: &str =
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn hash_empty_input() {
        assert_eq!(hash_bytes(b""), EMPTY_SHA256);
        assert_eq!(hash_reader(Cursor::new(Vec::new())).unwrap(), EMPTY_SHA256);
    }

    #[test]
    fn hash_known_value() {
        let expected = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";
        assert_eq!(hash_bytes(b"hello"), expected);
    }

    #[test]
    fn reader_matches_buffer_across_window_boundaries() {
        for len in [HASH_WINDOW - 1, HASH_WINDOW, HASH_WINDOW + 1, 3 * HASH_WINDOW + 17] {
            let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            assert_eq!(hash_reader(Cursor::new(&data)).unwrap(), hash_bytes(&data));
        }
    }

    #[test]
    fn hash_file_matches_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.pdf");
        std::fs::write(&path, b"%PDF-1.5 fake").unwrap();
        assert_eq!(hash_file(&path).unwrap(), hash_bytes(b"%PDF-1.5 fake"));
    }

    #[test]
    fn verify_mismatched_hash() {
        match verify_hash(b"a", "0000") {
            Err(VaultError::IntegrityMismatch { expected, actual }) => {
                assert_eq!(expected, "0000");
                assert_eq!(actual, hash_bytes(b"a"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        let hex = hash_bytes(b"docvault");
        assert!(verify_hash(b"docvault", &hex).is_ok());
    }
}
