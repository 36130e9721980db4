//! Hash utilities for archive verification.
//!
//! The repository publishes a SHA-256 next to every archive as lowercase hex.
//! This module computes and checks those hashes against files on disk.

use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Size of each read while hashing.
const CHUNK_SIZE: usize = 128 * 1024;

/// Compute the SHA-256 of a file and return it as lowercase hex.
///
/// Uses streaming to handle large files without loading into memory.
/// A missing file is reported as [`Error::NotFound`].
pub fn compute_file_hash(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| Error::io(path, e))?;

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut hasher = Sha256::new();

    loop {
        let bytes_read = file.read(&mut buf).map_err(|e| Error::io(path, e))?;

        if bytes_read == 0 {
            break;
        }

        hasher.update(&buf[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Whether `path` already holds the content described by `expected_hash`.
///
/// An empty expected hash means "not known yet" and never matches, so the
/// archive is always fetched again. Unreadable or missing files are treated
/// the same as a mismatch.
pub fn is_already_valid(path: &Path, expected_hash: &str) -> bool {
    if expected_hash.is_empty() {
        return false;
    }

    match compute_file_hash(path) {
        Ok(actual) => actual.eq_ignore_ascii_case(expected_hash),
        Err(_) => false,
    }
}
