//! SHA-256 of finished downloads, computed on demand off the transfer path.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

const BUF_SIZE: usize = 64 * 1024;

/// Compute SHA-256 of a file and return the digest as lowercase hex.
pub fn sha256_path(path: &Path) -> Result<String> {
    let mut f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; BUF_SIZE];
    loop {
        let n = f
            .read(&mut buf)
            .with_context(|| format!("read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Compare the file's digest against `expected` (hex, case-insensitive).
/// Returns the actual digest on mismatch.
pub fn verify_sha256(path: &Path, expected: &str) -> Result<std::result::Result<(), String>> {
    let actual = sha256_path(path)?;
    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(Ok(()))
    } else {
        Ok(Err(actual))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn sha256_path_empty_file() {
        let f = tempfile::NamedTempFile::new().unwrap();
        let digest = sha256_path(f.path()).unwrap();
        assert_eq!(
            digest,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn verify_sha256_matches_uppercase() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"hello\n").unwrap();
        f.flush().unwrap();
        let expected = "5891B5B522D5DF086D0FF0B110FBD9D21BB4FC7163AF34D08286A2E846F6BE03";
        assert_eq!(verify_sha256(f.path(), expected).unwrap(), Ok(()));
    }

    #[test]
    fn verify_sha256_reports_actual_on_mismatch() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"hello\n").unwrap();
        f.flush().unwrap();
        let res = verify_sha256(f.path(), "00").unwrap();
        assert_eq!(
            res,
            Err("5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03".to_string())
        );
    }
}
