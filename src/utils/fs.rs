//! Atomic file replacement.
//!
//! Durable artifacts (model checkpoint, review log) are replaced by writing
//! a sibling temp file and renaming it over the target, so a crash mid-write
//! leaves the previous full copy intact.

use crate::error::{Error, Result};
use std::path::Path;

/// Write `contents` to `path` atomically.
///
/// The parent directory is created if missing. The rename is atomic on the
/// same filesystem, which the sibling temp file guarantees.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::ArtifactWrite {
            path: path.to_path_buf(),
            source: e,
        })?;
    }

    let tmp = temp_sibling(path);
    std::fs::write(&tmp, contents).map_err(|e| Error::ArtifactWrite {
        path: tmp.clone(),
        source: e,
    })?;

    std::fs::rename(&tmp, path).map_err(|e| {
        // Best effort: do not leave the temp file behind on failure.
        let _ = std::fs::remove_file(&tmp);
        Error::ArtifactWrite {
            path: path.to_path_buf(),
            source: e,
        }
    })
}

fn temp_sibling(path: &Path) -> std::path::PathBuf {
    let mut name = path
        .file_name()
        .map_or_else(|| std::ffi::OsString::from("artifact"), ToOwned::to_owned);
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_atomic_creates_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.json");
        write_atomic(&path, b"{\"a\":1}").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"{\"a\":1}");
    }

    #[test]
    fn test_write_atomic_replaces_existing_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.json");
        write_atomic(&path, b"old").unwrap();
        write_atomic(&path, b"new").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"new");
        // No temp file left behind.
        assert!(!path.with_file_name("out.json.tmp").exists());
    }

    #[test]
    fn test_write_atomic_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/deep/out.json");
        write_atomic(&path, b"x").unwrap();
        assert!(path.exists());
    }
}
