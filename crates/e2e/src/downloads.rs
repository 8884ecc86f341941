//! Exported floorplan lifecycle: locating, hashing and removing the file
//! the editor writes into the downloads directory.

use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::E2eResult;

/// The editor names exports `floorplan<suffix>.json`
pub fn exported_file_path(downloads_dir: &Path, suffix: &str) -> PathBuf {
    downloads_dir.join(format!("floorplan{}.json", suffix))
}

/// Hex SHA-256 of a file's contents
pub fn sha256_file(path: &Path) -> E2eResult<String> {
    let bytes = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// Outcome of removing an exported file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Removal {
    Removed,
    Absent,
    Failed(String),
}

/// Delete the exported file if it exists.
///
/// Never fails the caller: teardown runs after failed scenarios too, and a
/// leftover file is only worth a warning.
pub fn remove_exported(path: &Path) -> Removal {
    match std::fs::remove_file(path) {
        Ok(()) => {
            info!("Removed exported floorplan {}", path.display());
            Removal::Removed
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("No exported floorplan at {}", path.display());
            Removal::Absent
        }
        Err(e) => {
            warn!("Could not remove {}: {}", path.display(), e);
            Removal::Failed(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exported_file_path() {
        let path = exported_file_path(Path::new("/home/u/Downloads"), "_nightwatch_exported");
        assert_eq!(
            path,
            PathBuf::from("/home/u/Downloads/floorplan_nightwatch_exported.json")
        );
    }

    #[test]
    fn test_remove_exported() {
        let dir = tempfile::tempdir().unwrap();
        let path = exported_file_path(dir.path(), "_t");
        std::fs::write(&path, "{}").unwrap();

        assert_eq!(remove_exported(&path), Removal::Removed);
        assert!(!path.exists());
        assert_eq!(remove_exported(&path), Removal::Absent);
    }

    #[test]
    fn test_sha256_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.json");
        std::fs::write(&path, "abc").unwrap();
        assert_eq!(
            sha256_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
