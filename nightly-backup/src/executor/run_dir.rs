//! Today's run directory: `<backup_root>/<YYMMDDwww>`.

use crate::date_key::DateKey;
use crate::fs::walker::{walk_directory, FileInfo, WalkOptions};
use crate::utils::{BackupError, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct RunDirectory {
    path: PathBuf,
}

impl RunDirectory {
    /// Create the directory for `key`.
    ///
    /// Fails with [`BackupError::RunExists`] if it is already there, unless
    /// `force` is set, in which case the previous run is deleted first. The
    /// directory itself is created exclusively, so of two concurrent runs for
    /// the same day only one gets it.
    pub fn acquire(backup_root: &Path, key: DateKey, force: bool) -> Result<Self> {
        let path = backup_root.join(key.to_string());
        std::fs::create_dir_all(backup_root)?;

        if force && path.exists() {
            warn!("Removing existing backup {} (forced)", path.display());
            if path.is_dir() {
                std::fs::remove_dir_all(&path)?;
            } else {
                std::fs::remove_file(&path)?;
            }
        }

        match std::fs::create_dir(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(BackupError::RunExists(path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        }
        info!("Created backup directory {}", path.display());

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Artifact files currently in the directory, sorted by name
    pub fn artifacts(&self) -> Result<Vec<FileInfo>> {
        Ok(walk_directory(&self.path, WalkOptions::default())?)
    }
}
