//! Filesystem-backed store: containers are directories, objects are files.
//!
//! Useful for NAS mounts and offline mirrors.

use super::RemoteStore;
use crate::fs::walker::{walk_directory, WalkOptions};
use crate::utils::{BackupError, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn container_path(&self, container: &str) -> Result<PathBuf> {
        check_component(container)?;
        Ok(self.root.join(container))
    }

    fn object_path(&self, container: &str, name: &str) -> Result<PathBuf> {
        check_component(name)?;
        Ok(self.container_path(container)?.join(name))
    }

    async fn list(&self, dir: PathBuf, dirs: bool) -> Result<Vec<String>> {
        if !tokio::fs::try_exists(&dir).await? {
            return Ok(Vec::new());
        }
        let options = WalkOptions { include_dirs: dirs };
        let entries = tokio::task::spawn_blocking(move || walk_directory(&dir, options))
            .await
            .map_err(std::io::Error::other)??;
        Ok(entries
            .into_iter()
            .filter(|e| e.is_dir == dirs)
            .map(|e| e.name)
            .collect())
    }
}

fn check_component(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(BackupError::Remote(format!("invalid name {:?}", name)));
    }
    Ok(())
}

#[async_trait]
impl RemoteStore for DirectoryStore {
    async fn ensure_container(&self, container: &str) -> Result<()> {
        let path = self.container_path(container)?;
        if !tokio::fs::try_exists(&path).await? {
            debug!(container, "Creating container directory");
        }
        tokio::fs::create_dir_all(&path).await?;
        Ok(())
    }

    async fn list_containers(&self) -> Result<Vec<String>> {
        self.list(self.root.clone(), true).await
    }

    async fn list_objects(&self, container: &str) -> Result<Vec<String>> {
        let path = self.container_path(container)?;
        self.list(path, false).await
    }

    async fn object_exists(&self, container: &str, name: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.object_path(container, name)?).await?)
    }

    async fn upload(&self, container: &str, name: &str, path: &Path) -> Result<u64> {
        let target = self.object_path(container, name)?;
        match tokio::fs::copy(path, &target).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound && !tokio::fs::try_exists(path).await? => {
                Err(e.into())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(BackupError::Remote(format!(
                "container {} does not exist",
                container
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_object(&self, container: &str, name: &str) -> Result<()> {
        tokio::fs::remove_file(self.object_path(container, name)?).await?;
        Ok(())
    }

    async fn delete_container(&self, container: &str) -> Result<()> {
        tokio::fs::remove_dir(self.container_path(container)?).await?;
        Ok(())
    }
}
