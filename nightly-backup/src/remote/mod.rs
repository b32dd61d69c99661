//! Remote object store: one container per date per host.
//!
//! Containers are named `backup.<YYMMDDwww>.<host>`; objects keep the artifact
//! file name. A container that does not exist yet is never an error: listing
//! it yields nothing and mirroring creates it on demand.

pub mod directory;
pub mod mirror;
pub mod s3;

pub use directory::DirectoryStore;
pub use mirror::{mirror_run, MirrorSummary};
pub use s3::S3Store;

use crate::config::{RemoteConfig, RemoteKind};
use crate::date_key::DateKey;
use crate::utils::{BackupError, Result};
use async_trait::async_trait;
use std::path::Path;

pub const CONTAINER_PREFIX: &str = "backup.";

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Create the container unless it already exists
    async fn ensure_container(&self, container: &str) -> Result<()>;

    async fn list_containers(&self) -> Result<Vec<String>>;

    /// Object names in a container; empty if the container does not exist
    async fn list_objects(&self, container: &str) -> Result<Vec<String>>;

    async fn object_exists(&self, container: &str, name: &str) -> Result<bool>;

    /// Upload a local file, returning the number of bytes sent
    async fn upload(&self, container: &str, name: &str, path: &Path) -> Result<u64>;

    async fn delete_object(&self, container: &str, name: &str) -> Result<()>;

    /// Delete an empty container
    async fn delete_container(&self, container: &str) -> Result<()>;
}

/// Container name for a date and host
pub fn container_name(key: &DateKey, host: &str) -> String {
    format!("{}{}.{}", CONTAINER_PREFIX, key, host)
}

/// Date embedded in a container name, if the name belongs to `host`
pub fn parse_container(name: &str, host: &str) -> Option<DateKey> {
    let rest = name.strip_prefix(CONTAINER_PREFIX)?;
    let (key, container_host) = rest.split_once('.')?;
    if container_host != host {
        return None;
    }
    DateKey::parse(key)
}

/// Open the configured store
pub async fn connect(config: &RemoteConfig) -> Result<Box<dyn RemoteStore>> {
    match config.kind {
        RemoteKind::S3 => Ok(Box::new(S3Store::new(config).await?)),
        RemoteKind::Directory => {
            let path = config.path.as_ref().ok_or_else(|| {
                BackupError::Config("remote.path is required for kind = \"directory\"".to_string())
            })?;
            Ok(Box::new(DirectoryStore::new(path)))
        }
    }
}
