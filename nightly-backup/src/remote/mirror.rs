//! Copy a run directory's artifacts into its dated remote container.

use super::{container_name, RemoteStore};
use crate::date_key::DateKey;
use crate::fs::walker::{walk_directory, WalkOptions};
use crate::utils::format::format_size;
use crate::utils::Result;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorSummary {
    pub container: Option<String>,
    pub uploaded: Vec<String>,
    pub skipped: Vec<String>,
    pub bytes: u64,
}

/// Upload every file in `run_dir` to `backup.<key>.<host>`.
///
/// With `unless_exists`, objects already present in the container are left
/// alone. An empty run directory does not touch the store at all.
pub async fn mirror_run(
    store: &dyn RemoteStore,
    run_dir: &Path,
    key: &DateKey,
    host: &str,
    unless_exists: bool,
) -> Result<MirrorSummary> {
    let dir = run_dir.to_path_buf();
    let artifacts = tokio::task::spawn_blocking(move || walk_directory(&dir, WalkOptions::default()))
        .await
        .map_err(std::io::Error::other)??;

    let mut summary = MirrorSummary::default();
    if artifacts.is_empty() {
        info!("No artifacts in {}, nothing to mirror", run_dir.display());
        return Ok(summary);
    }

    let container = container_name(key, host);
    store.ensure_container(&container).await?;

    for artifact in artifacts {
        if unless_exists && store.object_exists(&container, &artifact.name).await? {
            info!(container = %container, "Skipping {}, already uploaded", artifact.name);
            summary.skipped.push(artifact.name);
            continue;
        }

        let bytes = store.upload(&container, &artifact.name, &artifact.path).await?;
        info!(
            container = %container,
            "Uploaded {} ({})",
            artifact.name,
            format_size(bytes)
        );
        summary.bytes += bytes;
        summary.uploaded.push(artifact.name);
    }

    summary.container = Some(container);
    Ok(summary)
}
