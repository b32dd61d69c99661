//! Backup items: named units of work that drop artifacts into the run directory.
//!
//! Items are built from `[[items]]` records through the [`ItemRegistry`]. The
//! built-in `archive` class tars a directory or compresses a single file;
//! `command` streams the output of a dump command. Other classes can be
//! registered before the run starts.

pub mod archive;
pub mod command;
pub mod registry;

pub use archive::ArchiveItem;
pub use command::CommandItem;
pub use registry::{ItemFactory, ItemRegistry};

use crate::config::{Config, ItemRecord};
use crate::date_key::DateKey;
use crate::pipeline::{Pipeline, PipelineBuilder};
use crate::utils::{BackupError, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// What a run hands to every item
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_dir: PathBuf,
    pub date_key: DateKey,
    pub verbose: bool,
    pub pipelines: PipelineBuilder,
    pub config: Arc<Config>,
}

impl RunContext {
    /// Artifact path for an item: `<run_dir>/<name><extension>`
    pub fn artifact_path(&self, name: &str, extension: &str) -> PathBuf {
        self.run_dir.join(format!("{}{}", name, extension))
    }
}

#[async_trait]
pub trait BackupItem: Send + Sync {
    /// Unique name, used for the artifact file name
    fn name(&self) -> &str;

    /// Produce this item's artifacts. A missing source is not an error and
    /// yields an empty list.
    async fn run(&self, ctx: &RunContext) -> Result<Vec<PathBuf>>;
}

/// Decode the class-specific fields of a record into `T`.
pub fn decode_params<T: DeserializeOwned>(record: &ItemRecord) -> Result<T> {
    toml::Value::Table(record.params.clone())
        .try_into()
        .map_err(|e| BackupError::Config(format!("item {}: {}", record.name, e)))
}

/// Run a pipeline on a blocking worker and log the artifact it produced.
pub(crate) async fn run_pipeline(item: &str, pipeline: Pipeline, verbose: bool) -> Result<PathBuf> {
    if verbose {
        tracing::info!(item = %item, command = %pipeline, "Running backup pipeline");
    }

    let output = pipeline.output.clone();
    let size = tokio::task::spawn_blocking(move || pipeline.run())
        .await
        .map_err(|e| BackupError::Io(std::io::Error::other(e)))??;

    tracing::info!(
        item = %item,
        "Wrote {} ({})",
        output.display(),
        crate::utils::format::format_size(size)
    );
    Ok(output)
}

fn file_stem_is_safe(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && Path::new(name).components().count() == 1
}

/// Validate an item name before it becomes a file name.
pub(crate) fn validate_name(name: &str) -> Result<()> {
    if file_stem_is_safe(name) {
        Ok(())
    } else {
        Err(BackupError::Config(format!("invalid item name {:?}", name)))
    }
}
