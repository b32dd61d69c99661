//! Built-in item: tar a directory tree or compress a single file.

use super::{decode_params, run_pipeline, validate_name, BackupItem, RunContext};
use crate::config::{Config, ItemRecord};
use crate::fs::walker::build_globset;
use crate::pipeline::SourceKind;
use crate::utils::{BackupError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ArchiveParams {
    source: PathBuf,
    #[serde(default)]
    exclude: Vec<String>,
    #[serde(default)]
    extension: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ArchiveItem {
    name: String,
    source: PathBuf,
    excludes: Vec<String>,
    extension: String,
}

impl ArchiveItem {
    pub fn new(
        name: impl Into<String>,
        source: impl Into<PathBuf>,
        excludes: Vec<String>,
        extension: impl Into<String>,
    ) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;
        build_globset(&excludes)
            .map_err(|e| BackupError::Config(format!("item {}: {}", name, e)))?;

        Ok(Self {
            name,
            source: source.into(),
            excludes,
            extension: extension.into(),
        })
    }

    /// Factory for the `archive` class
    pub fn from_record(record: &ItemRecord, config: &Config) -> Result<Box<dyn BackupItem>> {
        let params: ArchiveParams = decode_params(record)?;
        let extension = params
            .extension
            .unwrap_or_else(|| config.pipeline.extension.clone());
        Ok(Box::new(Self::new(
            record.name.clone(),
            params.source,
            params.exclude,
            extension,
        )?))
    }
}

#[async_trait]
impl BackupItem for ArchiveItem {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &RunContext) -> Result<Vec<PathBuf>> {
        let artifact = ctx.artifact_path(&self.name, &self.extension);
        let Some(pipeline) = ctx.pipelines.for_path(&self.source, &self.excludes, &artifact)? else {
            warn!(
                item = %self.name,
                "Source {} does not exist, skipping",
                self.source.display()
            );
            return Ok(Vec::new());
        };

        match pipeline.kind {
            SourceKind::Directory => info!(item = %self.name, "Archiving directory {}", self.source.display()),
            _ => info!(item = %self.name, "Compressing file {}", self.source.display()),
        }

        let output = run_pipeline(&self.name, pipeline, ctx.verbose).await?;
        Ok(vec![output])
    }
}
