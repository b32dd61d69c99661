//! Custom item: stream a dump command's stdout through compress and encrypt.
//!
//! ```toml
//! [[items]]
//! name = "pgdump"
//! class = "command"
//! command = ["pg_dumpall", "-U", "postgres"]
//! extension = ".sql.gz.enc"
//! ```

use super::{decode_params, run_pipeline, validate_name, BackupItem, RunContext};
use crate::config::{Config, ItemRecord};
use crate::pipeline::Stage;
use crate::utils::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CommandParams {
    command: Vec<String>,
    #[serde(default)]
    extension: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CommandItem {
    name: String,
    producer: Stage,
    extension: String,
}

impl CommandItem {
    pub fn new(name: impl Into<String>, command: &[String], extension: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;
        let producer = Stage::from_argv(command, &format!("item {}", name))?;
        Ok(Self {
            name,
            producer,
            extension: extension.into(),
        })
    }

    /// Factory for the `command` class
    pub fn from_record(record: &ItemRecord, config: &Config) -> Result<Box<dyn BackupItem>> {
        let params: CommandParams = decode_params(record)?;
        let extension = params
            .extension
            .unwrap_or_else(|| config.pipeline.extension.clone());
        Ok(Box::new(Self::new(record.name.clone(), &params.command, extension)?))
    }
}

#[async_trait]
impl BackupItem for CommandItem {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &RunContext) -> Result<Vec<PathBuf>> {
        let artifact = ctx.artifact_path(&self.name, &self.extension);
        let pipeline = ctx.pipelines.for_command(self.producer.clone(), &artifact)?;

        info!(item = %self.name, "Dumping output of {}", self.producer.program);
        let output = run_pipeline(&self.name, pipeline, ctx.verbose).await?;
        Ok(vec![output])
    }
}
