//! Pipeline composition: archive → compress → encrypt into one artifact.
//!
//! Building a pipeline is pure; nothing is spawned until [`Pipeline::run`].

pub mod process;

use crate::config::{Config, PipelineConfig};
use crate::utils::{BackupError, Result};
use std::fmt;
use std::path::{Path, PathBuf};

/// Placeholder replaced by the encryption key path in the encrypt stage
pub const KEY_PLACEHOLDER: &str = "{key}";

/// One command in a pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub program: String,
    pub args: Vec<String>,
}

impl Stage {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Build a stage from a configured argv, e.g. `["gzip", "-c"]`.
    pub fn from_argv(argv: &[String], what: &str) -> Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| BackupError::Config(format!("{} command is empty", what)))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", shell_quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", shell_quote(arg))?;
        }
        Ok(())
    }
}

/// What the pipeline reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Directory tree, read by the archive stage
    Directory,
    /// Regular file, fed to the first stage on stdin
    File,
    /// Output of a producer command (custom items)
    Command,
}

/// A chain of stages whose last stdout is written to `output`
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub kind: SourceKind,
    pub input: Option<PathBuf>,
    pub stages: Vec<Stage>,
    pub output: PathBuf,
}

impl Pipeline {
    /// Shell-like rendering used in logs and error messages
    pub fn render(&self) -> String {
        let mut rendered = self
            .stages
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(" | ");
        if let Some(input) = &self.input {
            rendered = format!("{} < {}", rendered, shell_quote(&input.to_string_lossy()));
        }
        format!("{} > {}", rendered, shell_quote(&self.output.to_string_lossy()))
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Builds archive/compress/encrypt pipelines from the configured stage commands
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    archive: Vec<String>,
    compress: Vec<String>,
    encrypt: Vec<String>,
    encryption_key: Option<PathBuf>,
}

impl PipelineBuilder {
    pub fn new(pipeline: &PipelineConfig, encryption_key: Option<PathBuf>) -> Self {
        Self {
            archive: pipeline.archive.clone(),
            compress: pipeline.compress.clone(),
            encrypt: pipeline.encrypt.clone(),
            encryption_key,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.pipeline, config.encryption_key.clone())
    }

    /// Pipeline for a file or directory source. `Ok(None)` means the source
    /// does not exist and the caller should skip it.
    pub fn for_path(
        &self,
        source: &Path,
        excludes: &[String],
        output: &Path,
    ) -> Result<Option<Pipeline>> {
        let metadata = match std::fs::metadata(source) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut stages = Vec::with_capacity(3);
        let (kind, input) = if metadata.is_dir() {
            stages.push(self.archive_stage(source, excludes)?);
            (SourceKind::Directory, None)
        } else {
            (SourceKind::File, Some(source.to_path_buf()))
        };
        stages.push(Stage::from_argv(&self.compress, "compress")?);
        stages.push(self.encrypt_stage()?);

        Ok(Some(Pipeline {
            kind,
            input,
            stages,
            output: output.to_path_buf(),
        }))
    }

    /// Pipeline streaming a producer command's stdout through compress and encrypt
    pub fn for_command(&self, producer: Stage, output: &Path) -> Result<Pipeline> {
        Ok(Pipeline {
            kind: SourceKind::Command,
            input: None,
            stages: vec![
                producer,
                Stage::from_argv(&self.compress, "compress")?,
                self.encrypt_stage()?,
            ],
            output: output.to_path_buf(),
        })
    }

    fn archive_stage(&self, source: &Path, excludes: &[String]) -> Result<Stage> {
        let mut stage = Stage::from_argv(&self.archive, "archive")?;
        for pattern in excludes {
            stage = stage.arg(format!("--exclude={}", pattern));
        }

        let (parent, base) = match (source.parent(), source.file_name()) {
            (Some(parent), Some(base)) if !parent.as_os_str().is_empty() => {
                (parent.to_path_buf(), base.to_string_lossy().to_string())
            }
            (Some(_), Some(base)) => (PathBuf::from("."), base.to_string_lossy().to_string()),
            _ => (source.to_path_buf(), ".".to_string()),
        };

        Ok(stage
            .arg("-C")
            .arg(parent.to_string_lossy().to_string())
            .arg("-cf")
            .arg("-")
            .arg(base))
    }

    fn encrypt_stage(&self) -> Result<Stage> {
        let needs_key = self.encrypt.iter().any(|a| a.contains(KEY_PLACEHOLDER));
        if !needs_key {
            return Stage::from_argv(&self.encrypt, "encrypt");
        }

        let key = self.encryption_key.as_ref().ok_or_else(|| {
            BackupError::Config("encryption_key is not configured".to_string())
        })?;
        if !key.is_file() {
            return Err(BackupError::Config(format!(
                "encryption key {} does not exist",
                key.display()
            )));
        }

        let key = key.to_string_lossy();
        let argv: Vec<String> = self
            .encrypt
            .iter()
            .map(|a| a.replace(KEY_PLACEHOLDER, &key))
            .collect();
        Stage::from_argv(&argv, "encrypt")
    }
}

fn shell_quote(s: &str) -> String {
    let plain = !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%{}".contains(c));
    if plain {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}
