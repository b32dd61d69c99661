//! Custom error types for the backup runner.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Backup for {0} already exists (use --force to replace it)")]
    RunExists(String),

    #[error("Command failed: {command}\n{output}")]
    Pipeline { command: String, output: String },

    #[error("Remote store error: {0}")]
    Remote(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("{} backup item(s) failed: {}", .0.len(), .0.join(", "))]
    ItemsFailed(Vec<String>),
}

impl BackupError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        1
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_error_carries_output() {
        let err = BackupError::Pipeline {
            command: "tar -cf - etc | gzip -c".to_string(),
            output: "tar: etc: Cannot open".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("tar -cf - etc | gzip -c"));
        assert!(msg.contains("Cannot open"));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_items_failed_lists_names() {
        let err = BackupError::ItemsFailed(vec!["etc".to_string(), "home".to_string()]);
        assert_eq!(err.to_string(), "2 backup item(s) failed: etc, home");
    }
}
