//! Configuration management for the backup runner.
//!
//! Settings come from `<config_root>/config.toml`, item drop-ins from
//! `<config_root>/items.d/*.toml`, and secrets from the environment (optionally
//! seeded by `<config_root>/.env`). A missing file is never an error: an
//! unconfigured host simply has nothing to back up.

use crate::utils::{BackupError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CONFIG_FILE: &str = "config.toml";
pub const ITEMS_DIR: &str = "items.d";
pub const DEFAULT_CONFIG_ROOT: &str = "/etc/nightly-backup";

const ENV_ENCRYPTION_KEY: &str = "BACKUP_ENCRYPTION_KEY";
const ENV_S3_ACCESS_KEY_ID: &str = "BACKUP_S3_ACCESS_KEY_ID";
const ENV_S3_SECRET_ACCESS_KEY: &str = "BACKUP_S3_SECRET_ACCESS_KEY";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Host identity used in remote container names
    pub host: String,

    /// Optional domain appended to `host` to form the FQDN
    pub domain: Option<String>,

    /// Root directory holding one sub-directory per daily run
    pub backup_root: PathBuf,

    /// Key file handed to the encrypt stage as `{key}`
    pub encryption_key: Option<PathBuf>,

    /// Run every item even after a failure, then fail the run with a summary
    pub keep_going: bool,

    pub log: LogConfig,
    pub pipeline: PipelineConfig,
    pub remote: RemoteConfig,
    pub retention: RetentionConfig,

    /// Declarative item records
    pub items: Vec<ItemRecord>,

    /// Per-invocation switches, set from the command line
    #[serde(skip)]
    pub flags: RunFlags,
}

#[derive(Debug, Clone, Default)]
pub struct RunFlags {
    pub force: bool,
    pub skip_remote: bool,
    pub skip_cleanup: bool,
    pub verbose: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Archive command; tar-compatible arguments are appended
    #[serde(default = "default_archive")]
    pub archive: Vec<String>,

    /// Compression filter (stdin to stdout)
    #[serde(default = "default_compress")]
    pub compress: Vec<String>,

    /// Encryption filter (stdin to stdout); `{key}` is replaced by the key path
    #[serde(default = "default_encrypt")]
    pub encrypt: Vec<String>,

    /// Artifact file extension
    #[serde(default = "default_extension")]
    pub extension: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteKind {
    S3,
    Directory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_remote_kind")]
    pub kind: RemoteKind,

    #[serde(default = "default_region")]
    pub region: String,

    /// Custom endpoint for S3-compatible storage
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub access_key_id: Option<String>,

    #[serde(default)]
    pub secret_access_key: Option<String>,

    /// Mirror root for `kind = "directory"`
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Leave objects that already exist in the container untouched
    #[serde(default = "default_true")]
    pub skip_existing: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetentionConfig {
    #[serde(default)]
    pub local: LocalRetentionConfig,

    #[serde(default)]
    pub remote: RemoteRetentionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocalRetentionConfig {
    /// Every entry this many days old or younger is kept
    #[serde(default = "default_recent_days")]
    pub recent_days: i64,

    /// Minimum number of recent entries before anything is deleted
    #[serde(default = "default_min_recent")]
    pub min_recent: usize,

    /// Mondays this many days old or younger are kept
    #[serde(default = "default_weekly_days")]
    pub weekly_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteRetentionConfig {
    /// Number of most recent dates kept in the remote store
    #[serde(default = "default_keep_count")]
    pub keep_count: usize,
}

/// One `[[items]]` entry. Class-specific fields stay in `params` and are
/// decoded by the factory registered for `class`.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemRecord {
    pub name: String,

    #[serde(default)]
    pub class: Option<String>,

    #[serde(flatten)]
    pub params: toml::Table,
}

#[derive(Debug, Default, Deserialize)]
struct ItemsFile {
    #[serde(default)]
    items: Vec<ItemRecord>,
}

// Default values
fn default_log_level() -> String {
    "info".to_string()
}

fn default_archive() -> Vec<String> {
    vec!["tar".to_string()]
}

fn default_compress() -> Vec<String> {
    vec!["gzip".to_string(), "-c".to_string()]
}

fn default_encrypt() -> Vec<String> {
    ["openssl", "enc", "-aes-256-cbc", "-salt", "-pbkdf2", "-pass", "file:{key}"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_extension() -> String {
    ".tgz.enc".to_string()
}

fn default_remote_kind() -> RemoteKind {
    RemoteKind::S3
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_true() -> bool {
    true
}

fn default_recent_days() -> i64 {
    14
}

fn default_min_recent() -> usize {
    14
}

fn default_weekly_days() -> i64 {
    62
}

fn default_keep_count() -> usize {
    3
}

fn default_host() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: default_host(),
            domain: None,
            backup_root: PathBuf::from("/var/backups/nightly"),
            encryption_key: None,
            keep_going: false,
            log: LogConfig::default(),
            pipeline: PipelineConfig::default(),
            remote: RemoteConfig::default(),
            retention: RetentionConfig::default(),
            items: Vec::new(),
            flags: RunFlags::default(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            archive: default_archive(),
            compress: default_compress(),
            encrypt: default_encrypt(),
            extension: default_extension(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            kind: default_remote_kind(),
            region: default_region(),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            path: None,
            skip_existing: true,
        }
    }
}

impl Default for LocalRetentionConfig {
    fn default() -> Self {
        Self {
            recent_days: default_recent_days(),
            min_recent: default_min_recent(),
            weekly_days: default_weekly_days(),
        }
    }
}

impl Default for RemoteRetentionConfig {
    fn default() -> Self {
        Self {
            keep_count: default_keep_count(),
        }
    }
}

impl Config {
    /// Load settings, item drop-ins and environment overrides from a config root.
    pub fn load(config_root: &Path) -> Result<Self> {
        match dotenvy::from_path(config_root.join(".env")) {
            Ok(()) => debug!("Loaded environment from {}", config_root.join(".env").display()),
            Err(e) if e.not_found() => {}
            Err(e) => return Err(BackupError::Config(format!("invalid .env file: {}", e))),
        }

        let config_path = config_root.join(CONFIG_FILE);
        let mut config = if config_path.is_file() {
            Self::from_file(&config_path)?
        } else {
            debug!("No configuration at {}, using defaults", config_path.display());
            Config::default()
        };

        config.items.extend(load_item_dropins(&config_root.join(ITEMS_DIR))?);
        config.apply_overrides(|name| std::env::var(name).ok());

        Ok(config)
    }

    /// Load configuration from a single TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply `BACKUP_*` overrides; `lookup` resolves a variable name.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup(ENV_ENCRYPTION_KEY) {
            self.encryption_key = Some(PathBuf::from(key));
        }
        if let Some(id) = lookup(ENV_S3_ACCESS_KEY_ID) {
            self.remote.access_key_id = Some(id);
        }
        if let Some(secret) = lookup(ENV_S3_SECRET_ACCESS_KEY) {
            self.remote.secret_access_key = Some(secret);
        }
    }

    /// Fully-qualified host name used for remote container naming
    pub fn host_fqdn(&self) -> String {
        match self.domain.as_deref() {
            Some(domain) if !domain.is_empty() && !self.host.ends_with(domain) => {
                format!("{}.{}", self.host, domain)
            }
            _ => self.host.clone(),
        }
    }

    /// Whether this invocation talks to the remote store at all
    pub fn remote_active(&self) -> bool {
        self.remote.enabled && !self.flags.skip_remote
    }
}

fn load_item_dropins(dir: &Path) -> Result<Vec<ItemRecord>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    files.sort();

    let mut items = Vec::new();
    for file in files {
        let content = std::fs::read_to_string(&file)?;
        let parsed: ItemsFile = toml::from_str(&content).map_err(|e| {
            BackupError::Config(format!("{}: {}", file.display(), e))
        })?;
        debug!("Loaded {} item(s) from {}", parsed.items.len(), file.display());
        items.extend(parsed.items);
    }

    Ok(items)
}
