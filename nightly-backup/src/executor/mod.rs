//! Backup run orchestration.
//!
//! A run goes through these phases, in order:
//! - instantiate the configured items
//! - acquire today's run directory
//! - run every item, one after another
//! - mirror the run directory to the remote store
//! - apply local and remote retention
//!
//! The first failing item aborts the run; nothing after it executes.

pub mod run_dir;

use crate::config::Config;
use crate::date_key::DateKey;
use crate::fs::walker::total_size;
use crate::items::{ItemRegistry, RunContext};
use crate::pipeline::PipelineBuilder;
use crate::remote::{self, mirror_run, MirrorSummary, RemoteStore};
use crate::retention::{prune_local, prune_remote, LocalPolicy};
use crate::utils::format::format_size;
use crate::utils::{BackupError, Result};
use chrono::NaiveDateTime;
use run_dir::RunDirectory;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info};

/// What a run did
#[derive(Debug, Clone)]
pub struct RunReport {
    pub date_key: DateKey,
    pub run_dir: Option<PathBuf>,
    pub items: usize,
    pub artifacts: Vec<PathBuf>,
    pub mirror: Option<MirrorSummary>,
    pub pruned_local: Vec<PathBuf>,
    pub pruned_remote: Vec<String>,
}

impl RunReport {
    fn new(date_key: DateKey) -> Self {
        Self {
            date_key,
            run_dir: None,
            items: 0,
            artifacts: Vec::new(),
            mirror: None,
            pruned_local: Vec::new(),
            pruned_remote: Vec::new(),
        }
    }
}

pub struct Orchestrator {
    config: Arc<Config>,
    registry: ItemRegistry,
}

impl Orchestrator {
    pub fn new(config: Config, registry: ItemRegistry) -> Self {
        Self {
            config: Arc::new(config),
            registry,
        }
    }

    /// Execute one run for the day of `now`
    pub async fn run(&self, now: NaiveDateTime) -> Result<RunReport> {
        let key = DateKey::new(now.date());
        let mut report = RunReport::new(key);

        let items = self.registry.instantiate(&self.config)?;
        if items.is_empty() {
            info!("No backup items configured, nothing to do");
            return Ok(report);
        }
        report.items = items.len();

        let run_dir = RunDirectory::acquire(&self.config.backup_root, key, self.config.flags.force)?;
        report.run_dir = Some(run_dir.path().to_path_buf());

        let ctx = RunContext {
            run_dir: run_dir.path().to_path_buf(),
            date_key: key,
            verbose: self.config.flags.verbose,
            pipelines: PipelineBuilder::from_config(&self.config),
            config: Arc::clone(&self.config),
        };

        let mut failed = Vec::new();
        for item in &items {
            debug!(item = %item.name(), "Starting backup item");
            match item.run(&ctx).await {
                Ok(paths) => report.artifacts.extend(paths),
                Err(e) if self.config.keep_going => {
                    error!(item = %item.name(), "Backup item failed: {}", e);
                    failed.push(item.name().to_string());
                }
                Err(e) => {
                    error!(item = %item.name(), "Backup item failed, aborting run");
                    return Err(e);
                }
            }
        }
        if !failed.is_empty() {
            return Err(BackupError::ItemsFailed(failed));
        }

        let artifacts = run_dir.artifacts()?;
        info!(
            "Backed up {} item(s) into {}: {} artifact(s), {}",
            items.len(),
            run_dir.path().display(),
            artifacts.len(),
            format_size(total_size(&artifacts))
        );

        let host = self.config.host_fqdn();
        let mut store: Option<Box<dyn RemoteStore>> = None;

        if !self.config.remote_active() {
            debug!("Remote mirroring disabled");
        } else if artifacts.is_empty() {
            info!("No artifacts, skipping remote mirror");
        } else {
            let connected = remote::connect(&self.config.remote).await?;
            let unless_exists = self.config.remote.skip_existing && !self.config.flags.force;
            report.mirror =
                Some(mirror_run(connected.as_ref(), run_dir.path(), &key, &host, unless_exists).await?);
            store = Some(connected);
        }

        if self.config.flags.skip_cleanup {
            info!("Skipping cleanup");
            return Ok(report);
        }

        let root = self.config.backup_root.clone();
        let policy = LocalPolicy::from(&self.config.retention.local);
        report.pruned_local = tokio::task::spawn_blocking(move || prune_local(&root, now, &policy))
            .await
            .map_err(|e| BackupError::Io(std::io::Error::other(e)))??;

        if self.config.remote_active() {
            let store = match store {
                Some(store) => store,
                None => remote::connect(&self.config.remote).await?,
            };
            report.pruned_remote =
                prune_remote(store.as_ref(), &host, self.config.retention.remote.keep_count).await?;
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunFlags;
    use crate::remote::DirectoryStore;
    use chrono::{Duration, NaiveDate};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    // Monday 2023-11-06
    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 11, 6)
            .unwrap()
            .and_hms_opt(2, 15, 0)
            .unwrap()
    }

    fn days_ago(days: i64) -> String {
        DateKey::new(now().date() - Duration::days(days)).to_string()
    }

    /// Config with pass-through compress/encrypt stages and the given items
    fn config(root: &Path, items: &str) -> Config {
        let mut config = Config::from_toml(&format!(
            r#"
            host = "db1"
            domain = "example.com"
            backup_root = '{backups}'

            [pipeline]
            compress = ["cat"]
            encrypt = ["cat"]

            [remote]
            kind = "directory"
            path = '{remote}'

            {items}
            "#,
            backups = root.join("backups").display(),
            remote = root.join("remote").display(),
            items = items,
        ))
        .unwrap();
        config.flags = RunFlags::default();
        config
    }

    fn single_file_item(source: &Path) -> String {
        format!("[[items]]\nname = \"appdb\"\nsource = '{}'\n", source.display())
    }

    fn run_dir(root: &Path) -> PathBuf {
        root.join("backups").join("231106mon")
    }

    fn listing(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_single_file_item_produces_one_artifact() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("app.db");
        fs::write(&source, b"0123456789").unwrap();

        let orchestrator = Orchestrator::new(
            config(temp_dir.path(), &single_file_item(&source)),
            ItemRegistry::with_builtins(),
        );
        let report = orchestrator.run(now()).await.unwrap();

        assert_eq!(report.items, 1);
        assert_eq!(report.artifacts, vec![run_dir(temp_dir.path()).join("appdb.tgz.enc")]);
        assert_eq!(listing(&run_dir(temp_dir.path())), vec!["appdb.tgz.enc"]);
        assert!(report.mirror.is_none());
    }

    #[tokio::test]
    async fn test_missing_source_is_not_a_failure() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("absent.db");

        let orchestrator = Orchestrator::new(
            config(temp_dir.path(), &single_file_item(&source)),
            ItemRegistry::with_builtins(),
        );
        let report = orchestrator.run(now()).await.unwrap();

        assert!(report.artifacts.is_empty());
        assert!(listing(&run_dir(temp_dir.path())).is_empty());
    }

    #[tokio::test]
    async fn test_no_items_does_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let orchestrator = Orchestrator::new(config(temp_dir.path(), ""), ItemRegistry::with_builtins());

        let report = orchestrator.run(now()).await.unwrap();
        assert_eq!(report.items, 0);
        assert!(report.run_dir.is_none());
        assert!(!temp_dir.path().join("backups").exists());
    }

    #[tokio::test]
    async fn test_rerun_requires_force() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("app.db");
        fs::write(&source, b"0123456789").unwrap();
        let items = single_file_item(&source);

        Orchestrator::new(config(temp_dir.path(), &items), ItemRegistry::with_builtins())
            .run(now())
            .await
            .unwrap();
        fs::write(run_dir(temp_dir.path()).join("stale.tgz.enc"), b"stale").unwrap();

        let err = Orchestrator::new(config(temp_dir.path(), &items), ItemRegistry::with_builtins())
            .run(now())
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::RunExists(_)));
        assert_eq!(
            listing(&run_dir(temp_dir.path())),
            vec!["appdb.tgz.enc", "stale.tgz.enc"]
        );

        let mut forced = config(temp_dir.path(), &items);
        forced.flags.force = true;
        Orchestrator::new(forced, ItemRegistry::with_builtins())
            .run(now())
            .await
            .unwrap();
        assert_eq!(listing(&run_dir(temp_dir.path())), vec!["appdb.tgz.enc"]);
    }

    #[tokio::test]
    async fn test_first_failure_aborts_run() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("app.db");
        fs::write(&source, b"0123456789").unwrap();
        let items = format!(
            "[[items]]\nname = \"dump\"\nclass = \"command\"\ncommand = [\"false\"]\n\n{}",
            single_file_item(&source)
        );
        let mut config = config(temp_dir.path(), &items);
        config.remote.enabled = true;

        let err = Orchestrator::new(config, ItemRegistry::with_builtins())
            .run(now())
            .await
            .unwrap_err();

        assert!(matches!(err, BackupError::Pipeline { .. }));
        assert!(listing(&run_dir(temp_dir.path())).is_empty());
        assert!(!temp_dir.path().join("remote").exists());
    }

    #[tokio::test]
    async fn test_keep_going_runs_remaining_items() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("app.db");
        fs::write(&source, b"0123456789").unwrap();
        let items = format!(
            "[[items]]\nname = \"dump\"\nclass = \"command\"\ncommand = [\"false\"]\n\n{}",
            single_file_item(&source)
        );
        let mut config = config(temp_dir.path(), &items);
        config.keep_going = true;

        let err = Orchestrator::new(config, ItemRegistry::with_builtins())
            .run(now())
            .await
            .unwrap_err();

        match err {
            BackupError::ItemsFailed(names) => assert_eq!(names, vec!["dump"]),
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(listing(&run_dir(temp_dir.path())), vec!["appdb.tgz.enc"]);
    }

    #[tokio::test]
    async fn test_mirror_and_retention() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("app.db");
        fs::write(&source, b"0123456789").unwrap();

        // Local history: 14 days back plus one stale Sunday
        let backups = temp_dir.path().join("backups");
        for days in 1..=14 {
            fs::create_dir_all(backups.join(days_ago(days))).unwrap();
        }
        fs::create_dir_all(backups.join("230827sun")).unwrap();

        // Remote history: four older dates for this host, one for another host
        let store = DirectoryStore::new(temp_dir.path().join("remote"));
        for name in [
            "backup.231102thu.db1.example.com",
            "backup.231103fri.db1.example.com",
            "backup.231104sat.db1.example.com",
            "backup.231105sun.db1.example.com",
            "backup.231001sun.web1.example.com",
        ] {
            store.ensure_container(name).await.unwrap();
            let artifact = temp_dir.path().join("old.tgz.enc");
            fs::write(&artifact, b"old").unwrap();
            store.upload(name, "appdb.tgz.enc", &artifact).await.unwrap();
        }

        let mut config = config(temp_dir.path(), &single_file_item(&source));
        config.remote.enabled = true;
        let report = Orchestrator::new(config, ItemRegistry::with_builtins())
            .run(now())
            .await
            .unwrap();

        let mirror = report.mirror.unwrap();
        assert_eq!(mirror.container.as_deref(), Some("backup.231106mon.db1.example.com"));
        assert_eq!(mirror.uploaded, vec!["appdb.tgz.enc"]);
        assert_eq!(mirror.bytes, 10);

        assert_eq!(report.pruned_local, vec![backups.join("230827sun")]);
        assert!(backups.join(days_ago(14)).exists());

        assert_eq!(
            report.pruned_remote,
            vec![
                "backup.231102thu.db1.example.com",
                "backup.231103fri.db1.example.com",
            ]
        );
        assert_eq!(
            store.list_containers().await.unwrap(),
            vec![
                "backup.231001sun.web1.example.com",
                "backup.231104sat.db1.example.com",
                "backup.231105sun.db1.example.com",
                "backup.231106mon.db1.example.com",
            ]
        );
    }

    #[tokio::test]
    async fn test_skip_flags() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("app.db");
        fs::write(&source, b"0123456789").unwrap();
        let backups = temp_dir.path().join("backups");
        for days in 1..=14 {
            fs::create_dir_all(backups.join(days_ago(days))).unwrap();
        }
        fs::create_dir_all(backups.join("230827sun")).unwrap();

        let mut config = config(temp_dir.path(), &single_file_item(&source));
        config.remote.enabled = true;
        config.flags.skip_remote = true;
        config.flags.skip_cleanup = true;
        let report = Orchestrator::new(config, ItemRegistry::with_builtins())
            .run(now())
            .await
            .unwrap();

        assert!(report.mirror.is_none());
        assert!(report.pruned_local.is_empty());
        assert!(backups.join("230827sun").exists());
        assert!(!temp_dir.path().join("remote").exists());
    }
}
