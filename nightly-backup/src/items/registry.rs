//! Static registry mapping item class names to factories.

use super::{ArchiveItem, BackupItem, CommandItem};
use crate::config::{Config, ItemRecord};
use crate::utils::{BackupError, Result};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Class used when a record has no `class` field
pub const DEFAULT_CLASS: &str = "archive";

/// Builds one item from its record
pub type ItemFactory = fn(&ItemRecord, &Config) -> Result<Box<dyn BackupItem>>;

pub struct ItemRegistry {
    factories: HashMap<String, ItemFactory>,
}

impl ItemRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with the `archive` and `command` classes
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(DEFAULT_CLASS, ArchiveItem::from_record);
        registry.register("command", CommandItem::from_record);
        registry
    }

    /// Register (or replace) a class
    pub fn register(&mut self, class: &str, factory: ItemFactory) {
        debug!(class, "Registered item class");
        self.factories.insert(class.to_string(), factory);
    }

    pub fn contains(&self, class: &str) -> bool {
        self.factories.contains_key(class)
    }

    /// Instantiate every configured item, in order.
    ///
    /// Unknown classes, duplicate names and two items writing the same
    /// `<name><extension>` artifact are configuration errors.
    pub fn instantiate(&self, config: &Config) -> Result<Vec<Box<dyn BackupItem>>> {
        let mut names = HashSet::new();
        let mut artifacts: HashMap<String, &str> = HashMap::new();
        let mut items = Vec::with_capacity(config.items.len());

        for record in &config.items {
            if !names.insert(record.name.as_str()) {
                return Err(BackupError::Config(format!(
                    "duplicate item name {:?}",
                    record.name
                )));
            }

            let artifact = artifact_name(record, config);
            if let Some(other) = artifacts.insert(artifact.clone(), &record.name) {
                return Err(BackupError::Config(format!(
                    "items {} and {} both write {}",
                    other, record.name, artifact
                )));
            }

            let class = record.class.as_deref().unwrap_or(DEFAULT_CLASS);
            let factory = self.factories.get(class).ok_or_else(|| {
                BackupError::Config(format!(
                    "item {}: unknown class {:?}",
                    record.name, class
                ))
            })?;
            items.push(factory(record, config)?);
        }

        Ok(items)
    }
}

/// Artifact file name a record produces with the built-in naming scheme
fn artifact_name(record: &ItemRecord, config: &Config) -> String {
    let extension = record
        .params
        .get("extension")
        .and_then(|v| v.as_str())
        .unwrap_or(&config.pipeline.extension);
    format!("{}{}", record.name, extension)
}

impl Default for ItemRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
