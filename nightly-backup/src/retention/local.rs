//! Tiered retention for the local backup root.
//!
//! An entry is kept when it is recent, when it is a Monday inside the weekly
//! window, or when it is the second Monday of its month. Nothing is deleted
//! until enough recent entries exist.

use crate::config::LocalRetentionConfig;
use crate::date_key::DateKey;
use crate::fs::walker::{walk_directory, WalkOptions};
use crate::utils::Result;
use chrono::{Datelike, NaiveDateTime, NaiveTime, Weekday};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Days of month on which the second Monday falls
const SECOND_MONDAY: RangeInclusive<u32> = 8..=14;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalPolicy {
    pub recent_days: i64,
    pub min_recent: usize,
    pub weekly_days: i64,
}

impl Default for LocalPolicy {
    fn default() -> Self {
        Self::from(&LocalRetentionConfig::default())
    }
}

impl From<&LocalRetentionConfig> for LocalPolicy {
    fn from(config: &LocalRetentionConfig) -> Self {
        Self {
            recent_days: config.recent_days,
            min_recent: config.min_recent,
            weekly_days: config.weekly_days,
        }
    }
}

/// Outcome of evaluating the policy over a set of entry names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalPlan {
    /// Dated entries outside every keep rule
    pub expired: Vec<String>,
    /// Entries kept by the recent window
    pub recent: usize,
    /// True when `recent < min_recent` and deletions are held back
    pub held_back: bool,
}

impl LocalPlan {
    /// Entries to delete this run
    pub fn deletions(&self) -> &[String] {
        if self.held_back {
            &[]
        } else {
            &self.expired
        }
    }
}

impl LocalPolicy {
    fn keeps(&self, key: &DateKey, age_days: i64) -> bool {
        let date = key.date();
        let monday = date.weekday() == Weekday::Mon;
        age_days <= self.recent_days
            || (monday && age_days <= self.weekly_days)
            || (monday && SECOND_MONDAY.contains(&date.day()))
    }

    /// Decide which entries fall out of the policy. Names without a trailing
    /// date key are ignored.
    pub fn evaluate<S: AsRef<str>>(&self, names: &[S], now: NaiveDateTime) -> LocalPlan {
        let mut plan = LocalPlan::default();

        for name in names {
            let name = name.as_ref();
            let Some(key) = DateKey::parse_suffix(name) else {
                continue;
            };
            let midnight = key.date().and_time(NaiveTime::MIN);
            let age_days = (now - midnight).num_days();

            if age_days <= self.recent_days {
                plan.recent += 1;
            }
            if !self.keeps(&key, age_days) {
                plan.expired.push(name.to_string());
            }
        }

        plan.held_back = plan.recent < self.min_recent;
        plan
    }
}

/// Apply the policy to the entries directly under `root`, returning what was removed.
pub fn prune_local(root: &Path, now: NaiveDateTime, policy: &LocalPolicy) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }

    let options = WalkOptions { include_dirs: true };
    let entries = walk_directory(root, options)?;
    let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    let plan = policy.evaluate(&names, now);

    if plan.held_back {
        if !plan.expired.is_empty() {
            warn!(
                "Only {} recent backup(s) (need {}), keeping {} expired entr(ies) for now",
                plan.recent,
                policy.min_recent,
                plan.expired.len()
            );
        }
        return Ok(Vec::new());
    }

    let mut removed = Vec::with_capacity(plan.expired.len());
    for entry in entries.iter().filter(|e| plan.expired.contains(&e.name)) {
        if entry.is_dir {
            std::fs::remove_dir_all(&entry.path)?;
        } else {
            std::fs::remove_file(&entry.path)?;
        }
        info!("Removed old backup {}", entry.path.display());
        removed.push(entry.path.clone());
    }

    Ok(removed)
}
