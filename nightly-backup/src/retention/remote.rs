//! Count-based retention for remote containers.

use crate::date_key::DateKey;
use crate::remote::{parse_container, RemoteStore};
use crate::utils::Result;
use std::collections::BTreeSet;
use tracing::info;

/// Containers of `host` dated before the `keep_count` most recent dates,
/// oldest first. Other hosts' containers and unrelated buckets are ignored.
pub fn select_expired<S: AsRef<str>>(containers: &[S], host: &str, keep_count: usize) -> Vec<String> {
    let mut dated: Vec<(DateKey, &str)> = containers
        .iter()
        .filter_map(|c| parse_container(c.as_ref(), host).map(|key| (key, c.as_ref())))
        .collect();

    let dates: BTreeSet<DateKey> = dated.iter().map(|(key, _)| *key).collect();
    if dates.len() <= keep_count {
        return Vec::new();
    }
    let expired_count = dates.len() - keep_count;
    let expired_dates: BTreeSet<DateKey> = dates.into_iter().take(expired_count).collect();

    dated.sort();
    dated
        .into_iter()
        .filter(|(key, _)| expired_dates.contains(key))
        .map(|(_, name)| name.to_string())
        .collect()
}

/// Empty and delete every expired container of `host`, returning their names.
pub async fn prune_remote(store: &dyn RemoteStore, host: &str, keep_count: usize) -> Result<Vec<String>> {
    let containers = store.list_containers().await?;
    let expired = select_expired(&containers, host, keep_count);

    for container in &expired {
        let objects = store.list_objects(container).await?;
        for object in &objects {
            store.delete_object(container, object).await?;
        }
        store.delete_container(container).await?;
        info!(container = %container, "Removed remote backup ({} object(s))", objects.len());
    }

    Ok(expired)
}
