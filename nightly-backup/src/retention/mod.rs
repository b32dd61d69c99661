//! Retention engines for the local backup root and the remote store.
//!
//! The two policies are independent and may disagree: the local root keeps
//! weeks of history while the remote store keeps only the last few dates.

pub mod local;
pub mod remote;

pub use local::{prune_local, LocalPlan, LocalPolicy};
pub use remote::{prune_remote, select_expired};
