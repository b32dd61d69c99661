//! Nightly backup runner
//!
//! Archives configured items into a dated local directory, mirrors the
//! result to a remote store and applies retention on both sides.

pub mod config;
pub mod date_key;
pub mod executor;
pub mod fs;
pub mod items;
pub mod pipeline;
pub mod remote;
pub mod retention;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use executor::{Orchestrator, RunReport};
pub use utils::errors::BackupError;
pub use utils::Result;
