//! Craft backup engine
//!
//! Live snapshots, restores and backup retention for Bedrock server
//! containers driven through their console.

pub mod archive;
pub mod batch;
pub mod config;
pub mod console;
pub mod restore;
pub mod retention;
pub mod snapshot;
pub mod utils;
pub mod world;

// Re-export commonly used types
pub use archive::{Archive, Entry};
pub use config::Config;
pub use console::{ConsoleHandle, SaveCoordinator};
pub use restore::RestoreEngine;
pub use retention::{BackupFile, RetentionManager};
pub use snapshot::SnapshotCollector;
pub use utils::errors::EngineError;
pub type Result<T> = std::result::Result<T, EngineError>;
