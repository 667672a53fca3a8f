//! On-disk backup history: naming, listing and pruning.
//!
//! Backups live at `<backup-dir>/<server>/<server>_<DD-MM-YYYY_HH-MM>.zip`.
//! The timestamp in the name is the only ordering key. Files whose name does
//! not match the layout are ignored everywhere.

pub mod confirm;

use crate::utils::{EngineError, Result};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

pub use confirm::{Confirmer, PromptConfirmation, SkipConfirmation};

/// chrono layout of the timestamp embedded in backup file names.
pub const TIMESTAMP_LAYOUT: &str = "%d-%m-%Y_%H-%M";
pub const BACKUP_EXTENSION: &str = "zip";

/// A timestamp-named backup archive of one server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupFile {
    pub server: String,
    pub name: String,
    pub path: PathBuf,
    pub timestamp: NaiveDateTime,
}

/// File name of the backup of `server` taken at `timestamp`.
pub fn backup_file_name(server: &str, timestamp: &NaiveDateTime) -> String {
    format!(
        "{}_{}.{}",
        server,
        timestamp.format(TIMESTAMP_LAYOUT),
        BACKUP_EXTENSION
    )
}

/// Timestamp embedded in `file_name` when it is a valid backup name for
/// `server`.
///
/// The timestamp must format back to exactly the same text, so unpadded or
/// otherwise loose spellings are rejected.
pub fn parse_timestamp(server: &str, file_name: &str) -> Option<NaiveDateTime> {
    let stamp = file_name
        .strip_prefix(server)?
        .strip_prefix('_')?
        .strip_suffix(BACKUP_EXTENSION)?
        .strip_suffix('.')?;
    let timestamp = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_LAYOUT).ok()?;
    if timestamp.format(TIMESTAMP_LAYOUT).to_string() != stamp {
        return None;
    }
    Some(timestamp)
}

/// Lists and prunes backups below one backup directory.
#[derive(Debug, Clone)]
pub struct RetentionManager {
    backup_dir: PathBuf,
}

impl RetentionManager {
    pub fn new(backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            backup_dir: backup_dir.into(),
        }
    }

    /// Directory holding the backups of `server`.
    pub fn server_dir(&self, server: &str) -> PathBuf {
        self.backup_dir.join(server)
    }

    /// Path the backup of `server` taken at `timestamp` is written to.
    pub fn path_for(&self, server: &str, timestamp: &NaiveDateTime) -> PathBuf {
        self.server_dir(server).join(backup_file_name(server, timestamp))
    }

    /// Servers that have a backup directory.
    pub fn servers(&self) -> Result<Vec<String>> {
        let entries = match std::fs::read_dir(&self.backup_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut servers: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|e| e.file_name().into_string().ok())
            .collect();
        servers.sort();
        Ok(servers)
    }

    /// Valid backups of `server`, oldest first.
    pub fn list(&self, server: &str) -> Result<Vec<BackupFile>> {
        let dir = self.server_dir(server);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut backups: Vec<BackupFile> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|e| {
                let name = e.file_name().into_string().ok()?;
                let timestamp = parse_timestamp(server, &name)?;
                Some(BackupFile {
                    server: server.to_string(),
                    path: e.path(),
                    name,
                    timestamp,
                })
            })
            .collect();

        backups.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.name.cmp(&b.name)));
        Ok(backups)
    }

    /// Newest backup of `server`.
    pub fn latest(&self, server: &str) -> Result<BackupFile> {
        self.list(server)?
            .pop()
            .ok_or_else(|| EngineError::NotFound(format!("no backups for server {}", server)))
    }

    /// Delete all but the newest `keep` backups of `server`.
    ///
    /// `confirmer` sees the candidates first; declining deletes nothing.
    /// A file that cannot be removed is logged and skipped. Returns the names
    /// actually removed.
    pub fn trim(&self, server: &str, keep: usize, confirmer: &dyn Confirmer) -> Result<Vec<String>> {
        let backups = self.list(server)?;
        if keep >= backups.len() {
            return Ok(Vec::new());
        }

        let candidates = &backups[..backups.len() - keep];
        if !confirmer.confirm(server, candidates)? {
            info!(server, candidates = candidates.len(), "Trim declined");
            return Ok(Vec::new());
        }

        let mut removed = Vec::with_capacity(candidates.len());
        for backup in candidates {
            match std::fs::remove_file(&backup.path) {
                Ok(()) => {
                    info!(server, file = %backup.name, "Removed backup");
                    removed.push(backup.name.clone());
                }
                Err(e) => {
                    warn!("Failed to remove backup {}: {}", backup.path.display(), e);
                }
            }
        }
        Ok(removed)
    }
}
