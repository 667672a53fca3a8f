//! Snapshot collector - turns a live server into one backup file.
//!
//! The collector:
//! - brings the server to a copy point over its console
//! - copies out exactly the files the server reported, plus configured
//!   loose files
//! - writes the merged archive as a timestamp-named zip
//! - resumes saving on the server

use crate::archive::Archive;
use crate::config::{Config, ProtocolConfig, ServerLayoutConfig};
use crate::console::{ConsoleHandle, DirtyFile, SaveCoordinator};
use crate::retention::{backup_file_name, BackupFile, RetentionManager};
use crate::utils::{EngineError, Result};
use crate::world::{self, WORLDS_DIR};
use chrono::{Local, NaiveDateTime};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Produces backups for any server reachable through a [`ConsoleHandle`].
#[derive(Debug, Clone)]
pub struct SnapshotCollector {
    retention: RetentionManager,
    protocol: ProtocolConfig,
    layout: ServerLayoutConfig,
}

impl SnapshotCollector {
    pub fn new(config: &Config) -> Self {
        Self {
            retention: RetentionManager::new(&config.backup.backup_dir),
            protocol: config.protocol.clone(),
            layout: config.server.clone(),
        }
    }

    /// Take a backup of the server behind `handle`, stamped with the current
    /// local time.
    pub async fn snapshot<H>(&self, handle: &H, cancel: &CancellationToken) -> Result<BackupFile>
    where
        H: ConsoleHandle + ?Sized,
    {
        let now = Local::now().naive_local();
        self.snapshot_at(handle, now, cancel).await
    }

    /// Take a backup stamped with `timestamp`.
    ///
    /// A backup of the same server within the same minute replaces the
    /// earlier file. Cancellation is honoured until copying starts.
    pub async fn snapshot_at<H>(
        &self,
        handle: &H,
        timestamp: NaiveDateTime,
        cancel: &CancellationToken,
    ) -> Result<BackupFile>
    where
        H: ConsoleHandle + ?Sized,
    {
        let server = handle.name().to_string();
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let start_time = std::time::Instant::now();
        info!(server = %server, "Starting snapshot");

        let mut coordinator = SaveCoordinator::attach(handle, self.protocol.clone()).await?;
        let backup = coordinator
            .with_copy_point(cancel, |files| async move {
                if cancel.is_cancelled() {
                    return Err(EngineError::Cancelled);
                }
                let archive = self.collect(handle, &files).await?;
                self.write(&server, timestamp, archive).await
            })
            .await?;

        info!(
            server = %backup.server,
            file = %backup.name,
            "Snapshot completed in {} ms",
            start_time.elapsed().as_millis()
        );
        Ok(backup)
    }

    /// Copy the reported files and the configured loose files out of the
    /// container into one archive in the server layout.
    async fn collect<H>(&self, handle: &H, files: &[DirtyFile]) -> Result<Archive>
    where
        H: ConsoleHandle + ?Sized,
    {
        let mut archive = Archive::new();

        for file in files {
            debug!(server = handle.name(), world = file.world(), path = %file.path, size = file.size, "Copying out");
            let source = format!("{}/{}", self.layout.worlds_dir(), file.path);
            let copied = copy_out(handle, &source).await?;
            archive.merge(copied.with_prefix(&join_prefix(WORLDS_DIR, file.parent())));

            // Bytes past the reported size are not part of the consistent state
            let name = format!("{}/{}", WORLDS_DIR, file.path);
            if !archive.truncate_body(&name, file.size as usize) {
                return Err(EngineError::Protocol(format!(
                    "copy of {} did not contain the file itself",
                    file.path
                )));
            }
        }

        for loose in &self.layout.config_files {
            let source = self.layout.container_path(loose);
            let copied = copy_out(handle, &source).await?;
            let parent = loose.rsplit_once('/').map(|(dir, _)| dir).unwrap_or_default();
            archive.merge(copied.with_prefix(&join_prefix("", parent)));
        }

        debug!(
            server = handle.name(),
            entries = archive.len(),
            bytes = archive.total_bytes(),
            "Collected snapshot archive"
        );
        Ok(archive)
    }

    async fn write(&self, server: &str, timestamp: NaiveDateTime, archive: Archive) -> Result<BackupFile> {
        let path = self.retention.path_for(server, &timestamp);
        let target = path.clone();
        tokio::task::spawn_blocking(move || world::write_zip(&archive, &target))
            .await
            .map_err(|e| EngineError::Io(std::io::Error::other(e)))??;

        Ok(BackupFile {
            server: server.to_string(),
            name: backup_file_name(server, &timestamp),
            path,
            timestamp,
        })
    }
}

async fn copy_out<H>(handle: &H, source: &str) -> Result<Archive>
where
    H: ConsoleHandle + ?Sized,
{
    let tar = handle.copy_out(source).await?;
    Archive::from_tar(tar.as_slice())
}

fn join_prefix(base: &str, dir: &str) -> String {
    match (base.is_empty(), dir.is_empty()) {
        (true, true) => String::new(),
        (true, false) => format!("{}/", dir),
        (false, true) => format!("{}/", base),
        (false, false) => format!("{}/{}/", base, dir),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::protocol::{HOLD_OK, QUERY_READY_PREFIX, RESUME_OK};
    use crate::console::scripted::ScriptedConsole;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn config(backup_dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.backup.backup_dir = backup_dir.to_path_buf();
        config.protocol.query_interval_ms = 1;
        config.protocol.response_timeout_ms = 500;
        config
    }

    fn minute() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(9, 7, 0)
            .unwrap()
    }

    fn live_server(level_dat: &[u8]) -> ScriptedConsole {
        ScriptedConsole::new("mc")
            .exchange("save hold", HOLD_OK)
            .exchange("save query", QUERY_READY_PREFIX)
            .line("Bedrock level/db/CURRENT:16, Bedrock level/level.dat:4")
            .exchange("save resume", RESUME_OK)
            .file("/bedrock/worlds/Bedrock level/db/CURRENT", b"MANIFEST-000001\n")
            .file("/bedrock/worlds/Bedrock level/level.dat", level_dat)
            .file("/bedrock/server.properties", b"level-name=Bedrock level\n")
    }

    #[tokio::test]
    async fn test_snapshot_writes_server_layout_zip() {
        let temp_dir = TempDir::new().unwrap();
        let collector = SnapshotCollector::new(&config(temp_dir.path()));
        let console = live_server(b"LEVELDAT-still-being-written");
        let cancel = CancellationToken::new();

        let backup = collector.snapshot_at(&console, minute(), &cancel).await.unwrap();

        assert_eq!(backup.name, "mc_05-03-2024_09-07.zip");
        assert_eq!(backup.path, temp_dir.path().join("mc").join("mc_05-03-2024_09-07.zip"));

        let archive = world::read_zip(&backup.path).unwrap();
        assert_eq!(
            archive.names().collect::<Vec<_>>(),
            vec![
                "worlds/Bedrock level/db/CURRENT",
                "worlds/Bedrock level/level.dat",
                "server.properties",
            ]
        );
        // Truncated to the size reported at the copy point
        assert_eq!(archive.get("worlds/Bedrock level/level.dat").unwrap().body.as_ref(), b"LEVE");
        assert_eq!(console.written(), vec!["save hold", "save query", "save resume"]);
    }

    #[tokio::test]
    async fn test_same_minute_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let collector = SnapshotCollector::new(&config(temp_dir.path()));
        let cancel = CancellationToken::new();

        let first = collector
            .snapshot_at(&live_server(b"AAAA"), minute(), &cancel)
            .await
            .unwrap();
        let second = collector
            .snapshot_at(&live_server(b"BBBB"), minute(), &cancel)
            .await
            .unwrap();

        assert_eq!(first.name, second.name);
        let retention = RetentionManager::new(temp_dir.path());
        let backups = retention.list("mc").unwrap();
        assert_eq!(backups.len(), 1);

        let archive = world::read_zip(&backups[0].path).unwrap();
        assert_eq!(archive.get("worlds/Bedrock level/level.dat").unwrap().body.as_ref(), b"BBBB");
    }

    #[tokio::test]
    async fn test_failed_copy_leaves_no_file_and_resumes() {
        let temp_dir = TempDir::new().unwrap();
        let collector = SnapshotCollector::new(&config(temp_dir.path()));
        let console = ScriptedConsole::new("mc")
            .exchange("save hold", HOLD_OK)
            .exchange("save query", QUERY_READY_PREFIX)
            .line("Bedrock level/db/000009.ldb:100")
            .exchange("save resume", RESUME_OK);
        let cancel = CancellationToken::new();

        let result = collector.snapshot_at(&console, minute(), &cancel).await;

        assert!(matches!(result, Err(EngineError::NotFound(_))));
        assert_eq!(console.count_of("save resume"), 1);
        assert!(RetentionManager::new(temp_dir.path()).list("mc").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_copies_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = config(temp_dir.path());
        config.protocol.query_retries = 2;
        let collector = SnapshotCollector::new(&config);
        let console = ScriptedConsole::new("mc")
            .exchange("save hold", HOLD_OK)
            .exchange("save query", "A previous save has not been completed.")
            .exchange("save query", "A previous save has not been completed.")
            .exchange("save resume", RESUME_OK);
        let cancel = CancellationToken::new();

        let result = collector.snapshot_at(&console, minute(), &cancel).await;

        assert!(matches!(result, Err(EngineError::Timeout(_))));
        assert_eq!(console.count_of("save query"), 2);
        assert_eq!(console.count_of("save resume"), 1);
        assert!(!temp_dir.path().join("mc").exists());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let temp_dir = TempDir::new().unwrap();
        let collector = SnapshotCollector::new(&config(temp_dir.path()));
        let console = live_server(b"AAAA");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = collector.snapshot_at(&console, minute(), &cancel).await;
        assert!(matches!(result, Err(EngineError::Cancelled)));
        assert!(console.written().is_empty());
    }

    #[test]
    fn test_join_prefix() {
        assert_eq!(join_prefix("worlds", "Bedrock level/db"), "worlds/Bedrock level/db/");
        assert_eq!(join_prefix("worlds", ""), "worlds/");
        assert_eq!(join_prefix("", "config"), "config/");
        assert_eq!(join_prefix("", ""), "");
    }
}
