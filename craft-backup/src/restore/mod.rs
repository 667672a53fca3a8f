//! Restore engine - replays backups and world packages into a container.
//!
//! World content is sent as one tar rooted at the server directory; every
//! loose configuration file is sent on its own. The first failed copy-in
//! aborts the restore, and the container is expected to be discarded.

use crate::archive::{Archive, Entry};
use crate::config::{Config, ServerLayoutConfig};
use crate::console::ConsoleHandle;
use crate::retention::RetentionManager;
use crate::utils::{EngineError, Result};
use crate::world::{self, WORLDS_DIR};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// What a restore copied into the container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    pub world_entries: usize,
    pub loose_files: Vec<String>,
    pub bytes: u64,
}

#[derive(Debug, Clone)]
pub struct RestoreEngine {
    retention: RetentionManager,
    layout: ServerLayoutConfig,
}

impl RestoreEngine {
    pub fn new(config: &Config) -> Self {
        Self {
            retention: RetentionManager::new(&config.backup.backup_dir),
            layout: config.server.clone(),
        }
    }

    /// Restore the newest backup of the server behind `handle`.
    pub async fn restore_latest<H>(&self, handle: &H) -> Result<RestoreSummary>
    where
        H: ConsoleHandle + ?Sized,
    {
        let latest = self.retention.latest(handle.name())?;
        info!(server = handle.name(), file = %latest.name, "Restoring latest backup");
        self.restore_backup(handle, &latest.path).await
    }

    /// Restore the backup file at `backup_path`.
    pub async fn restore_backup<H>(&self, handle: &H, backup_path: &Path) -> Result<RestoreSummary>
    where
        H: ConsoleHandle + ?Sized,
    {
        let archive = read_zip_blocking(backup_path.to_path_buf()).await?;
        let prefix = format!("{}/", WORLDS_DIR);
        let (worlds, loose) = archive.partition(|entry| entry.name.starts_with(prefix.as_str()));

        let mut summary = RestoreSummary::default();
        if !worlds.is_empty() {
            summary.world_entries = worlds.len();
            summary.bytes += worlds.total_bytes();
            self.copy_in(handle, &worlds).await?;
        }

        for entry in loose {
            if entry.is_dir() {
                continue;
            }
            let name = entry.name.clone();
            summary.bytes += entry.body.len() as u64;
            self.copy_in_loose(handle, entry).await?;
            summary.loose_files.push(name);
        }

        info!(
            server = handle.name(),
            world_entries = summary.world_entries,
            loose_files = summary.loose_files.len(),
            "Restored {}",
            backup_path.display()
        );
        Ok(summary)
    }

    /// Install the world package at `package_path` as world `world_name`.
    ///
    /// The package is validated before anything is copied.
    pub async fn import_world<H>(&self, handle: &H, package_path: &Path, world_name: &str) -> Result<RestoreSummary>
    where
        H: ConsoleHandle + ?Sized,
    {
        if world_name.is_empty() || world_name.contains('/') {
            return Err(EngineError::InvalidWorld(format!("invalid world name {:?}", world_name)));
        }

        let package = read_zip_blocking(package_path.to_path_buf()).await?;
        let worlds = world::to_server_layout(package, world_name)?;

        let summary = RestoreSummary {
            world_entries: worlds.len(),
            loose_files: Vec::new(),
            bytes: worlds.total_bytes(),
        };
        self.copy_in(handle, &worlds).await?;

        info!(
            server = handle.name(),
            world = world_name,
            entries = summary.world_entries,
            "Imported world from {}",
            package_path.display()
        );
        Ok(summary)
    }

    async fn copy_in<H>(&self, handle: &H, archive: &Archive) -> Result<()>
    where
        H: ConsoleHandle + ?Sized,
    {
        let tar = archive.to_tar()?;
        debug!(server = handle.name(), entries = archive.len(), bytes = tar.len(), "Copying in");
        handle.copy_in(&self.layout.server_dir, tar).await
    }

    /// Configuration files go to the server directory one by one, keeping
    /// any subdirectory in their name.
    async fn copy_in_loose<H>(&self, handle: &H, entry: Entry) -> Result<()>
    where
        H: ConsoleHandle + ?Sized,
    {
        let (target, base) = match entry.name.rsplit_once('/') {
            Some((dir, base)) => (self.layout.container_path(dir), base.to_string()),
            None => (self.layout.server_dir.clone(), entry.name.clone()),
        };
        let single: Archive = [Entry { name: base, ..entry }].into_iter().collect();
        debug!(server = handle.name(), target = %target, "Copying in loose file");
        handle.copy_in(&target, single.to_tar()?).await
    }
}

async fn read_zip_blocking(path: PathBuf) -> Result<Archive> {
    tokio::task::spawn_blocking(move || world::read_zip(&path))
        .await
        .map_err(|e| EngineError::Io(std::io::Error::other(e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::scripted::ScriptedConsole;
    use crate::retention::backup_file_name;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn config(backup_dir: &Path) -> Config {
        let mut config = Config::default();
        config.backup.backup_dir = backup_dir.to_path_buf();
        config
    }

    fn world_package() -> Archive {
        [
            Entry::dir("db"),
            Entry::file("db/CURRENT", &b"MANIFEST-000001\n"[..]),
            Entry::file("level.dat", vec![9u8; 16]),
            Entry::file("levelname.txt", &b"Bedrock level"[..]),
        ]
        .into_iter()
        .collect()
    }

    fn backup_archive() -> Archive {
        let mut archive = world::to_server_layout(world_package(), "Bedrock level").unwrap();
        archive.insert(Entry::file("server.properties", &b"level-name=Bedrock level\n"[..]));
        archive.insert(Entry::file("config/default/permissions.json", &b"[]"[..]));
        archive
    }

    fn write_backup(dir: &Path, server: &str, day: u32) -> PathBuf {
        let timestamp = NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let path = dir.join(server).join(backup_file_name(server, &timestamp));
        world::write_zip(&backup_archive(), &path).unwrap();
        path
    }

    #[tokio::test]
    async fn test_restore_backup_splits_world_and_loose_files() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_backup(temp_dir.path(), "mc", 1);
        let engine = RestoreEngine::new(&config(temp_dir.path()));
        let console = ScriptedConsole::new("mc");

        let summary = engine.restore_backup(&console, &path).await.unwrap();

        assert_eq!(summary.loose_files, vec!["server.properties", "config/default/permissions.json"]);
        let copied = console.copied_in();
        assert_eq!(copied.len(), 3);

        let (target, worlds) = &copied[0];
        assert_eq!(target, "/bedrock");
        assert_eq!(worlds.len(), summary.world_entries);
        assert_eq!(
            worlds.get("worlds/Bedrock level/level.dat").unwrap().body,
            backup_archive().get("worlds/Bedrock level/level.dat").unwrap().body
        );

        assert_eq!(copied[1].0, "/bedrock");
        assert_eq!(copied[1].1.names().collect::<Vec<_>>(), vec!["server.properties"]);
        assert_eq!(copied[2].0, "/bedrock/config/default");
        assert_eq!(copied[2].1.names().collect::<Vec<_>>(), vec!["permissions.json"]);
    }

    #[tokio::test]
    async fn test_restore_latest_picks_newest() {
        let temp_dir = TempDir::new().unwrap();
        write_backup(temp_dir.path(), "mc", 1);
        write_backup(temp_dir.path(), "mc", 20);
        let engine = RestoreEngine::new(&config(temp_dir.path()));
        let console = ScriptedConsole::new("mc");

        engine.restore_latest(&console).await.unwrap();
        assert_eq!(console.copied_in().len(), 3);

        let empty = ScriptedConsole::new("fresh");
        assert!(matches!(
            engine.restore_latest(&empty).await,
            Err(EngineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_copy_in_failure_aborts() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_backup(temp_dir.path(), "mc", 1);
        let engine = RestoreEngine::new(&config(temp_dir.path()));
        let console = ScriptedConsole::new("mc").fail_copy_in("/bedrock");

        let result = engine.restore_backup(&console, &path).await;
        assert!(matches!(result, Err(EngineError::Container(_))));
        assert!(console.copied_in().is_empty());
    }

    #[tokio::test]
    async fn test_import_world() {
        let temp_dir = TempDir::new().unwrap();
        let package_path = temp_dir.path().join("survival.mcworld");
        world::write_zip(&world_package(), &package_path).unwrap();
        let engine = RestoreEngine::new(&config(temp_dir.path()));
        let console = ScriptedConsole::new("mc");

        let summary = engine.import_world(&console, &package_path, "Survival").await.unwrap();

        let copied = console.copied_in();
        assert_eq!(copied.len(), 1);
        assert_eq!(copied[0].0, "/bedrock");
        assert_eq!(summary.world_entries, 4);
        assert!(copied[0].1.contains("worlds/Survival/db/CURRENT"));
        assert!(copied[0].1.contains("worlds/Survival/level.dat"));
    }

    #[tokio::test]
    async fn test_import_rejects_invalid_package() {
        let temp_dir = TempDir::new().unwrap();
        let package_path = temp_dir.path().join("broken.mcworld");
        let broken: Archive = [Entry::file("level.dat", &b""[..])].into_iter().collect();
        world::write_zip(&broken, &package_path).unwrap();
        let engine = RestoreEngine::new(&config(temp_dir.path()));
        let console = ScriptedConsole::new("mc");

        let result = engine.import_world(&console, &package_path, "Survival").await;
        assert!(matches!(result, Err(EngineError::InvalidWorld(_))));
        assert!(console.copied_in().is_empty());

        let result = engine.import_world(&console, &package_path, "a/b").await;
        assert!(matches!(result, Err(EngineError::InvalidWorld(_))));
    }
}
