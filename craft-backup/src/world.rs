//! World packages (`.mcworld`) and the server backup layout.
//!
//! A server backup keeps the world under `worlds/<world-name>/` next to loose
//! configuration files. A world package is the same world content rooted
//! directly at `level.dat`, `levelname.txt` and `db/`.

use crate::archive::Archive;
use crate::utils::{EngineError, Result};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::info;

/// Directory holding every world in the server layout.
pub const WORLDS_DIR: &str = "worlds";

/// Files a world package must contain at its root.
pub const REQUIRED_WORLD_FILES: [&str; 3] = ["db/CURRENT", "level.dat", "levelname.txt"];

/// Archive prefix of `world_name` in the server layout.
pub fn world_prefix(world_name: &str) -> String {
    format!("{}/{}/", WORLDS_DIR, world_name)
}

/// Check that `package` is rooted at world content.
pub fn validate(package: &Archive) -> Result<()> {
    let missing: Vec<&str> = REQUIRED_WORLD_FILES
        .iter()
        .copied()
        .filter(|name| !package.contains(name))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(EngineError::InvalidWorld(format!("missing {}", missing.join(", "))))
    }
}

/// Name of the first world found in a server backup.
pub fn world_name(backup: &Archive) -> Result<String> {
    let prefix = format!("{}/", WORLDS_DIR);
    backup
        .names()
        .filter_map(|name| name.strip_prefix(prefix.as_str()))
        .filter_map(|rest| rest.split_once('/'))
        .map(|(world, _)| world)
        .find(|world| !world.is_empty())
        .map(str::to_string)
        .ok_or_else(|| EngineError::NotFound("backup contains no world".into()))
}

/// Server-layout view of a validated world package.
pub fn to_server_layout(package: Archive, world_name: &str) -> Result<Archive> {
    validate(&package)?;
    Ok(package.with_prefix(&world_prefix(world_name)))
}

/// World package view of one world in a server backup.
pub fn from_server_layout(backup: Archive, world_name: &str) -> Result<Archive> {
    let package = backup.strip_prefix(&world_prefix(world_name));
    validate(&package)?;
    Ok(package)
}

/// Read a zip file from disk into an archive.
pub fn read_zip(path: &Path) -> Result<Archive> {
    let file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => EngineError::NotFound(path.display().to_string()),
        _ => EngineError::Io(e),
    })?;
    Archive::from_zip(BufReader::new(file))
}

/// Write `archive` as a zip file, removing the file again on failure.
pub fn write_zip(archive: &Archive, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let result = File::create(path)
        .map_err(EngineError::from)
        .and_then(|mut file| {
            archive.write_zip(&mut file)?;
            file.sync_all()?;
            Ok(())
        });
    if result.is_err() {
        let _ = std::fs::remove_file(path);
    }
    result
}

/// Extract the world of a backup file into a standalone world package.
///
/// Returns the exported world's name.
pub async fn export_world(backup_path: &Path, output: &Path) -> Result<String> {
    let backup_path = backup_path.to_path_buf();
    let output = output.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let backup = read_zip(&backup_path)?;
        let name = world_name(&backup)?;
        let package = from_server_layout(backup, &name)?;
        write_zip(&package, &output)?;
        info!(
            world = %name,
            files = package.len(),
            "Exported world to {}",
            output.display()
        );
        Ok(name)
    })
    .await
    .map_err(|e| EngineError::Io(std::io::Error::other(e)))?
}
