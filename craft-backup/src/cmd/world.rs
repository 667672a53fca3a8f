use anyhow::{Context, Result};
use craft_backup::console::docker::DockerConsole;
use craft_backup::{world, Config, RestoreEngine};
use std::path::Path;

pub async fn import(config: &Config, server: &str, package: &Path, world_name: Option<String>) -> Result<()> {
    let world_name = world_name.unwrap_or_else(|| config.server.world_name.clone());
    let console = DockerConsole::connect(server).await?;

    let summary = RestoreEngine::new(config)
        .import_world(&console, package, &world_name)
        .await
        .with_context(|| format!("Failed to import {}", package.display()))?;

    println!("Imported {} entries as world {:?}", summary.world_entries, world_name);
    Ok(())
}

pub async fn export(backup: &Path, output: &Path) -> Result<()> {
    let name = world::export_world(backup, output)
        .await
        .with_context(|| format!("Failed to export world from {}", backup.display()))?;
    println!("Exported world {:?} to {}", name, output.display());
    Ok(())
}
