use anyhow::{Context, Result};
use craft_backup::console::docker::DockerConsole;
use craft_backup::console::wait_for_startup;
use craft_backup::{Config, RestoreEngine};
use std::path::PathBuf;

pub async fn exec(config: &Config, server: &str, file: Option<PathBuf>) -> Result<()> {
    let console = DockerConsole::connect(server).await?;
    let engine = RestoreEngine::new(config);

    let summary = match file {
        Some(path) => engine
            .restore_backup(&console, &path)
            .await
            .with_context(|| format!("Failed to restore {} into {}", path.display(), server))?,
        None => engine
            .restore_latest(&console)
            .await
            .with_context(|| format!("Failed to restore latest backup into {}", server))?,
    };

    println!(
        "Restored {} world entries and {} file(s), {} bytes",
        summary.world_entries,
        summary.loose_files.len(),
        summary.bytes
    );
    Ok(())
}

pub async fn wait(config: &Config, server: &str) -> Result<()> {
    let console = DockerConsole::connect(server).await?;
    wait_for_startup(&console, config.protocol.startup_timeout()).await?;
    println!("{} is running", server);
    Ok(())
}
