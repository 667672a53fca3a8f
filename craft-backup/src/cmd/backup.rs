use anyhow::{bail, Result};
use craft_backup::batch::backup_all;
use craft_backup::console::docker::DockerConsole;
use craft_backup::{Config, RetentionManager, SnapshotCollector};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub async fn exec(config: &Config, servers: Vec<String>, keep: Option<usize>) -> Result<()> {
    let mut targets = Vec::with_capacity(servers.len());
    let mut unreachable = Vec::new();
    for server in &servers {
        match DockerConsole::connect(server).await {
            Ok(console) => targets.push(Arc::new(console)),
            Err(e) => {
                tracing::error!(server = %server, "Skipping server: {}", e);
                unreachable.push(server.clone());
            }
        }
    }

    // Ctrl+C abandons snapshots that have not started copying yet
    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Received Ctrl+C, cancelling pending snapshots");
            ctrl_c_cancel.cancel();
        }
    });

    let report = backup_all(
        Arc::new(SnapshotCollector::new(config)),
        RetentionManager::new(&config.backup.backup_dir),
        targets,
        config.performance.max_parallel,
        keep.or(config.backup.keep),
        cancel,
    )
    .await;

    for backup in &report.succeeded {
        println!("{}\t{}", backup.server, backup.path.display());
    }
    for (server, error) in &report.failed {
        eprintln!("{}\tFAILED: {}", server, error);
    }
    for server in &unreachable {
        eprintln!("{}\tFAILED: not reachable", server);
    }

    if !report.is_success() || !unreachable.is_empty() {
        bail!(
            "{} of {} backup(s) failed",
            report.failed.len() + unreachable.len(),
            servers.len()
        );
    }
    Ok(())
}
