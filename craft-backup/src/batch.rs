//! Multi-server backups.
//!
//! Each server gets its own task; a semaphore bounds how many snapshots run
//! at once. A failing server is logged and reported but never stops the
//! others.

use crate::console::ConsoleHandle;
use crate::retention::{BackupFile, RetentionManager, SkipConfirmation};
use crate::snapshot::SnapshotCollector;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Outcome of a batch backup.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<BackupFile>,
    /// (server, error message)
    pub failed: Vec<(String, String)>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Back up every server in `targets` in parallel.
///
/// With `keep` set, each successful server's history is trimmed to the
/// newest `keep` backups without confirmation.
pub async fn backup_all<H>(
    collector: Arc<SnapshotCollector>,
    retention: RetentionManager,
    targets: Vec<Arc<H>>,
    max_parallel: usize,
    keep: Option<usize>,
    cancel: CancellationToken,
) -> BatchReport
where
    H: ConsoleHandle + 'static,
{
    let semaphore = Arc::new(Semaphore::new(max_parallel.max(1)));
    let mut handles = Vec::with_capacity(targets.len());

    info!("Starting batch backup of {} server(s), {} at a time", targets.len(), max_parallel);

    for target in targets {
        let sem = Arc::clone(&semaphore);
        let collector = Arc::clone(&collector);
        let retention = retention.clone();
        let cancel = cancel.clone();
        let server = target.name().to_string();

        let handle = tokio::spawn(async move {
            let _permit = tokio::select! {
                permit = sem.acquire_owned() => permit.map_err(|e| e.to_string())?,
                _ = cancel.cancelled() => return Err("cancelled before start".to_string()),
            };

            let backup = collector
                .snapshot(target.as_ref(), &cancel)
                .await
                .map_err(|e| {
                    if e.is_protocol_failure() {
                        warn!(server = target.name(), "Server may still be holding saves, check its console");
                    }
                    e.to_string()
                })?;

            if let Some(keep) = keep {
                match retention.trim(target.name(), keep, &SkipConfirmation) {
                    Ok(removed) if !removed.is_empty() => {
                        info!(server = target.name(), removed = removed.len(), "Trimmed old backups");
                    }
                    Ok(_) => {}
                    Err(e) => warn!(server = target.name(), "Failed to trim backups: {}", e),
                }
            }
            Ok::<_, String>(backup)
        });

        handles.push((server, handle));
    }

    let mut report = BatchReport::default();
    for (server, handle) in handles {
        match handle.await {
            Ok(Ok(backup)) => report.succeeded.push(backup),
            Ok(Err(e)) => {
                error!(server = %server, "Backup failed: {}", e);
                report.failed.push((server, e));
            }
            Err(e) => {
                error!(server = %server, "Backup task panicked: {}", e);
                report.failed.push((server, format!("task failed: {}", e)));
            }
        }
    }

    info!(
        "Batch backup finished: {} succeeded, {} failed",
        report.succeeded.len(),
        report.failed.len()
    );
    report
}
