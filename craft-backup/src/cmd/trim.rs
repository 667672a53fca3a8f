use anyhow::Result;
use craft_backup::retention::{Confirmer, PromptConfirmation, SkipConfirmation};
use craft_backup::{Config, RetentionManager};

pub fn exec(config: &Config, server: &str, keep: usize, yes: bool) -> Result<()> {
    let retention = RetentionManager::new(&config.backup.backup_dir);
    let confirmer: &dyn Confirmer = if yes { &SkipConfirmation } else { &PromptConfirmation };

    let removed = retention.trim(server, keep, confirmer)?;
    if removed.is_empty() {
        println!("Nothing removed");
    } else {
        for name in &removed {
            println!("Removed {}", name);
        }
    }
    Ok(())
}
