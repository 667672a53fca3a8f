use anyhow::Result;
use craft_backup::{Config, RetentionManager};

pub fn exec(config: &Config, server: Option<String>, json: bool) -> Result<()> {
    let retention = RetentionManager::new(&config.backup.backup_dir);

    let Some(server) = server else {
        let servers = retention.servers()?;
        if json {
            println!("{}", serde_json::to_string_pretty(&servers)?);
        } else {
            for server in servers {
                println!("{}", server);
            }
        }
        return Ok(());
    };

    let backups = retention.list(&server)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&backups)?);
        return Ok(());
    }

    if backups.is_empty() {
        println!("No backups for {}", server);
        return Ok(());
    }
    for backup in backups {
        let size = std::fs::metadata(&backup.path).map(|m| m.len()).unwrap_or(0);
        println!(
            "{}\t{}\t{} bytes",
            backup.timestamp.format("%Y-%m-%d %H:%M"),
            backup.name,
            size
        );
    }
    Ok(())
}
