//! craft-backup - command line entry point
//!
//! Live backups, restores and retention for Bedrock server containers.

mod cmd;

use anyhow::Result;
use clap::{Parser, Subcommand};
use craft_backup::{config::Config, utils};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Take a live backup of one or more running servers
    Backup {
        /// Server (container) names
        #[arg(required = true)]
        servers: Vec<String>,
        /// Keep only the newest N backups of each server afterwards
        #[arg(long)]
        keep: Option<usize>,
    },
    /// Copy a backup into a server container
    Restore {
        server: String,
        /// Backup file to restore (defaults to the latest backup)
        #[arg(long, value_name = "FILE")]
        file: Option<PathBuf>,
    },
    /// Install a .mcworld package as the server's world
    ImportWorld {
        server: String,
        package: PathBuf,
        /// World directory name (defaults to the configured world)
        #[arg(long)]
        world: Option<String>,
    },
    /// Extract the world of a backup into a .mcworld package
    ExportWorld { backup: PathBuf, output: PathBuf },
    /// List backups of a server, or servers with backups
    List {
        server: Option<String>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Delete all but the newest backups of a server
    Trim {
        server: String,
        #[arg(long)]
        keep: usize,
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Wait until a server has finished starting
    Wait { server: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    }
    .with_env_overrides();

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::debug!(
        "craft-backup v{} (backups in {})",
        env!("CARGO_PKG_VERSION"),
        config.backup.backup_dir.display()
    );

    match args.command {
        Commands::Backup { servers, keep } => cmd::backup::exec(&config, servers, keep).await,
        Commands::Restore { server, file } => cmd::restore::exec(&config, &server, file).await,
        Commands::ImportWorld { server, package, world } => {
            cmd::world::import(&config, &server, &package, world).await
        }
        Commands::ExportWorld { backup, output } => cmd::world::export(&backup, &output).await,
        Commands::List { server, json } => cmd::list::exec(&config, server, json),
        Commands::Trim { server, keep, yes } => cmd::trim::exec(&config, &server, keep, yes),
        Commands::Wait { server } => cmd::restore::wait(&config, &server).await,
    }
}
