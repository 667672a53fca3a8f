//! Approval step before backups are deleted.

use super::BackupFile;
use crate::utils::{EngineError, Result};
use dialoguer::{theme::ColorfulTheme, Confirm};

pub trait Confirmer {
    /// Whether `candidates` of `server` may be deleted.
    fn confirm(&self, server: &str, candidates: &[BackupFile]) -> Result<bool>;
}

/// Approves everything; used for scheduled and batch trims.
pub struct SkipConfirmation;

impl Confirmer for SkipConfirmation {
    fn confirm(&self, _server: &str, _candidates: &[BackupFile]) -> Result<bool> {
        Ok(true)
    }
}

/// Lists the candidates on stderr and asks on the terminal. Defaults to no.
pub struct PromptConfirmation;

impl Confirmer for PromptConfirmation {
    fn confirm(&self, server: &str, candidates: &[BackupFile]) -> Result<bool> {
        eprintln!("The following backups of {} will be deleted:", server);
        for backup in candidates {
            eprintln!("  {}", backup.name);
        }
        Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("Delete {} backup(s)?", candidates.len()))
            .default(false)
            .interact()
            .map_err(|e| EngineError::Io(std::io::Error::other(e.to_string())))
    }
}
