//! Dirty file list reported by `save query`.
//!
//! The server prints the files that must be copied as a single line of
//! `<path>:<size>` items separated by `", "`. Paths are relative to the
//! `worlds/` directory and start with the world name. There is no escaping,
//! so a file name containing `", "` cannot be represented.

use crate::utils::{EngineError, Result};
use serde::{Deserialize, Serialize};

/// One file the server reported as part of the consistent copy set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirtyFile {
    /// Path relative to the worlds directory, e.g. `Bedrock level/db/CURRENT`.
    pub path: String,
    /// Number of bytes of the file that belong to the snapshot.
    pub size: u64,
}

impl DirtyFile {
    /// World directory the file lives in.
    pub fn world(&self) -> &str {
        self.path.split('/').next().unwrap_or_default()
    }

    /// Directory part of `path`, empty for top-level files.
    pub fn parent(&self) -> &str {
        self.path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or_default()
    }
}

/// Parse the file list line that follows the copy-point response.
pub fn parse_dirty_files(line: &str) -> Result<Vec<DirtyFile>> {
    let mut files = Vec::new();

    for item in line.trim().split(", ") {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        let (path, size) = item.rsplit_once(':').ok_or_else(|| {
            EngineError::Protocol(format!("file list item without size: {:?}", item))
        })?;
        let size = size.trim().parse::<u64>().map_err(|_| {
            EngineError::Protocol(format!("file list item with invalid size: {:?}", item))
        })?;
        let path = path.trim().trim_start_matches('/').to_string();
        if path.is_empty() {
            return Err(EngineError::Protocol(format!("file list item without path: {:?}", item)));
        }
        files.push(DirtyFile { path, size });
    }

    Ok(files)
}
