//! Tar conversions, used for container copy-out / copy-in.

use super::{normalize_name, Archive, Entry};
use crate::utils::{EngineError, Result};
use bytes::Bytes;
use std::io::Read;
use tar::{EntryType, Header};
use tracing::debug;

impl Archive {
    /// Decode a complete tar stream.
    ///
    /// Regular files and directories become entries; links and special
    /// files are skipped.
    pub fn from_tar<R: Read>(reader: R) -> Result<Archive> {
        let mut tar = tar::Archive::new(reader);
        let mut archive = Archive::new();

        let entries = tar.entries().map_err(tar_error)?;
        for entry in entries {
            let mut entry = entry.map_err(tar_error)?;
            let kind = entry.header().entry_type();
            let raw_name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
            let mut name = normalize_name(&raw_name);
            if name.is_empty() {
                continue;
            }
            let mode = entry.header().mode().map_err(tar_error)? & 0o7777;

            if kind.is_dir() {
                if !name.ends_with('/') {
                    name.push('/');
                }
                archive.insert(Entry::dir(name).with_mode(mode));
            } else if kind.is_file() {
                // Header sizes are untrusted; grow the buffer from what is actually read
                let size = entry.size();
                let mut body = Vec::new();
                entry.read_to_end(&mut body).map_err(tar_error)?;
                if body.len() as u64 != size {
                    return Err(EngineError::Format(format!(
                        "tar entry {} is truncated: {} of {} bytes",
                        name,
                        body.len(),
                        size
                    )));
                }
                archive.insert(Entry {
                    name,
                    mode,
                    body: Bytes::from(body),
                });
            } else {
                debug!("Skipping tar entry {} of type {:?}", name, kind);
            }
        }

        Ok(archive)
    }

    /// Encode as a tar stream in archive order.
    ///
    /// Timestamps and ownership are zeroed so equal archives give equal bytes.
    pub fn to_tar(&self) -> Result<Vec<u8>> {
        let mut builder = tar::Builder::new(Vec::new());

        for entry in self.entries() {
            let mut header = Header::new_gnu();
            header.set_mode(entry.mode);
            header.set_mtime(0);
            header.set_uid(0);
            header.set_gid(0);

            if entry.is_dir() {
                header.set_entry_type(EntryType::Directory);
                header.set_size(0);
                builder
                    .append_data(&mut header, entry.name.trim_end_matches('/'), std::io::empty())
                    .map_err(tar_error)?;
            } else {
                header.set_entry_type(EntryType::Regular);
                header.set_size(entry.body.len() as u64);
                builder
                    .append_data(&mut header, &entry.name, entry.body.as_ref())
                    .map_err(tar_error)?;
            }
        }

        builder.into_inner().map_err(tar_error)
    }
}

fn tar_error(e: std::io::Error) -> EngineError {
    EngineError::Format(format!("tar: {}", e))
}
