//! Zip conversions, used for backups and world packages on disk.

use super::{normalize_name, Archive, Entry, DEFAULT_DIR_MODE, DEFAULT_FILE_MODE};
use crate::utils::{EngineError, Result};
use bytes::Bytes;
use std::io::{Cursor, Read, Seek, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const MAX_PREALLOCATION: u64 = 1 << 20;

impl Archive {
    /// Decode a complete zip archive.
    pub fn from_zip<R: Read + Seek>(reader: R) -> Result<Archive> {
        let mut zip = ZipArchive::new(reader).map_err(zip_error)?;
        let mut archive = Archive::new();

        for i in 0..zip.len() {
            let mut file = zip.by_index(i).map_err(zip_error)?;
            let name = normalize_name(file.name());
            if name.is_empty() {
                continue;
            }

            if file.is_dir() {
                let mode = file.unix_mode().map(|m| m & 0o7777).unwrap_or(DEFAULT_DIR_MODE);
                archive.insert(Entry::dir(name).with_mode(mode));
                continue;
            }

            let mode = file.unix_mode().map(|m| m & 0o7777).unwrap_or(DEFAULT_FILE_MODE);
            // Sizes come from the central directory of an untrusted file
            let mut body = Vec::with_capacity(file.size().min(MAX_PREALLOCATION) as usize);
            file.read_to_end(&mut body)
                .map_err(|e| EngineError::Format(format!("zip entry {}: {}", name, e)))?;
            archive.insert(Entry {
                name,
                mode,
                body: Bytes::from(body),
            });
        }

        Ok(archive)
    }

    /// Encode as an in-memory zip archive.
    pub fn to_zip(&self) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        self.write_zip(&mut cursor)?;
        Ok(cursor.into_inner())
    }

    /// Stream the archive as zip into `writer`, entries in archive order.
    pub fn write_zip<W: Write + Seek>(&self, writer: W) -> Result<()> {
        let mut zip = ZipWriter::new(writer);
        let base = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for entry in self.entries() {
            let options = base.unix_permissions(entry.mode);
            if entry.is_dir() {
                zip.add_directory(entry.name.as_str(), options)?;
            } else {
                zip.start_file(entry.name.as_str(), options)?;
                zip.write_all(&entry.body)?;
            }
        }

        zip.finish()?;
        Ok(())
    }
}

fn zip_error(e: zip::result::ZipError) -> EngineError {
    match e {
        zip::result::ZipError::Io(io) => EngineError::Io(io),
        other => EngineError::Format(format!("zip: {}", other)),
    }
}
