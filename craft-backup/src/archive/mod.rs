//! Format-neutral archive model.
//!
//! An [`Archive`] is an ordered set of named byte blobs. Container copy
//! operations speak tar, backups and world packages on disk are zip; the
//! archive is the common currency between the two.

mod tarball;
mod zipfile;

use bytes::Bytes;
use std::collections::HashMap;

/// Permission bits used when a source does not carry a mode.
pub const DEFAULT_FILE_MODE: u32 = 0o644;
pub const DEFAULT_DIR_MODE: u32 = 0o755;

/// A single named blob.
///
/// Directory markers are entries whose name ends in `/` and whose body is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub mode: u32,
    pub body: Bytes,
}

impl Entry {
    pub fn file(name: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mode: DEFAULT_FILE_MODE,
            body: body.into(),
        }
    }

    pub fn dir(name: impl Into<String>) -> Self {
        let mut name = name.into();
        if !name.ends_with('/') {
            name.push('/');
        }
        Self {
            name,
            mode: DEFAULT_DIR_MODE,
            body: Bytes::new(),
        }
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/')
    }
}

/// Ordered collection of uniquely named entries.
#[derive(Debug, Clone, Default)]
pub struct Archive {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
}

impl Archive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, replacing an existing one with the same name in place.
    pub fn insert(&mut self, entry: Entry) {
        match self.index.get(&entry.name) {
            Some(&pos) => self.entries[pos] = entry,
            None => {
                self.index.insert(entry.name.clone(), self.entries.len());
                self.entries.push(entry);
            }
        }
    }

    /// Insert every entry of `other`, in order.
    pub fn merge(&mut self, other: Archive) {
        for entry in other.entries {
            self.insert(entry);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Entry> {
        self.index.get(name).map(|&pos| &self.entries[pos])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total size of all bodies in bytes.
    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.body.len() as u64).sum()
    }

    /// Cut the body of `name` down to `len` bytes. Shorter bodies are left alone.
    ///
    /// Returns false when no such entry exists.
    pub fn truncate_body(&mut self, name: &str, len: usize) -> bool {
        match self.index.get(name) {
            Some(&pos) => {
                let entry = &mut self.entries[pos];
                if entry.body.len() > len {
                    entry.body.truncate(len);
                }
                true
            }
            None => false,
        }
    }

    /// Keep only entries under `prefix` and remove it from their names.
    ///
    /// Entries whose name becomes empty (the prefix's own directory marker)
    /// are dropped.
    pub fn strip_prefix(self, prefix: &str) -> Archive {
        let prefix = normalize_prefix(prefix);
        self.into_iter()
            .filter_map(|mut entry| {
                let rest = entry.name.strip_prefix(prefix.as_str())?;
                if rest.is_empty() {
                    return None;
                }
                entry.name = rest.to_string();
                Some(entry)
            })
            .collect()
    }

    /// Prepend `prefix` to every entry name.
    pub fn with_prefix(self, prefix: &str) -> Archive {
        let prefix = normalize_prefix(prefix);
        self.into_iter()
            .map(|mut entry| {
                entry.name = format!("{}{}", prefix, entry.name);
                entry
            })
            .collect()
    }

    /// Split into (matching, rest), preserving order on both sides.
    pub fn partition<F>(self, pred: F) -> (Archive, Archive)
    where
        F: Fn(&Entry) -> bool,
    {
        let mut matching = Archive::new();
        let mut rest = Archive::new();
        for entry in self {
            if pred(&entry) {
                matching.insert(entry);
            } else {
                rest.insert(entry);
            }
        }
        (matching, rest)
    }
}

impl IntoIterator for Archive {
    type Item = Entry;
    type IntoIter = std::vec::IntoIter<Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl FromIterator<Entry> for Archive {
    fn from_iter<I: IntoIterator<Item = Entry>>(iter: I) -> Self {
        let mut archive = Archive::new();
        for entry in iter {
            archive.insert(entry);
        }
        archive
    }
}

/// Normalise an archive-internal name: forward slashes, no leading `./` or `/`.
pub(crate) fn normalize_name(raw: &str) -> String {
    let name = raw.replace('\\', "/");
    let mut name = name.as_str();
    loop {
        if let Some(rest) = name.strip_prefix("./") {
            name = rest;
        } else if let Some(rest) = name.strip_prefix('/') {
            name = rest;
        } else {
            break;
        }
    }
    if name == "." {
        return String::new();
    }
    name.to_string()
}

fn normalize_prefix(prefix: &str) -> String {
    let prefix = normalize_name(prefix);
    if prefix.is_empty() || prefix.ends_with('/') {
        prefix
    } else {
        format!("{}/", prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world_archive() -> Archive {
        [
            Entry::dir("Bedrock level/"),
            Entry::file("Bedrock level/level.dat", &b"level"[..]),
            Entry::file("Bedrock level/db/CURRENT", &b"MANIFEST-000001\n"[..]),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut archive = Archive::new();
        archive.insert(Entry::file("a", &b"1"[..]));
        archive.insert(Entry::file("b", &b"2"[..]));
        archive.insert(Entry::file("a", &b"3"[..]));

        assert_eq!(archive.len(), 2);
        assert_eq!(archive.names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(archive.get("a").unwrap().body, Bytes::from_static(b"3"));
    }

    #[test]
    fn test_strip_then_prepend_restores_names() {
        let original = world_archive();
        let stripped = original.clone().strip_prefix("Bedrock level/");

        assert_eq!(stripped.names().collect::<Vec<_>>(), vec!["level.dat", "db/CURRENT"]);

        let restored = stripped.with_prefix("Bedrock level");
        let expected: Vec<&str> = original.names().filter(|n| *n != "Bedrock level/").collect();
        assert_eq!(restored.names().collect::<Vec<_>>(), expected);
        for entry in restored.entries() {
            assert_eq!(entry.body, original.get(&entry.name).unwrap().body);
        }
    }

    #[test]
    fn test_strip_prefix_drops_unrelated_entries() {
        let mut archive = world_archive().with_prefix("worlds/");
        archive.insert(Entry::file("server.properties", &b"level-name=x"[..]));

        let world = archive.strip_prefix("worlds/Bedrock level");
        assert!(!world.contains("server.properties"));
        assert!(world.contains("level.dat"));
    }

    #[test]
    fn test_partition() {
        let mut archive = world_archive().with_prefix("worlds");
        archive.insert(Entry::file("server.properties", &b""[..]));

        let (worlds, loose) = archive.partition(|e| e.name.starts_with("worlds/"));
        assert_eq!(worlds.len(), 3);
        assert_eq!(loose.names().collect::<Vec<_>>(), vec!["server.properties"]);
    }

    #[test]
    fn test_truncate_body() {
        let mut archive = world_archive();
        assert!(archive.truncate_body("Bedrock level/level.dat", 3));
        assert!(archive.truncate_body("Bedrock level/db/CURRENT", 1024));
        assert!(!archive.truncate_body("missing", 0));

        assert_eq!(archive.get("Bedrock level/level.dat").unwrap().body.as_ref(), b"lev");
        assert_eq!(archive.get("Bedrock level/db/CURRENT").unwrap().body.len(), 16);
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("./db/CURRENT"), "db/CURRENT");
        assert_eq!(normalize_name("/level.dat"), "level.dat");
        assert_eq!(normalize_name("db\\000005.ldb"), "db/000005.ldb");
        assert_eq!(normalize_name("./"), "");
        assert_eq!(normalize_name("."), "");
    }
}
