//! In-memory console for tests: replays a fixed transcript and records
//! everything written and copied in.

use super::{ConsoleHandle, LineReader};
use crate::archive::{Archive, Entry};
use crate::utils::{EngineError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Mutex;

pub(crate) struct ScriptedConsole {
    name: String,
    history: Vec<String>,
    script: Vec<String>,
    files: HashMap<String, Vec<u8>>,
    failing_copy_in: Option<String>,
    written: Mutex<Vec<String>>,
    copied_in: Mutex<Vec<(String, Vec<u8>)>>,
}

impl ScriptedConsole {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            history: Vec::new(),
            script: Vec::new(),
            files: HashMap::new(),
            failing_copy_in: None,
            written: Mutex::new(Vec::new()),
            copied_in: Mutex::new(Vec::new()),
        }
    }

    /// Echo of `command` followed by `response`.
    pub fn exchange(self, command: &str, response: &str) -> Self {
        self.line(command).line(response)
    }

    pub fn line(mut self, line: &str) -> Self {
        self.script.push(line.to_string());
        self
    }

    /// Output produced before the reader attached.
    pub fn history(mut self, line: &str) -> Self {
        self.history.push(line.to_string());
        self
    }

    /// Serve `body` as a single-file tar when `path` is copied out,
    /// named after its last path component like `docker cp` does.
    pub fn file(mut self, path: &str, body: &[u8]) -> Self {
        let base = path.rsplit('/').next().unwrap_or(path);
        let archive: Archive = [Entry::file(base, body.to_vec())].into_iter().collect();
        self.files.insert(path.to_string(), archive.to_tar().unwrap());
        self
    }

    /// Make every copy-in to `path` fail.
    pub fn fail_copy_in(mut self, path: &str) -> Self {
        self.failing_copy_in = Some(path.to_string());
        self
    }

    pub fn written(&self) -> Vec<String> {
        self.written.lock().unwrap().clone()
    }

    pub fn count_of(&self, command: &str) -> usize {
        self.written.lock().unwrap().iter().filter(|c| *c == command).count()
    }

    /// Copy-ins decoded back into archives.
    pub fn copied_in(&self) -> Vec<(String, Archive)> {
        self.copied_in
            .lock()
            .unwrap()
            .iter()
            .map(|(path, tar)| (path.clone(), Archive::from_tar(tar.as_slice()).unwrap()))
            .collect()
    }
}

fn transcript(lines: &[String]) -> Vec<u8> {
    let mut out = Vec::new();
    for line in lines {
        out.extend_from_slice(line.as_bytes());
        out.push(b'\n');
    }
    out
}

#[async_trait]
impl ConsoleHandle for ScriptedConsole {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write_command(&self, args: &[&str]) -> Result<()> {
        self.written.lock().unwrap().push(args.join(" "));
        Ok(())
    }

    async fn console_lines(&self, tail: i64) -> Result<LineReader> {
        let mut lines = Vec::new();
        if tail < 0 {
            lines.extend(self.history.iter().cloned());
        } else {
            let skip = self.history.len().saturating_sub(tail as usize);
            lines.extend(self.history.iter().skip(skip).cloned());
        }
        lines.extend(self.script.iter().cloned());
        Ok(LineReader::new(Cursor::new(transcript(&lines))))
    }

    async fn copy_out(&self, path: &str) -> Result<Vec<u8>> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("{}:{}", self.name, path)))
    }

    async fn copy_in(&self, path: &str, tar: Vec<u8>) -> Result<()> {
        if self.failing_copy_in.as_deref() == Some(path) {
            return Err(EngineError::Container(format!("copy into {} refused", path)));
        }
        self.copied_in.lock().unwrap().push((path.to_string(), tar));
        Ok(())
    }
}
