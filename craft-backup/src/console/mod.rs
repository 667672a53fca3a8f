//! Access to a server container: console lines in, commands out, files both ways.

pub mod docker;
pub mod manifest;
pub mod protocol;

#[cfg(test)]
pub(crate) mod scripted;

use crate::utils::Result;
use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tokio::process::Child;

pub use manifest::DirtyFile;
pub use protocol::{wait_for_startup, SaveCoordinator};

/// Operations the engine needs from one running server container.
///
/// Implementations must be usable from several tasks, but a single console
/// stream only supports one command/response exchange at a time; callers
/// keep one [`SaveCoordinator`] per server.
#[async_trait]
pub trait ConsoleHandle: Send + Sync {
    /// Name of the server this handle talks to.
    fn name(&self) -> &str;

    /// Write `args.join(" ")` followed by a newline to the server's stdin.
    async fn write_command(&self, args: &[&str]) -> Result<()>;

    /// Line reader over the server output, seeded with `tail` historical
    /// lines (`-1` for all of them).
    async fn console_lines(&self, tail: i64) -> Result<LineReader>;

    /// Tar stream rooted at `path` inside the container.
    async fn copy_out(&self, path: &str) -> Result<Vec<u8>>;

    /// Extract the tar stream `tar` at `path` inside the container.
    async fn copy_in(&self, path: &str, tar: Vec<u8>) -> Result<()>;
}

/// Line-buffered reader over console output.
pub struct LineReader {
    lines: Lines<Box<dyn AsyncBufRead + Send + Unpin>>,
    // Keeps a follow process (e.g. `docker logs -f`) alive for as long as
    // the reader is.
    _source: Option<Child>,
}

impl LineReader {
    pub fn new<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let buffered: Box<dyn AsyncBufRead + Send + Unpin> = Box::new(BufReader::new(reader));
        Self {
            lines: buffered.lines(),
            _source: None,
        }
    }

    pub(crate) fn with_source<R>(reader: R, source: Child) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let mut reader = Self::new(reader);
        reader._source = Some(source);
        reader
    }

    /// Next line without its terminator, `None` at end of stream.
    pub async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        let line = self.lines.next_line().await?;
        Ok(line.map(|l| l.trim_end_matches('\r').to_string()))
    }
}
