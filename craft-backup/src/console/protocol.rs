//! Save hold / query / resume handshake with a live server.
//!
//! Every command is one exchange on the console: the command is written,
//! output is consumed up to its echo line, and the following line is the
//! response.
//! Between `save hold` and `save resume` the server keeps running but stops
//! touching the files it reports, which makes them safe to copy.

use super::manifest::{parse_dirty_files, DirtyFile};
use super::{ConsoleHandle, LineReader};
use crate::config::ProtocolConfig;
use crate::utils::{EngineError, Result};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const HOLD_OK: &str = "Saving...";
pub const HOLD_ALREADY_RUNNING: &str = "The command is already running";
pub const QUERY_READY_PREFIX: &str = "Data saved. Files are now ready to be copied.";
pub const RESUME_OK: &str = "Changes to the level are resumed.";
pub const STARTED_MARKER: &str = "Server started.";

/// Drives the handshake for one server. Owns the console reader, so at
/// most one exchange is in flight per coordinator.
pub struct SaveCoordinator<'a, H: ConsoleHandle + ?Sized> {
    handle: &'a H,
    lines: LineReader,
    settings: ProtocolConfig,
}

impl<'a, H: ConsoleHandle + ?Sized> SaveCoordinator<'a, H> {
    /// Attach to the console, skipping all history.
    pub async fn attach(handle: &'a H, settings: ProtocolConfig) -> Result<Self> {
        let lines = handle.console_lines(0).await?;
        Ok(Self {
            handle,
            lines,
            settings,
        })
    }

    /// Send `save hold`.
    pub async fn hold(&mut self) -> Result<()> {
        let response = self.exchange(&["save", "hold"]).await?;
        if response == HOLD_OK || response == HOLD_ALREADY_RUNNING {
            debug!(server = self.handle.name(), "Save hold accepted: {}", response);
            Ok(())
        } else {
            Err(EngineError::Protocol(format!(
                "unexpected response to save hold: {:?}",
                response
            )))
        }
    }

    /// Poll `save query` until the server reports the copy point.
    ///
    /// Returns the files to copy. The sleep between attempts is the only
    /// place where `cancel` is observed.
    pub async fn wait_for_copy_point(&mut self, cancel: &CancellationToken) -> Result<Vec<DirtyFile>> {
        let retries = self.settings.query_retries;
        let interval = self.settings.query_interval();

        for attempt in 1..=retries {
            let response = self.exchange(&["save", "query"]).await?;
            if response.starts_with(QUERY_READY_PREFIX) {
                let list = self.read_line().await?;
                let files = parse_dirty_files(&list)?;
                info!(
                    server = self.handle.name(),
                    attempt,
                    files = files.len(),
                    "Copy point reached"
                );
                return Ok(files);
            }
            debug!(server = self.handle.name(), attempt, "Copy point not reached: {}", response);

            if attempt < retries {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        }

        Err(EngineError::Timeout(format!(
            "copy point not reached after {} save query attempts",
            retries
        )))
    }

    /// Send `save resume`.
    pub async fn resume(&mut self) -> Result<()> {
        let response = self.exchange(&["save", "resume"]).await?;
        if response == RESUME_OK {
            debug!(server = self.handle.name(), "Save resumed");
            Ok(())
        } else {
            Err(EngineError::Protocol(format!(
                "unexpected response to save resume: {:?}",
                response
            )))
        }
    }

    /// Hold, wait for the copy point, run `collect`, then resume.
    ///
    /// Resume is attempted whatever happened after the hold was sent. When
    /// the handshake or `collect` fails, a failed resume is only logged and
    /// the original error is returned. When `collect` succeeded, a failed
    /// resume is returned as the error; whatever `collect` wrote stays.
    pub async fn with_copy_point<F, Fut, T>(&mut self, cancel: &CancellationToken, collect: F) -> Result<T>
    where
        F: FnOnce(Vec<DirtyFile>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let outcome = match self.hold().await {
            Ok(()) => match self.wait_for_copy_point(cancel).await {
                Ok(files) => collect(files).await,
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };

        match outcome {
            Ok(value) => {
                self.resume().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(resume_err) = self.resume().await {
                    warn!(
                        server = self.handle.name(),
                        "Failed to resume saving after error ({}): {}", e, resume_err
                    );
                }
                Err(e)
            }
        }
    }

    async fn exchange(&mut self, args: &[&str]) -> Result<String> {
        let command = args.join(" ");
        debug!(server = self.handle.name(), "> {}", command);
        self.handle.write_command(args).await?;
        self.skip_to_echo(&command).await?;
        let response = self.read_line().await?;
        debug!(server = self.handle.name(), "< {}", response);
        Ok(response)
    }

    /// Discard output up to and including the echo of `command`.
    ///
    /// Lines still buffered from an earlier exchange that timed out are
    /// dropped here instead of being taken for this command's response.
    async fn skip_to_echo(&mut self, command: &str) -> Result<()> {
        let handle = self.handle;
        let server = handle.name();
        let limit = self.settings.response_timeout();
        let lines = &mut self.lines;

        let scan = async {
            loop {
                let line = next_line(lines).await?;
                if line.trim_end().ends_with(command) {
                    return Ok(());
                }
                debug!(server, "Skipping console line: {}", line);
            }
        };

        match tokio::time::timeout(limit, scan).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Timeout(format!(
                "no echo of {:?} within {} ms",
                command,
                limit.as_millis()
            ))),
        }
    }

    async fn read_line(&mut self) -> Result<String> {
        let limit = self.settings.response_timeout();
        match tokio::time::timeout(limit, next_line(&mut self.lines)).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Timeout(format!(
                "no console output within {} ms",
                limit.as_millis()
            ))),
        }
    }
}

async fn next_line(lines: &mut LineReader) -> Result<String> {
    match lines.next_line().await? {
        Some(line) => Ok(line),
        None => Err(EngineError::Protocol("console stream closed".into())),
    }
}

/// Block until the server has printed its start banner.
///
/// Reads the whole console history, so a server that started long ago
/// returns immediately.
pub async fn wait_for_startup<H: ConsoleHandle + ?Sized>(handle: &H, limit: Duration) -> Result<()> {
    let mut lines = handle.console_lines(-1).await?;
    let scan = async {
        while let Some(line) = lines.next_line().await? {
            if line.contains(STARTED_MARKER) {
                return Ok(());
            }
        }
        Err(EngineError::Protocol(format!(
            "console of {} closed before the server started",
            handle.name()
        )))
    };

    match tokio::time::timeout(limit, scan).await {
        Ok(result) => result,
        Err(_) => Err(EngineError::Timeout(format!(
            "{} did not start within {} s",
            handle.name(),
            limit.as_secs()
        ))),
    }
}
