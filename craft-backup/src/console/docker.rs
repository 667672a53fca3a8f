//! [`ConsoleHandle`] backed by the `docker` command line client.
//!
//! Commands go through a long-lived `docker attach` whose stdin stays open.
//! Console output is read with `docker logs --follow`, and files move with
//! `docker cp` in tar mode.

use super::{ConsoleHandle, LineReader};
use crate::utils::{EngineError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Label every managed server container carries.
pub const MANAGED_LABEL: &str = "craft.managed";

pub struct DockerConsole {
    container: String,
    stdin: Mutex<Option<Attached>>,
}

struct Attached {
    _child: Child,
    stdin: ChildStdin,
}

impl DockerConsole {
    /// Resolve `container` and check it is a managed game server.
    ///
    /// Fails with `NotFound` when no such container exists and `WrongKind`
    /// when it exists without the managed label.
    pub async fn connect(container: &str) -> Result<Self> {
        let output = Command::new("docker")
            .args(["inspect", "--format"])
            .arg(format!("{{{{index .Config.Labels \"{}\"}}}}", MANAGED_LABEL))
            .arg(container)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| EngineError::Container(format!("failed to run docker: {}", e)))?;

        if !output.status.success() {
            return Err(classify_failure(container, &output.stderr));
        }
        let label = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if label != "true" {
            return Err(EngineError::WrongKind(format!(
                "container {} is not a managed server",
                container
            )));
        }

        Ok(Self {
            container: container.to_string(),
            stdin: Mutex::new(None),
        })
    }

    async fn attach(&self) -> Result<Attached> {
        debug!(container = %self.container, "Attaching to console");
        let mut child = Command::new("docker")
            .args(["attach", "--sig-proxy=false"])
            .arg(&self.container)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Container(format!("failed to run docker attach: {}", e)))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::Container("docker attach has no stdin".into()))?;
        Ok(Attached {
            _child: child,
            stdin,
        })
    }
}

#[async_trait]
impl ConsoleHandle for DockerConsole {
    fn name(&self) -> &str {
        &self.container
    }

    async fn write_command(&self, args: &[&str]) -> Result<()> {
        let mut guard = self.stdin.lock().await;
        if guard.is_none() {
            *guard = Some(self.attach().await?);
        }
        let line = format!("{}\n", args.join(" "));

        let written = match guard.as_mut() {
            Some(attached) => {
                let result = attached.stdin.write_all(line.as_bytes()).await;
                match result {
                    Ok(()) => attached.stdin.flush().await,
                    Err(e) => Err(e),
                }
            }
            None => return Err(EngineError::Container("console not attached".into())),
        };
        if let Err(e) = written {
            // Drop the broken attach so the next command re-attaches.
            *guard = None;
            return Err(EngineError::Container(format!(
                "failed to write to {}: {}",
                self.container, e
            )));
        }
        Ok(())
    }

    async fn console_lines(&self, tail: i64) -> Result<LineReader> {
        let mut child = Command::new("docker")
            .args(logs_args(tail, Utc::now()))
            .arg(&self.container)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Container(format!("failed to run docker logs: {}", e)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Container("docker logs has no stdout".into()))?;
        Ok(LineReader::with_source(stdout, child))
    }

    async fn copy_out(&self, path: &str) -> Result<Vec<u8>> {
        let output = Command::new("docker")
            .arg("cp")
            .arg(format!("{}:{}", self.container, path))
            .arg("-")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| EngineError::Container(format!("failed to run docker cp: {}", e)))?;

        if !output.status.success() {
            return Err(classify_failure(&format!("{}:{}", self.container, path), &output.stderr));
        }
        debug!(container = %self.container, path, bytes = output.stdout.len(), "Copied out");
        Ok(output.stdout)
    }

    async fn copy_in(&self, path: &str, tar: Vec<u8>) -> Result<()> {
        let mut child = Command::new("docker")
            .arg("cp")
            .arg("-")
            .arg(format!("{}:{}", self.container, path))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EngineError::Container(format!("failed to run docker cp: {}", e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::Container("docker cp has no stdin".into()))?;
        let size = tar.len();
        stdin.write_all(&tar).await?;
        drop(stdin);

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(classify_failure(&format!("{}:{}", self.container, path), &output.stderr));
        }
        info!(container = %self.container, path, bytes = size, "Copied in");
        Ok(())
    }
}

/// Arguments of the `docker logs` follower.
///
/// Without history the follower reads from `since` rather than `--tail 0`:
/// the daemon serves from its log file, so output written while the follower
/// is still connecting is not lost.
fn logs_args(tail: i64, since: DateTime<Utc>) -> Vec<String> {
    let mut args = vec!["logs".to_string(), "--follow".to_string()];
    match tail {
        0 => {
            args.push("--since".to_string());
            args.push(format!("{}.{:09}", since.timestamp(), since.timestamp_subsec_nanos()));
        }
        t if t < 0 => {
            args.push("--tail".to_string());
            args.push("all".to_string());
        }
        t => {
            args.push("--tail".to_string());
            args.push(t.to_string());
        }
    }
    args
}

fn classify_failure(target: &str, stderr: &[u8]) -> EngineError {
    let message = String::from_utf8_lossy(stderr).trim().to_string();
    let lower = message.to_ascii_lowercase();
    if lower.contains("no such container")
        || lower.contains("no such object")
        || lower.contains("could not find the file")
    {
        EngineError::NotFound(format!("{}: {}", target, message))
    } else {
        EngineError::Container(format!("{}: {}", target, message))
    }
}
