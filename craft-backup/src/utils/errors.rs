//! Error types for the backup engine.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// The server answered a console command with something unexpected.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The copy point (or any awaited console line) did not arrive in time.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Malformed tar or zip input.
    #[error("Format error: {0}")]
    Format(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The target exists but is not what the operation expects.
    #[error("Wrong kind: {0}")]
    WrongKind(String),

    #[error("Invalid world package: {0}")]
    InvalidWorld(String),

    #[error("Container error: {0}")]
    Container(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl EngineError {
    /// Errors that leave the server possibly paused but otherwise untouched.
    pub fn is_protocol_failure(&self) -> bool {
        matches!(self, EngineError::Protocol(_) | EngineError::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
