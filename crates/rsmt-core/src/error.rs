//! Error types for rsmt-core
//!
//! Every failure the engine reports falls into one of the categories of
//! [`ErrorKind`]. The orchestrator uses [`Error::is_retryable`] to decide
//! whether a failed verification pass may be attempted again.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::transport::Field;

/// Result type for rsmt-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Location of a token in the configuration text (1-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    /// Line number
    pub line: usize,
    /// Column number
    pub column: usize,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Broad failure category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed invocation; no device was touched
    Usage,
    /// Malformed configuration text
    Syntax,
    /// Device data mismatch or failed precondition
    Customization,
    /// I/O failure talking to a device
    Transport,
    /// Broken internal invariant
    Internal,
}

/// Errors reported by the customization engine
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid command line or option combination
    #[error("{0}")]
    Usage(String),

    /// Invalid configuration text
    #[error("{message}{}", .position.map(|p| format!(" at {}", p)).unwrap_or_default())]
    Syntax {
        /// What went wrong
        message: String,
        /// Where the offending token starts, if known
        position: Option<Position>,
    },

    /// A read-back value differs from the configured one
    #[error("Failed {field} verification")]
    VerifyFailed {
        /// Name of the parameter that failed
        field: &'static str,
    },

    /// Any other manufacturing process failure
    #[error("{0}")]
    Customization(String),

    /// The transport collaborator failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Failed to read an input file
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        /// File that could not be read
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Internal invariant violation
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Usage(_) | Self::Io { .. } => ErrorKind::Usage,
            Self::Syntax { .. } => ErrorKind::Syntax,
            Self::VerifyFailed { .. } | Self::Customization(_) => ErrorKind::Customization,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether a verification pass that failed with this error may be retried
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Customization | ErrorKind::Transport
        )
    }
}

/// Errors raised by a transport collaborator
#[derive(Debug, Error)]
pub enum TransportError {
    /// No device at the requested enumeration index
    #[error("no device at index {index}")]
    NotFound {
        /// Enumeration index
        index: u32,
    },

    /// The device exists but could not be opened
    #[error("failed to open device: {0}")]
    Open(String),

    /// A request to the device failed
    #[error("{operation} failed: {message}")]
    Transfer {
        /// Name of the failed operation
        operation: &'static str,
        /// Underlying failure
        message: String,
    },

    /// The device family does not implement this field
    #[error("{0:?} is not supported by this device")]
    Unsupported(Field),

    /// The device answered with something that could not be decoded
    #[error("malformed {field:?} response: {message}")]
    InvalidResponse {
        /// Field being read
        field: Field,
        /// What was wrong with the response
        message: String,
    },
}
