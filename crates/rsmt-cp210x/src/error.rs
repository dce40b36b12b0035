//! Error types for the CP210x USB transport

use rsmt_core::{Field, TransportError};
use thiserror::Error;

/// Result type for CP210x USB operations
pub type Result<T> = std::result::Result<T, Cp210xError>;

/// Errors that can occur while talking to a CP210x over USB
#[derive(Debug, Error)]
pub enum Cp210xError {
    /// No device at the requested enumeration index
    #[error("no CP210x device at index {0}")]
    DeviceNotFound(u32),
    /// Failed to enumerate or open the device
    #[error("failed to open CP210x: {0}")]
    OpenFailed(String),
    /// Failed to claim the control interface
    #[error("failed to claim interface: {0}")]
    ClaimFailed(String),
    /// A control transfer failed
    #[error("{operation} failed: {message}")]
    TransferFailed {
        /// Request that failed
        operation: &'static str,
        /// Underlying failure
        message: String,
    },
    /// The device answered with something unexpected
    #[error("invalid {field:?} response: {message}")]
    InvalidResponse {
        /// Field being read
        field: Field,
        /// What was wrong
        message: String,
    },
    /// The value cannot be expressed on the wire
    #[error("{field:?} value cannot be written: {message}")]
    InvalidValue {
        /// Field being written
        field: Field,
        /// What was wrong
        message: String,
    },
}

impl From<Cp210xError> for TransportError {
    fn from(e: Cp210xError) -> Self {
        match e {
            Cp210xError::DeviceNotFound(index) => TransportError::NotFound { index },
            Cp210xError::OpenFailed(msg) | Cp210xError::ClaimFailed(msg) => {
                TransportError::Open(msg)
            }
            Cp210xError::TransferFailed { operation, message } => {
                TransportError::Transfer { operation, message }
            }
            Cp210xError::InvalidResponse { field, message } => {
                TransportError::InvalidResponse { field, message }
            }
            Cp210xError::InvalidValue { field, message } => TransportError::Transfer {
                operation: "set_field",
                message: format!("{:?}: {}", field, message),
            },
        }
    }
}
