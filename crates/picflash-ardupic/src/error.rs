//! Error types for ArduPIC operations

use thiserror::Error;

use crate::device::SessionState;

/// ArduPIC-specific errors
///
/// None of these are retried by the driver. After any of them the adapter's
/// state is unknown and a new session must be started from scratch.
#[derive(Debug, Error)]
pub enum ArduPicError {
    /// The adapter did not answer the version query with "00"
    #[error("Bad ArduPIC version: {reply:?}")]
    VersionMismatch {
        /// Line received instead of the expected version
        reply: String,
    },

    /// The adapter acknowledged a command with a failure report
    #[error("Programming failed: {message}")]
    DeviceFailure {
        /// Failure text as sent by the adapter (without the newline)
        message: String,
    },

    /// No reply from the adapter within the read timeout
    #[error("Communication timeout")]
    Timeout,

    /// The transport reached end of stream
    #[error("Connection closed by adapter")]
    ConnectionClosed,

    /// A driver method was called in a state that does not allow it
    #[error("Cannot {operation} while session is {state:?}")]
    InvalidState {
        /// Operation that was attempted
        operation: &'static str,
        /// State the session was in
        state: SessionState,
    },

    /// The session was cancelled between two commands
    #[error("Operation cancelled")]
    Cancelled,

    /// Device read-back is not implemented
    #[error("Reading the device is not supported")]
    ReadNotSupported,

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// I/O error during communication
    #[error("I/O error: {0}")]
    IoError(String),

    /// Serial port error
    #[cfg(feature = "serial")]
    #[error("Serial port error: {0}")]
    SerialError(#[from] serialport::Error),
}

/// Result type for ArduPIC operations
pub type Result<T> = core::result::Result<T, ArduPicError>;

impl From<std::io::Error> for ArduPicError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => ArduPicError::Timeout,
            std::io::ErrorKind::UnexpectedEof => ArduPicError::ConnectionClosed,
            _ => ArduPicError::IoError(e.to_string()),
        }
    }
}
