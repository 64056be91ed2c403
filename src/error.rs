//! Unified error type for driver, solver, and calibrator operations.

use thiserror::Error;

/// The error type for all fallible operations in this crate.
#[derive(Error, Debug)]
pub enum DriverError {
    /// The transport could not be opened.
    #[error("failed to open device: {0}")]
    OpenFailed(String),

    /// Access to the device path was refused.
    #[error("permission denied accessing device")]
    PermissionDenied,

    /// No device exists at the given path.
    #[error("device not found")]
    DeviceNotFound,

    /// A read returned too few bytes, or the response opcode was wrong.
    #[error("invalid response from device: {0}")]
    InvalidResponse(String),

    /// A transport operation did not complete in time.
    #[error("operation timed out")]
    Timeout,

    /// All keys in the catalog failed, or the single-key challenge was rejected.
    #[error("unlock failed")]
    UnlockFailed,

    /// A measurement could not be completed.
    #[error("measurement failed: {0}")]
    MeasurementFailed(String),

    /// A caller-supplied parameter was out of range or otherwise invalid.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The operation requires a state the handle has not reached yet.
    #[error("device not initialized for this operation")]
    NotInitialized,

    /// The underlying transport reported an I/O-layer error.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
}

impl DriverError {
    /// Maps this error to the numeric taxonomy used by C-compatible callers.
    pub fn code(&self) -> i32 {
        match self {
            DriverError::OpenFailed(_) => -1,
            DriverError::PermissionDenied => -2,
            DriverError::DeviceNotFound => -3,
            DriverError::InvalidResponse(_) => -4,
            DriverError::Timeout => -5,
            DriverError::UnlockFailed => -6,
            DriverError::MeasurementFailed(_) => -7,
            DriverError::InvalidParameter(_) => -8,
            DriverError::NotInitialized => -9,
            DriverError::Transport(_) => -1,
        }
    }
}

/// A specialized [`Result`] type for this crate's operations.
pub type Result<T> = std::result::Result<T, DriverError>;
