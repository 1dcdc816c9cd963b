use thiserror::Error;

/// Error kinds a dispatch routine or the worker can report back to a caller.
///
/// These mirror the NTSTATUS family the real driver would return
/// (`STATUS_INVALID_DEVICE_STATE`, `STATUS_BUFFER_TOO_SMALL`, ...) without
/// depending on any kernel headers.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("invalid device state: {0}")]
    InvalidDeviceState(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("buffer too small: need {needed} bytes, got {got}")]
    BufferTooSmall { needed: usize, got: usize },

    #[error("insufficient resources: {0}")]
    InsufficientResources(String),

    #[error("invalid device request")]
    InvalidDeviceRequest,

    #[error("driver internal error: {0}")]
    DriverInternalError(String),

    #[error("lower driver error: {0}")]
    LowerDriverError(String),

    #[error("file system error: {0}")]
    FileSystemError(#[from] std::io::Error),

    #[error("platform not supported: {0}")]
    PlatformNotSupported(String),
}

pub type Result<T> = std::result::Result<T, DriverError>;
