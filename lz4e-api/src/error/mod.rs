//! Error handling module for the LZ4E filter

use core::fmt;
use alloc::string::{String, ToString};

/// Common error type used throughout the LZ4E filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Out of memory
    OutOfMemory,
    /// Allocation from a bounded pool failed
    ResourceExhausted(String),
    /// I/O error
    IoError(String),
    /// Operation not supported
    Unsupported(String),
    /// Temporary failure, the caller may retry with more resources
    TemporaryFailure(String),
    /// Invalid argument
    InvalidArgument(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::OutOfMemory => write!(f, "Out of memory"),
            Error::ResourceExhausted(msg) => write!(f, "Resource exhausted: {}", msg),
            Error::IoError(msg) => write!(f, "I/O error: {}", msg),
            Error::Unsupported(msg) => write!(f, "Unsupported: {}", msg),
            Error::TemporaryFailure(msg) => write!(f, "Temporary failure: {}", msg),
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type for operations that can fail
pub type Result<T> = core::result::Result<T, Error>;

/// Creates a new out of memory error
pub fn out_of_memory() -> Error {
    Error::OutOfMemory
}

/// Creates a new resource exhausted error
pub fn resource_exhausted(msg: &str) -> Error {
    Error::ResourceExhausted(msg.to_string())
}

/// Creates a new IO error
pub fn io_error(msg: &str) -> Error {
    Error::IoError(msg.to_string())
}

/// Creates a new unsupported operation error
pub fn unsupported(msg: &str) -> Error {
    Error::Unsupported(msg.to_string())
}

/// Creates a new temporary failure error
pub fn temporary_failure(msg: &str) -> Error {
    Error::TemporaryFailure(msg.to_string())
}

/// Creates a new invalid argument error
pub fn invalid_argument(msg: &str) -> Error {
    Error::InvalidArgument(msg.to_string())
}

/// Block layer completion status
///
/// This is the status space seen by the submitter of a request. Errors raised
/// while preparing a request are folded into it with `BlkStatus::from`, and
/// statuses reported by the underlying device are carried through unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum BlkStatus {
    /// Request completed successfully
    #[default]
    Ok = 0,
    /// Operation not supported
    NotSupp = 1,
    /// Generic I/O error
    IoErr = 10,
    /// Resource shortage, the request may be retried
    Resource = 9,
    /// Request could not be issued right now
    Again = 12,
    /// Invalid request
    Inval = 13,
}

impl BlkStatus {
    /// Returns true for `BlkStatus::Ok`
    pub const fn is_ok(self) -> bool {
        matches!(self, BlkStatus::Ok)
    }

    /// Negative errno equivalent of the status
    pub const fn to_errno(self) -> i32 {
        match self {
            BlkStatus::Ok => 0,
            BlkStatus::NotSupp => -95,
            BlkStatus::IoErr => -5,
            BlkStatus::Resource => -12,
            BlkStatus::Again => -11,
            BlkStatus::Inval => -22,
        }
    }

    /// Status name as printed in log messages
    pub const fn as_str(self) -> &'static str {
        match self {
            BlkStatus::Ok => "ok",
            BlkStatus::NotSupp => "operation not supported",
            BlkStatus::IoErr => "I/O error",
            BlkStatus::Resource => "resource shortage",
            BlkStatus::Again => "try again",
            BlkStatus::Inval => "invalid",
        }
    }
}

impl fmt::Display for BlkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&Error> for BlkStatus {
    fn from(err: &Error) -> Self {
        match err {
            Error::OutOfMemory | Error::ResourceExhausted(_) => BlkStatus::Resource,
            Error::IoError(_) => BlkStatus::IoErr,
            Error::Unsupported(_) => BlkStatus::NotSupp,
            Error::TemporaryFailure(_) => BlkStatus::Again,
            Error::InvalidArgument(_) => BlkStatus::Inval,
        }
    }
}

impl From<Error> for BlkStatus {
    fn from(err: Error) -> Self {
        BlkStatus::from(&err)
    }
}
