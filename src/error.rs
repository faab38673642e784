//! Error types for avclip

use thiserror::Error;

/// Result type alias for avclip operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for avclip operations
///
/// Every variant is fatal to the pipeline that raised it. The expected
/// encoder states "try again" and "end of stream" are not errors; they are
/// reported through [`crate::codec::Received`].
#[derive(Error, Debug)]
pub enum Error {
    /// Option incompatible with the codec, bad time base, or codec/media type mismatch
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Buffer or context allocation failure
    #[error("Allocation error: {0}")]
    Allocation(String),

    /// Send/receive/open/parameter-copy failure reported by an encoder
    #[error("Codec error: {0}")]
    Codec(String),

    /// Header/trailer/packet write failure, or container used out of order
    #[error("Container error: {0}")]
    Container(String),

    /// Invalid input parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Codec is not available on this system
    #[error("Codec unavailable: {0}")]
    CodecUnavailable(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error code for FFI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub enum ErrorCode {
    /// Success
    Ok = 0,
    /// Invalid input parameter
    InvalidInput = 1,
    /// Codec not available
    CodecUnavailable = 2,
    /// Incompatible configuration
    Configuration = 3,
    /// I/O error
    IoError = 4,
    /// Encoding error
    EncodeError = 5,
    /// Container error
    ContainerError = 6,
    /// Allocation failure
    AllocationError = 7,
}

impl From<&Error> for ErrorCode {
    fn from(err: &Error) -> Self {
        match err {
            Error::Configuration(_) => ErrorCode::Configuration,
            Error::Allocation(_) => ErrorCode::AllocationError,
            Error::Codec(_) => ErrorCode::EncodeError,
            Error::Container(_) => ErrorCode::ContainerError,
            Error::InvalidInput(_) => ErrorCode::InvalidInput,
            Error::CodecUnavailable(_) => ErrorCode::CodecUnavailable,
            Error::Io(_) => ErrorCode::IoError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Configuration("Sample rate not supported".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: Sample rate not supported"
        );
    }

    #[test]
    fn test_error_code_mapping() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert_eq!(ErrorCode::from(&Error::from(io)), ErrorCode::IoError);
        assert_eq!(
            ErrorCode::from(&Error::Container("late stream".to_string())),
            ErrorCode::ContainerError
        );
    }
}
