use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

/// Boxed failure reported by an underlying decoding library
pub type NativeError = Box<dyn StdError + Send + Sync + 'static>;

/// Domain code attached to every [`LoaderError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    NoFiles = 1,
    UnsupportedFormat = 2,
    Native = 3,
    Unavailable = 4,
    Cancelled = 5,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::NoFiles => "no-files",
            ErrorCode::UnsupportedFormat => "unsupported-format",
            ErrorCode::Native => "native",
            ErrorCode::Unavailable => "unavailable",
            ErrorCode::Cancelled => "cancelled",
        };
        write!(f, "{name} ({})", *self as i32)
    }
}

/// Failure of a whole series load. Every variant is terminal for the call.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("No slice sources found")]
    NoFiles,

    #[error("Unsupported format: {reason}")]
    UnsupportedFormat { reason: String },

    #[error("Native decoder failure: {source}")]
    Native {
        #[source]
        source: NativeError,
    },

    #[error("Decoding unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Series load was cancelled")]
    Cancelled,
}

impl LoaderError {
    pub fn code(&self) -> ErrorCode {
        match self {
            LoaderError::NoFiles => ErrorCode::NoFiles,
            LoaderError::UnsupportedFormat { .. } => ErrorCode::UnsupportedFormat,
            LoaderError::Native { .. } => ErrorCode::Native,
            LoaderError::Unavailable { .. } => ErrorCode::Unavailable,
            LoaderError::Cancelled => ErrorCode::Cancelled,
        }
    }

    pub(crate) fn unsupported(reason: impl Into<String>) -> Self {
        LoaderError::UnsupportedFormat {
            reason: reason.into(),
        }
    }
}

/// Result contract of a single [`SliceDecoder`](crate::decoder::SliceDecoder) call
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The input is not a well-formed slice
    #[error("Malformed slice: {reason}")]
    Malformed { reason: String },

    /// Well-formed, but pixel format or geometry is not supported
    #[error("Unsupported slice: {reason}")]
    Unsupported { reason: String },

    /// The underlying codec library failed
    #[error("Decoder error: {0}")]
    Native(#[source] NativeError),

    /// A required codec or resource is not available here
    #[error("Decoder unavailable: {reason}")]
    Unavailable { reason: String },
}

impl DecodeError {
    pub fn native(error: impl Into<NativeError>) -> Self {
        DecodeError::Native(error.into())
    }

    pub fn unsupported(reason: impl Into<String>) -> Self {
        DecodeError::Unsupported {
            reason: reason.into(),
        }
    }
}

impl From<DecodeError> for LoaderError {
    fn from(error: DecodeError) -> Self {
        match error {
            DecodeError::Malformed { reason } | DecodeError::Unsupported { reason } => {
                LoaderError::UnsupportedFormat { reason }
            }
            DecodeError::Native(source) => LoaderError::Native { source },
            DecodeError::Unavailable { reason } => LoaderError::Unavailable { reason },
        }
    }
}
