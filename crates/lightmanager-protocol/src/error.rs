//! Protocol error types.

use thiserror::Error;

/// Errors that can occur when building or decoding device frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A numeric or enumerated parameter lies outside its documented range.
    #[error("{field} parameter '{value}' out of range (must be within {range})")]
    OutOfRange {
        /// Parameter name as shown to the user (e.g. `<scene>`).
        field: &'static str,
        /// The rejected value as typed.
        value: String,
        /// Human readable accepted range.
        range: &'static str,
    },

    /// A keyword parameter was not recognized.
    #[error("unknown {field} parameter '{value}'")]
    UnknownKeyword {
        /// Parameter name as shown to the user.
        field: &'static str,
        /// The rejected token.
        value: String,
    },

    /// An FS20 address or housecode string is malformed.
    #[error("{0}: wrong FS20 code (use 1 to 4 pairs of digits 1-4, e.g. 1234)")]
    InvalidFs20Code(String),

    /// The device answered with a frame that cannot be interpreted.
    #[error("invalid reply frame: {0}")]
    InvalidReply(String),
}

impl ProtocolError {
    /// Create an out-of-range error.
    pub fn out_of_range(field: &'static str, value: impl Into<String>, range: &'static str) -> Self {
        ProtocolError::OutOfRange {
            field,
            value: value.into(),
            range,
        }
    }

    /// Create an unknown-keyword error.
    pub fn unknown_keyword(field: &'static str, value: impl Into<String>) -> Self {
        ProtocolError::UnknownKeyword {
            field,
            value: value.into(),
        }
    }

    /// Returns true if this error reports a value outside its valid range.
    pub fn is_out_of_range(&self) -> bool {
        matches!(self, ProtocolError::OutOfRange { .. })
    }
}

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
