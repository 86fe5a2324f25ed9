//! Error types for the container codec.

use thiserror::Error;

/// Errors raised while encoding or decoding a container.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    /// The input does not start with the container magic.
    #[error("bad magic: expected {expected:?}, found {found:?}")]
    BadMagic { expected: [u8; 4], found: Vec<u8> },

    /// The container declares a version this reader does not understand.
    #[error("unsupported container version {0}")]
    UnsupportedVersion(u32),

    /// A field extends past the end of the input.
    #[error("truncated {field} at offset {offset}: need {needed} bytes, {remaining} remaining")]
    Truncated {
        field: &'static str,
        offset: usize,
        needed: usize,
        remaining: usize,
    },

    /// A string field is not valid UTF-8.
    #[error("{field} at offset {offset} is not valid UTF-8")]
    InvalidUtf8 { field: &'static str, offset: usize },

    /// Bytes remain after the last declared record.
    #[error("{0} trailing bytes after last record")]
    TrailingBytes(usize),

    /// A blob is too large for its u32 length prefix.
    #[error("{field} length {len} does not fit in a u32 length prefix")]
    LengthOverflow { field: &'static str, len: usize },
}
