//! Facepack container format
//!
//! Byte-level codec for the watch-face container: a fixed magic tag, a
//! format version, the project name and an ordered list of
//! length-prefixed `(type, payload)` records. All integers are u32
//! little-endian; strings are length-prefixed UTF-8 without terminator.

pub mod container;
pub mod error;

pub use container::{Container, Record};
pub use error::FormatError;

/// Leading tag of every container.
pub const MAGIC: [u8; 4] = *b"FACE";

/// Container format version written by this implementation.
pub const FORMAT_VERSION: u32 = 1;

/// Byte width of every length and count field.
pub const LENGTH_WIDTH: usize = 4;
