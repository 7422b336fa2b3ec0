//! # Index Error Types
//!
//! All errors that can occur while tracking or persisting blocks.

use thiserror::Error;

/// Errors that can occur in the tracking store.
#[derive(Error, Debug)]
pub enum IndexError {
    /// Underlying file I/O failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The persistent file does not start with the expected magic bytes.
    #[error("bad magic: expected {expected:?}, found {found:?}")]
    BadMagic {
        /// Magic bytes this build writes.
        expected: [u8; 4],
        /// Magic bytes found in the file.
        found: [u8; 4],
    },

    /// The persistent file was written by an unknown format version.
    #[error("unsupported format version {0}")]
    UnsupportedVersion(u32),

    /// The file ended in the middle of a record.
    #[error("truncated file: {0}")]
    Truncated(String),

    /// A block descriptor string could not be parsed.
    #[error("invalid block descriptor {descriptor:?}: {reason}")]
    InvalidDescriptor {
        /// The offending descriptor.
        descriptor: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The legacy text store could not be parsed at all.
    #[error("legacy store unreadable: {0}")]
    LegacyFormat(#[from] toml::de::Error),

    /// A chunk uses more distinct appearances than the format can index.
    #[error("chunk palette overflow: {0} distinct appearances")]
    PaletteOverflow(usize),
}

/// Result type for index operations.
pub type IndexResult<T> = Result<T, IndexError>;

impl IndexError {
    /// Maps an unexpected end of file to [`IndexError::Truncated`].
    pub(crate) fn from_read(err: std::io::Error, context: &str) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            Self::Truncated(context.to_string())
        } else {
            Self::Io(err)
        }
    }
}
