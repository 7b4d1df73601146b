//! Error types for the cape EEPROM decoder.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for decoder operations.
pub type Result<T> = std::result::Result<T, CapeError>;

/// Errors that stop a decode part-way through.
///
/// None of these escape [`CapeDecoder::decode`](crate::CapeDecoder::decode);
/// they are surfaced through [`DecodeOutcome::Partial`](crate::DecodeOutcome::Partial).
#[derive(Error, Debug)]
pub enum CapeError {
    /// I/O error while reading the source or writing a payload
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A decimal length or flag field did not parse
    #[error("Invalid {field} field at offset {offset}: {raw:?}")]
    InvalidNumber {
        field: &'static str,
        offset: usize,
        raw: String,
    },

    /// A buffered section declared more bytes than the scratch bound allows
    #[error("Section at offset {offset} declares {length} bytes, limit is {max}")]
    SectionTooLarge {
        offset: usize,
        length: usize,
        max: usize,
    },

    /// A section is shorter than the fixed sub-fields its flag requires
    #[error("Section flag {flag} needs at least {min} bytes, declared {length}")]
    InvalidSectionLength { flag: u8, length: usize, min: usize },

    /// Declared length disagrees with the fixed size of the flag (strict mode)
    #[error("Section flag {flag} declares {length} bytes, expected {expected}")]
    LengthMismatch {
        flag: u8,
        length: usize,
        expected: usize,
    },

    /// Path field would land outside the output directory
    #[error("Invalid section path {path:?}: {reason}")]
    InvalidPath { path: PathBuf, reason: &'static str },

    /// Source ended inside a section header
    #[error("Source truncated at offset {offset} while reading {field}")]
    Truncated { field: &'static str, offset: usize },
}
