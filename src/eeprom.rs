//! FPP02 cape EEPROM binary layout reader.
//!
//! This module provides low-level access to the EEPROM image, including:
//! - Signature validation
//! - Fixed-width text fields (NUL terminated, space padded) with short-read
//!   tolerance
//! - Header (name, version, serial) decoding
//! - Section header decoding (length, flag, optional path)
//!
//! Every numeric field in the image is ASCII decimal, right-padded like the
//! text fields.

use crate::error::{CapeError, Result};
use crate::report::WalkEnd;
use crate::types::{CapeInfo, SectionHeader, SectionKind, PATH_FLAG_LIMIT};

/// Magic bytes at the start of every cape EEPROM.
pub const SIGNATURE: &[u8; 5] = b"FPP02";
/// The signature occupies 6 bytes; the last one is not checked.
pub const SIGNATURE_LEN: usize = 6;

pub const NAME_LEN: usize = 26;
pub const VERSION_LEN: usize = 10;
pub const SERIAL_LEN: usize = 16;

pub const LENGTH_FIELD_LEN: usize = 6;
pub const FLAG_FIELD_LEN: usize = 2;
pub const PATH_FIELD_LEN: usize = 64;

/// Trims a raw fixed-width field. The field ends at its first NUL; surrounding
/// whitespace is dropped from what remains.
pub fn trim_field(raw: &[u8]) -> String {
    let raw = &raw[..raw.iter().position(|&b| b == 0).unwrap_or(raw.len())];
    let end = raw.iter().rposition(|b| !b.is_ascii_whitespace()).map_or(0, |i| i + 1);
    let start = raw[..end].iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(end);
    String::from_utf8_lossy(&raw[start..end]).into_owned()
}

/// Result of reading one section header position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextSection {
    Header(SectionHeader),
    End(WalkEnd),
}

/// Cursor over an EEPROM image.
pub struct EepromReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> EepromReader<'a> {
    /// Creates a new reader positioned at the start of the image.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Returns true if the image starts with the FPP02 signature.
    pub fn is_valid(&self) -> bool {
        self.data.len() >= SIGNATURE_LEN && &self.data[..SIGNATURE.len()] == SIGNATURE
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_exhausted(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Takes up to `len` bytes. Past the end of the image only the bytes
    /// available are returned.
    pub fn take(&mut self, len: usize) -> &'a [u8] {
        let end = self.pos.saturating_add(len).min(self.data.len());
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        bytes
    }

    /// Advances the cursor by up to `len` bytes, returning how many were skipped.
    pub fn skip(&mut self, len: usize) -> usize {
        self.take(len).len()
    }

    /// Reads a fixed-width text field and trims its padding.
    pub fn read_string(&mut self, len: usize) -> String {
        trim_field(self.take(len))
    }

    /// Validates the signature and reads the identity fields.
    ///
    /// Returns `None` when the image is not a cape EEPROM; the cursor is then
    /// left untouched.
    pub fn read_header(&mut self) -> Option<CapeInfo> {
        if !self.is_valid() {
            return None;
        }

        self.pos = SIGNATURE_LEN;
        let name = self.read_string(NAME_LEN);
        let version = self.read_string(VERSION_LEN);
        let serial_number = self.read_string(SERIAL_LEN);

        Some(CapeInfo {
            name,
            version,
            serial_number,
            folder: None,
        })
    }

    fn read_number(&mut self, field: &'static str, len: usize) -> Result<usize> {
        let offset = self.pos;
        let raw = self.read_string(len);
        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CapeError::InvalidNumber { field, offset, raw });
        }
        raw.parse::<usize>()
            .map_err(|_| CapeError::InvalidNumber { field, offset, raw })
    }

    /// Reads the next section header.
    ///
    /// A zero length field ends the walk, as does running out of input
    /// exactly at a section boundary.
    pub fn next_section(&mut self) -> Result<NextSection> {
        if self.is_exhausted() {
            return Ok(NextSection::End(WalkEnd::EndOfStream));
        }

        let offset = self.pos;
        let length = self.read_number("length", LENGTH_FIELD_LEN)?;
        if length == 0 {
            return Ok(NextSection::End(WalkEnd::Terminator));
        }

        if self.is_exhausted() {
            return Err(CapeError::Truncated {
                field: "flag",
                offset: self.pos,
            });
        }
        // Two decimal digits always fit in a u8.
        let flag = self.read_number("flag", FLAG_FIELD_LEN)? as u8;

        let path = if flag < PATH_FLAG_LIMIT {
            Some(self.read_string(PATH_FIELD_LEN))
        } else {
            None
        };

        Ok(NextSection::Header(SectionHeader {
            offset,
            length,
            kind: SectionKind::from_flag(flag),
            path,
        }))
    }
}
