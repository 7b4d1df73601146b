//! Core data types for cape EEPROM decoding.
//!
//! This module provides:
//! - `CapeInfo`: identity and extraction result of a decoded cape
//! - `SectionKind`: mapping from the 2-digit wire flag to section semantics
//! - `SectionHeader`: a parsed section header as seen by the walker

use crate::extract::ArchiveKind;
use std::fmt;
use std::path::{Path, PathBuf};

/// Identity of a cape plus the directory its payloads were written to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapeInfo {
    pub name: String,
    pub version: String,
    pub serial_number: String,
    /// Directory of the last data-bearing section, if any was written.
    pub folder: Option<PathBuf>,
}

impl CapeInfo {
    /// Returns true if nothing was recognized (the all-default value).
    pub fn is_empty(&self) -> bool {
        self == &CapeInfo::default()
    }

    /// Directory holding the extracted cape files, if any.
    pub fn folder(&self) -> Option<&Path> {
        self.folder.as_deref()
    }
}

impl fmt::Display for CapeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "<no cape>");
        }
        write!(f, "{} {}", self.name, self.version)?;
        if !self.serial_number.is_empty() {
            write!(f, " ({})", self.serial_number)?;
        }
        Ok(())
    }
}

/// Section semantics selected by the 2-digit flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    /// 0: payload written verbatim
    RawFile,
    /// 1: payload written, then expanded with 7z
    SevenZip,
    /// 2: payload written, then expanded with tar (gzip)
    GzipTarball,
    /// 3: payload written, then expanded with tar (bzip2)
    Bzip2Tarball,
    /// 96: replaces the header serial number
    SerialOverride,
    /// 97: 12-byte sub-header plus opaque body
    Subfields,
    /// 98: fixed 2-byte body
    ShortSkip,
    /// 99: 6-byte sub-header plus opaque body
    Mixed,
    Unknown(u8),
}

/// Flags below this value carry a 64-byte path field.
pub const PATH_FLAG_LIMIT: u8 = 50;

impl SectionKind {
    pub fn from_flag(flag: u8) -> Self {
        match flag {
            0 => SectionKind::RawFile,
            1 => SectionKind::SevenZip,
            2 => SectionKind::GzipTarball,
            3 => SectionKind::Bzip2Tarball,
            96 => SectionKind::SerialOverride,
            97 => SectionKind::Subfields,
            98 => SectionKind::ShortSkip,
            99 => SectionKind::Mixed,
            other => SectionKind::Unknown(other),
        }
    }

    pub fn flag(&self) -> u8 {
        match self {
            SectionKind::RawFile => 0,
            SectionKind::SevenZip => 1,
            SectionKind::GzipTarball => 2,
            SectionKind::Bzip2Tarball => 3,
            SectionKind::SerialOverride => 96,
            SectionKind::Subfields => 97,
            SectionKind::ShortSkip => 98,
            SectionKind::Mixed => 99,
            SectionKind::Unknown(flag) => *flag,
        }
    }

    /// Returns true if the section payload is materialized on disk.
    pub fn is_data_bearing(&self) -> bool {
        matches!(
            self,
            SectionKind::RawFile
                | SectionKind::SevenZip
                | SectionKind::GzipTarball
                | SectionKind::Bzip2Tarball
        )
    }

    /// Archive format to expand after writing, if any.
    pub fn archive(&self) -> Option<ArchiveKind> {
        match self {
            SectionKind::SevenZip => Some(ArchiveKind::SevenZip),
            SectionKind::GzipTarball => Some(ArchiveKind::TarGz),
            SectionKind::Bzip2Tarball => Some(ArchiveKind::TarBz2),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SectionKind::RawFile => "raw file",
            SectionKind::SevenZip => "7z archive",
            SectionKind::GzipTarball => "gzip tarball",
            SectionKind::Bzip2Tarball => "bzip2 tarball",
            SectionKind::SerialOverride => "serial override",
            SectionKind::Subfields => "skip-with-subfields",
            SectionKind::ShortSkip => "short skip",
            SectionKind::Mixed => "mixed skip",
            SectionKind::Unknown(_) => "unknown",
        }
    }
}

/// A section header read from the EEPROM body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHeader {
    /// Offset of the length field within the source.
    pub offset: usize,
    pub length: usize,
    pub kind: SectionKind,
    /// Trimmed path field, present for flags below 50.
    pub path: Option<String>,
}
