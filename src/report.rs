//! Decode outcome and diagnostic log.
//!
//! [`CapeDecoder::decode`](crate::CapeDecoder::decode) only returns the
//! accumulated [`CapeInfo`]; the types here say why a decode stopped and
//! what happened to each section on the way.

use crate::error::CapeError;
use crate::extract::{ArchiveKind, ExtractStatus};
use crate::types::{CapeInfo, SectionHeader, SectionKind};
use std::fmt;
use std::path::PathBuf;

/// How a section walk ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkEnd {
    /// A record with length 0
    Terminator,
    /// Input ran out at a section boundary
    EndOfStream,
}

/// Why a decode stopped.
#[derive(Debug)]
pub enum DecodeOutcome {
    /// Source is not an FPP02 image; nothing was read or written.
    NotACape,
    /// Every section was processed.
    Complete(WalkEnd),
    /// Decoding stopped early; `CapeInfo` holds what was gathered before.
    Partial(CapeError),
}

impl DecodeOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, DecodeOutcome::Complete(_))
    }

    pub fn error(&self) -> Option<&CapeError> {
        match self {
            DecodeOutcome::Partial(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for DecodeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeOutcome::NotACape => write!(f, "not a cape EEPROM"),
            DecodeOutcome::Complete(WalkEnd::Terminator) => write!(f, "complete"),
            DecodeOutcome::Complete(WalkEnd::EndOfStream) => {
                write!(f, "complete (no terminator record)")
            }
            DecodeOutcome::Partial(err) => write!(f, "stopped early: {}", err),
        }
    }
}

/// One event recorded while walking sections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A payload was written to disk
    PayloadWritten { path: PathBuf, bytes: usize },
    /// An archive payload was handed to the external extractor
    ArchiveExpanded {
        kind: ArchiveKind,
        archive: PathBuf,
        status: ExtractStatus,
    },
    /// Flag 96 replaced the serial number
    SerialOverridden { serial: String },
    /// A section was consumed without being interpreted
    SectionSkipped {
        offset: usize,
        kind: SectionKind,
        bytes: usize,
    },
    /// Source ended inside a payload or skip
    TruncatedPayload {
        offset: usize,
        expected: usize,
        actual: usize,
    },
    /// Flag 98 declared a length other than its fixed size
    ShortSkipLengthIgnored { offset: usize, declared: usize },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::PayloadWritten { path, bytes } => {
                write!(f, "wrote {} ({} bytes)", path.display(), bytes)
            }
            Diagnostic::ArchiveExpanded {
                kind,
                archive,
                status,
            } => write!(f, "{} {}: {}", kind.tool(), archive.display(), status),
            Diagnostic::SerialOverridden { serial } => {
                write!(f, "serial number overridden: {}", serial)
            }
            Diagnostic::SectionSkipped {
                offset,
                kind,
                bytes,
            } => write!(
                f,
                "skipped {} section (flag {}) at {:#x}, {} bytes",
                kind.name(),
                kind.flag(),
                offset,
                bytes
            ),
            Diagnostic::TruncatedPayload {
                offset,
                expected,
                actual,
            } => write!(
                f,
                "section at {:#x} truncated: expected {} bytes, got {}",
                offset, expected, actual
            ),
            Diagnostic::ShortSkipLengthIgnored { offset, declared } => write!(
                f,
                "flag 98 section at {:#x} declares {} bytes, consumed 2",
                offset, declared
            ),
        }
    }
}

/// Full result of a decode.
#[derive(Debug)]
pub struct DecodeReport {
    pub info: CapeInfo,
    pub outcome: DecodeOutcome,
    /// Every section dispatched before the walk ended.
    pub sections: Vec<SectionHeader>,
    pub diagnostics: Vec<Diagnostic>,
}

impl DecodeReport {
    pub(crate) fn not_a_cape() -> Self {
        Self {
            info: CapeInfo::default(),
            outcome: DecodeOutcome::NotACape,
            sections: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    pub(crate) fn failed(info: CapeInfo, err: CapeError) -> Self {
        Self {
            info,
            outcome: DecodeOutcome::Partial(err),
            sections: Vec::new(),
            diagnostics: Vec::new(),
        }
    }
}
