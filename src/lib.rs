//! Decoder for FPP02 cape EEPROM images.
//!
//! A cape EEPROM (the identity chip on a BeagleBone-style add-on board)
//! holds a short identity header followed by a list of tagged sections.
//! Some sections carry files, optionally packed as 7z or tar archives, which
//! this crate writes next to the image and expands in place.
//!
//! # Example
//!
//! ```no_run
//! use cape_eeprom::{CapeDecoder, DecoderConfig};
//!
//! let decoder = CapeDecoder::new(DecoderConfig::default());
//!
//! // Never fails: a non-cape file gives an empty CapeInfo
//! let info = decoder.decode("capes/pihat.bin");
//! println!("{}", info);
//!
//! // Same work, plus the reason the decode stopped
//! let report = decoder.decode_report("capes/pihat.bin");
//! for diagnostic in &report.diagnostics {
//!     println!("{}", diagnostic);
//! }
//! ```
//!
//! # Image layout
//!
//! All numbers are ASCII decimal; a text field ends at its first NUL and is
//! space padded.
//!
//! | Field | Width |
//! |-------|-------|
//! | signature `FPP02` + 1 byte | 6 |
//! | name | 26 |
//! | version | 10 |
//! | serial number | 16 |
//! | sections... | |
//!
//! Each section is a 6-digit length (0 ends the list), a 2-digit flag, a
//! 64-byte relative path when the flag is below 50, and the body:
//!
//! | Flag | Section |
//! |------|---------|
//! | `0` | file, written verbatim |
//! | `1` | 7z archive, written then expanded |
//! | `2` | gzip tarball, written then expanded |
//! | `3` | bzip2 tarball, written then expanded |
//! | `96` | replacement serial number (16 bytes + 42 padding) |
//! | `97` | 12-byte sub-header + body, skipped |
//! | `98` | 2 bytes, skipped |
//! | `99` | 6-byte sub-header + body, skipped |
//! | other | body skipped |
//!
//! Files are written below `<image dir>/<image stem>/`, which is wiped at
//! the start of every decode.

pub mod config;
pub mod decoder;
pub mod eeprom;
pub mod error;
pub mod extract;
pub mod report;
pub mod sink;
pub mod types;
pub mod walker;

pub use config::DecoderConfig;
pub use decoder::CapeDecoder;
pub use error::{CapeError, Result};
pub use extract::{ArchiveKind, ExtractStatus};
pub use report::{DecodeOutcome, DecodeReport, Diagnostic, WalkEnd};
pub use sink::{FsSink, MemorySink, PayloadSink};
pub use types::{CapeInfo, SectionKind};

use eeprom::EepromReader;

/// Reads only the identity header of an image, without touching the disk.
///
/// Returns `None` if `data` does not start with the FPP02 signature.
///
/// # Example
///
/// ```no_run
/// let data = std::fs::read("capes/pihat.bin")?;
/// if let Some(info) = cape_eeprom::read_header(&data) {
///     println!("{} v{} serial {}", info.name, info.version, info.serial_number);
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn read_header(data: &[u8]) -> Option<CapeInfo> {
    EepromReader::new(data).read_header()
}
