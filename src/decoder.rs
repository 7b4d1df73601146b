//! Decode entry point: source file in, `CapeInfo` and extracted files out.
//!
//! A decode runs in three steps:
//! 1. Read and validate the header (nothing touches the disk on mismatch)
//! 2. Wipe and recreate the per-EEPROM output directory
//! 3. Walk the sections into the output directory
//!
//! Failures at any step end the decode with whatever was gathered so far.

use crate::config::DecoderConfig;
use crate::eeprom::{EepromReader, SIGNATURE_LEN};
use crate::error::Result;
use crate::report::{DecodeOutcome, DecodeReport};
use crate::sink::{FsSink, PayloadSink};
use crate::types::CapeInfo;
use crate::walker::{SectionWalker, WalkState};
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;
use tracing::{info, warn};

/// Decodes cape EEPROM images.
#[derive(Debug, Clone, Default)]
pub struct CapeDecoder {
    config: DecoderConfig,
}

impl CapeDecoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Decodes the EEPROM at `source`, extracting its payloads next to it.
    ///
    /// Never fails. A file that is not a cape EEPROM yields the default
    /// [`CapeInfo`]; a decode that stops early yields the fields read before
    /// the failure. Use [`decode_report`](Self::decode_report) to find out
    /// which of these happened.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use cape_eeprom::CapeDecoder;
    ///
    /// let info = CapeDecoder::default().decode("pihat.bin");
    /// if let Some(folder) = info.folder() {
    ///     println!("{} extracted to {}", info, folder.display());
    /// }
    /// ```
    pub fn decode<P: AsRef<Path>>(&self, source: P) -> CapeInfo {
        self.decode_report(source).info
    }

    /// Decodes the EEPROM at `source` and reports why the decode stopped.
    pub fn decode_report<P: AsRef<Path>>(&self, source: P) -> DecodeReport {
        let source = source.as_ref();
        let out_dir = self.config.output_dir_for(source);

        let report = match map_source(source) {
            Ok(Some(mmap)) => self.decode_with(&mmap[..], &out_dir, &mut FsSink::new(&self.config)),
            Ok(None) => DecodeReport::not_a_cape(),
            Err(e) => DecodeReport::failed(CapeInfo::default(), e),
        };

        log_report(source, &report);
        report
    }

    /// Decodes an in-memory image into `out_dir`.
    pub fn decode_bytes(&self, data: &[u8], out_dir: &Path) -> DecodeReport {
        self.decode_with(data, out_dir, &mut FsSink::new(&self.config))
    }

    /// Decodes an in-memory image through any sink.
    pub fn decode_with<S: PayloadSink + ?Sized>(
        &self,
        data: &[u8],
        out_dir: &Path,
        sink: &mut S,
    ) -> DecodeReport {
        let mut reader = EepromReader::new(data);
        let Some(mut info) = reader.read_header() else {
            return DecodeReport::not_a_cape();
        };

        if let Err(e) = sink.prepare(out_dir) {
            return DecodeReport::failed(info, e);
        }

        let mut state = WalkState::default();
        let result = SectionWalker::new(&self.config, out_dir).walk(&mut reader, sink, &mut state);
        state.apply(&mut info);

        let outcome = match result {
            Ok(end) => DecodeOutcome::Complete(end),
            Err(e) => DecodeOutcome::Partial(e),
        };

        DecodeReport {
            info,
            outcome,
            sections: state.sections,
            diagnostics: state.diagnostics,
        }
    }
}

/// Maps the source file. Files too short to hold a signature are not mapped.
fn map_source(path: &Path) -> Result<Option<Mmap>> {
    let file = File::open(path)?;
    if file.metadata()?.len() < SIGNATURE_LEN as u64 {
        return Ok(None);
    }
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(Some(mmap))
}

fn log_report(source: &Path, report: &DecodeReport) {
    match &report.outcome {
        DecodeOutcome::NotACape => {
            info!(source = %source.display(), "no cape signature found");
        }
        DecodeOutcome::Complete(_) => {
            info!(
                source = %source.display(),
                cape = %report.info,
                folder = ?report.info.folder,
                "decoded cape EEPROM"
            );
        }
        DecodeOutcome::Partial(err) => {
            warn!(
                source = %source.display(),
                cape = %report.info,
                error = %err,
                "cape EEPROM decode stopped early"
            );
        }
    }
}
