//! Payload sinks: where data-bearing sections end up.
//!
//! The section walker only talks to a [`PayloadSink`]. [`FsSink`] writes to
//! the real filesystem and runs archive tools; [`MemorySink`] keeps
//! everything in memory for dry runs.

use crate::config::DecoderConfig;
use crate::error::Result;
use crate::extract::{ArchiveKind, ExtractStatus, Extractor};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Destination for section payloads.
pub trait PayloadSink {
    /// Removes any previous extraction under `out_dir` and recreates it empty.
    fn prepare(&mut self, out_dir: &Path) -> Result<()>;

    /// Writes `data` to `path`, creating parent directories as needed.
    fn write(&mut self, path: &Path, data: &[u8]) -> Result<()>;

    /// Expands an archive written by [`write`](Self::write) into `dir`.
    /// Failures are reported, never raised.
    fn expand(&mut self, kind: ArchiveKind, archive: &Path, dir: &Path) -> ExtractStatus;
}

/// Filesystem sink.
#[derive(Debug, Clone)]
pub struct FsSink {
    extractor: Extractor,
}

impl FsSink {
    pub fn new(config: &DecoderConfig) -> Self {
        Self {
            extractor: Extractor::new(config),
        }
    }
}

impl PayloadSink for FsSink {
    fn prepare(&mut self, out_dir: &Path) -> Result<()> {
        match fs::remove_dir_all(out_dir) {
            Ok(()) => debug!(dir = %out_dir.display(), "removed previous extraction"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        fs::create_dir_all(out_dir)?;
        Ok(())
    }

    fn write(&mut self, path: &Path, data: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out_file = File::create(path)?;
        out_file.write_all(data)?;
        out_file.flush()?;
        info!(path = %path.display(), bytes = data.len(), "wrote section payload");
        Ok(())
    }

    fn expand(&mut self, kind: ArchiveKind, archive: &Path, dir: &Path) -> ExtractStatus {
        self.extractor.expand(kind, archive, dir)
    }
}

/// A payload captured by [`MemorySink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFile {
    pub path: PathBuf,
    pub data: Vec<u8>,
}

/// In-memory sink. Nothing touches the filesystem.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub prepared: Vec<PathBuf>,
    pub files: Vec<CapturedFile>,
    pub archives: Vec<(ArchiveKind, PathBuf)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the most recent payload written to `path`.
    pub fn file(&self, path: &Path) -> Option<&[u8]> {
        self.files
            .iter()
            .rev()
            .find(|f| f.path == path)
            .map(|f| f.data.as_slice())
    }
}

impl PayloadSink for MemorySink {
    fn prepare(&mut self, out_dir: &Path) -> Result<()> {
        self.prepared.push(out_dir.to_path_buf());
        self.files.retain(|f| !f.path.starts_with(out_dir));
        Ok(())
    }

    fn write(&mut self, path: &Path, data: &[u8]) -> Result<()> {
        self.files.push(CapturedFile {
            path: path.to_path_buf(),
            data: data.to_vec(),
        });
        Ok(())
    }

    fn expand(&mut self, kind: ArchiveKind, archive: &Path, _dir: &Path) -> ExtractStatus {
        self.archives.push((kind, archive.to_path_buf()));
        ExtractStatus::Skipped
    }
}
