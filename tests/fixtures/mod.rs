//! Test fixtures for integration tests
//!
//! Builds cape EEPROM images section by section and places them in scratch
//! directories.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const NAME_LEN: usize = 26;
pub const VERSION_LEN: usize = 10;
pub const SERIAL_LEN: usize = 16;
pub const PATH_LEN: usize = 64;

/// Pads `text` with NULs to `width` bytes.
pub fn padded(text: &str, width: usize) -> Vec<u8> {
    let mut field = text.as_bytes().to_vec();
    field.resize(width, 0);
    field
}

/// Builder for FPP02 images.
#[derive(Debug, Clone)]
pub struct CapeImage {
    data: Vec<u8>,
}

impl CapeImage {
    /// Starts an image with the signature and identity header.
    pub fn new(name: &str, version: &str, serial: &str) -> Self {
        let mut data = b"FPP02\0".to_vec();
        data.extend(padded(name, NAME_LEN));
        data.extend(padded(version, VERSION_LEN));
        data.extend(padded(serial, SERIAL_LEN));
        Self { data }
    }

    /// Appends a section with an explicit declared length.
    pub fn raw_section(
        mut self,
        length: usize,
        flag: u8,
        path: Option<&str>,
        body: &[u8],
    ) -> Self {
        self.data
            .extend_from_slice(format!("{:06}{:02}", length, flag).as_bytes());
        if let Some(path) = path {
            self.data.extend(padded(path, PATH_LEN));
        }
        self.data.extend_from_slice(body);
        self
    }

    /// Appends a data-bearing section (flags 0..3).
    pub fn file(self, flag: u8, path: &str, body: &[u8]) -> Self {
        self.raw_section(body.len(), flag, Some(path), body)
    }

    /// Appends a flag-96 serial override.
    pub fn serial_override(self, serial: &str) -> Self {
        let mut body = padded(serial, SERIAL_LEN);
        body.extend(vec![0u8; 42]);
        self.raw_section(body.len(), 96, None, &body)
    }

    /// Appends raw bytes (e.g. a broken length field).
    pub fn bytes(mut self, bytes: &[u8]) -> Self {
        self.data.extend_from_slice(bytes);
        self
    }

    /// Appends the zero-length terminator record.
    pub fn terminate(self) -> Self {
        self.bytes(b"000000")
    }

    pub fn build(self) -> Vec<u8> {
        self.data
    }
}

/// A scratch directory holding one EEPROM image.
pub struct Scratch {
    pub dir: TempDir,
    pub image: PathBuf,
}

impl Scratch {
    /// Writes `data` to `<tmp>/<file_name>`.
    pub fn with_image(file_name: &str, data: &[u8]) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let image = dir.path().join(file_name);
        std::fs::write(&image, data).expect("write image");
        Self { dir, image }
    }

    /// Directory the decoder extracts into: `<tmp>/<stem>`.
    pub fn out_dir(&self) -> PathBuf {
        let stem = self.image.file_stem().expect("image has a stem");
        self.dir.path().join(stem)
    }

    /// All entries under the scratch dir except the image itself, sorted.
    pub fn tree(&self) -> Vec<PathBuf> {
        let mut entries = Vec::new();
        collect(self.dir.path(), self.dir.path(), &mut entries);
        entries.retain(|p| p != Path::new(self.image.file_name().unwrap()));
        entries.sort();
        entries
    }
}

fn collect(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) {
    for entry in std::fs::read_dir(dir).expect("read dir") {
        let path = entry.expect("dir entry").path();
        out.push(path.strip_prefix(root).unwrap().to_path_buf());
        if path.is_dir() {
            collect(root, &path, out);
        }
    }
}
