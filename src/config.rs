//! Decoder configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Largest buffered section the decoder accepts (32 KiB, the largest EEPROM
/// supported).
pub const DEFAULT_MAX_SECTION_LEN: usize = 32 * 1024;

pub const DEFAULT_EXTRACT_TIMEOUT: Duration = Duration::from_secs(60);

/// Settings for a [`CapeDecoder`](crate::CapeDecoder).
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Directory under which `<stem>/` is created. Defaults to the directory
    /// containing the source file.
    pub output_root: Option<PathBuf>,
    pub max_section_len: usize,
    /// Run the external tools for archive sections.
    pub extract_archives: bool,
    pub extract_timeout: Duration,
    pub seven_zip_program: PathBuf,
    pub tar_program: PathBuf,
    /// Reject flag-98 sections whose declared length is not 2.
    pub strict_short_skip: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            output_root: None,
            max_section_len: DEFAULT_MAX_SECTION_LEN,
            extract_archives: true,
            extract_timeout: DEFAULT_EXTRACT_TIMEOUT,
            seven_zip_program: PathBuf::from("7z"),
            tar_program: PathBuf::from("tar"),
            strict_short_skip: false,
        }
    }
}

impl DecoderConfig {
    pub fn with_output_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.output_root = Some(root.into());
        self
    }

    pub fn with_max_section_len(mut self, len: usize) -> Self {
        self.max_section_len = len;
        self
    }

    pub fn with_extract_archives(mut self, extract: bool) -> Self {
        self.extract_archives = extract;
        self
    }

    pub fn with_extract_timeout(mut self, timeout: Duration) -> Self {
        self.extract_timeout = timeout;
        self
    }

    pub fn with_seven_zip_program<P: Into<PathBuf>>(mut self, program: P) -> Self {
        self.seven_zip_program = program.into();
        self
    }

    pub fn with_tar_program<P: Into<PathBuf>>(mut self, program: P) -> Self {
        self.tar_program = program.into();
        self
    }

    pub fn with_strict_short_skip(mut self, strict: bool) -> Self {
        self.strict_short_skip = strict;
        self
    }

    /// Output directory for a source image: `<root>/<stem>`, where root is
    /// the configured output root or the source's own directory.
    pub fn output_dir_for(&self, source: &Path) -> PathBuf {
        let stem = source
            .file_stem()
            .map(|s| s.to_os_string())
            .unwrap_or_else(|| "eeprom".into());
        let root = match &self.output_root {
            Some(root) => root.clone(),
            None => source
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
        };
        root.join(stem)
    }
}
