//! Section walking and flag dispatch.
//!
//! The walker reads section headers until a zero-length record or the end
//! of the image and dispatches each one on its [`SectionKind`]. Everything it
//! learns goes into an explicit [`WalkState`], so a walk that fails half-way
//! still leaves the folder, serial override and diagnostics gathered so far.

use crate::config::DecoderConfig;
use crate::eeprom::{trim_field, EepromReader, NextSection, SERIAL_LEN};
use crate::error::{CapeError, Result};
use crate::report::{Diagnostic, WalkEnd};
use crate::sink::PayloadSink;
use crate::types::{CapeInfo, SectionHeader, SectionKind};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Bytes following the serial number in a flag-96 section.
const SERIAL_OVERRIDE_PADDING: usize = 42;
/// Fixed sub-header of a flag-97 section.
const SUBFIELDS_HEADER_LEN: usize = 12;
/// Fixed body of a flag-98 section.
const SHORT_SKIP_LEN: usize = 2;
/// Fixed sub-header of a flag-99 section.
const MIXED_HEADER_LEN: usize = 6;

/// State accumulated while walking sections.
#[derive(Debug, Default, Clone)]
pub struct WalkState {
    /// Directory of the last data-bearing section.
    pub folder: Option<PathBuf>,
    /// Serial number from the last flag-96 section.
    pub serial_number: Option<String>,
    /// Headers of every section dispatched so far.
    pub sections: Vec<SectionHeader>,
    pub diagnostics: Vec<Diagnostic>,
}

impl WalkState {
    /// Folds the folder and serial override into `info`.
    pub fn apply(&mut self, info: &mut CapeInfo) {
        if let Some(serial) = self.serial_number.take() {
            info.serial_number = serial;
        }
        if let Some(folder) = self.folder.take() {
            info.folder = Some(folder);
        }
    }
}

/// Walks the sections of one EEPROM into one output directory.
pub struct SectionWalker<'a> {
    config: &'a DecoderConfig,
    out_dir: &'a Path,
}

impl<'a> SectionWalker<'a> {
    pub fn new(config: &'a DecoderConfig, out_dir: &'a Path) -> Self {
        Self { config, out_dir }
    }

    /// Walks from the reader's position until the sections run out.
    pub fn walk<S: PayloadSink + ?Sized>(
        &self,
        reader: &mut EepromReader<'_>,
        sink: &mut S,
        state: &mut WalkState,
    ) -> Result<WalkEnd> {
        loop {
            let header = match reader.next_section()? {
                NextSection::Header(header) => header,
                NextSection::End(end) => {
                    debug!(?end, offset = reader.position(), "section walk finished");
                    return Ok(end);
                }
            };

            debug!(
                offset = header.offset,
                flag = header.kind.flag(),
                kind = header.kind.name(),
                length = header.length,
                path = header.path.as_deref().unwrap_or(""),
                "section"
            );

            self.dispatch(&header, reader, sink, state)?;
            state.sections.push(header);
        }
    }

    fn dispatch<S: PayloadSink + ?Sized>(
        &self,
        header: &SectionHeader,
        reader: &mut EepromReader<'_>,
        sink: &mut S,
        state: &mut WalkState,
    ) -> Result<()> {
        match header.kind {
            SectionKind::RawFile
            | SectionKind::SevenZip
            | SectionKind::GzipTarball
            | SectionKind::Bzip2Tarball => self.write_payload(header, reader, sink, state),
            SectionKind::SerialOverride => {
                let field = reader.take(SERIAL_LEN);
                if field.len() < SERIAL_LEN {
                    truncated(header, SERIAL_LEN + SERIAL_OVERRIDE_PADDING, field.len(), state);
                } else {
                    consume(reader, header, SERIAL_OVERRIDE_PADDING, state);
                }
                let serial = trim_field(field);
                debug!(serial = %serial, "serial number overridden");
                state.diagnostics.push(Diagnostic::SerialOverridden {
                    serial: serial.clone(),
                });
                state.serial_number = Some(serial);
                Ok(())
            }
            SectionKind::Subfields => {
                require_min_length(header, SUBFIELDS_HEADER_LEN)?;
                consume(reader, header, header.length, state);
                skipped(header, header.length, state);
                Ok(())
            }
            SectionKind::ShortSkip => {
                if header.length != SHORT_SKIP_LEN {
                    if self.config.strict_short_skip {
                        return Err(CapeError::LengthMismatch {
                            flag: header.kind.flag(),
                            length: header.length,
                            expected: SHORT_SKIP_LEN,
                        });
                    }
                    state.diagnostics.push(Diagnostic::ShortSkipLengthIgnored {
                        offset: header.offset,
                        declared: header.length,
                    });
                }
                consume(reader, header, SHORT_SKIP_LEN, state);
                skipped(header, SHORT_SKIP_LEN, state);
                Ok(())
            }
            SectionKind::Mixed => {
                require_min_length(header, MIXED_HEADER_LEN)?;
                self.check_buffered_len(header)?;
                consume(reader, header, header.length, state);
                skipped(header, header.length, state);
                Ok(())
            }
            SectionKind::Unknown(_) => {
                consume(reader, header, header.length, state);
                skipped(header, header.length, state);
                Ok(())
            }
        }
    }

    fn write_payload<S: PayloadSink + ?Sized>(
        &self,
        header: &SectionHeader,
        reader: &mut EepromReader<'_>,
        sink: &mut S,
        state: &mut WalkState,
    ) -> Result<()> {
        let dest = self.resolve(header.path.as_deref().unwrap_or(""))?;
        self.check_buffered_len(header)?;

        let data = reader.take(header.length);
        if data.len() < header.length {
            truncated(header, header.length, data.len(), state);
        }

        sink.write(&dest, data)?;
        let dir = dest
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.out_dir.to_path_buf());
        state.diagnostics.push(Diagnostic::PayloadWritten {
            path: dest.clone(),
            bytes: data.len(),
        });

        if let Some(kind) = header.kind.archive() {
            if self.config.extract_archives {
                let status = sink.expand(kind, &dest, &dir);
                state.diagnostics.push(Diagnostic::ArchiveExpanded {
                    kind,
                    archive: dest,
                    status,
                });
            }
        }

        state.folder = Some(dir);
        Ok(())
    }

    /// Joins a section path onto the output directory, refusing anything
    /// that would leave it.
    fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let path = Path::new(relative);
        if relative.is_empty() {
            return Err(CapeError::InvalidPath {
                path: path.to_path_buf(),
                reason: "empty path",
            });
        }
        for component in path.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                Component::ParentDir => {
                    return Err(CapeError::InvalidPath {
                        path: path.to_path_buf(),
                        reason: "parent directory component",
                    })
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(CapeError::InvalidPath {
                        path: path.to_path_buf(),
                        reason: "absolute path",
                    })
                }
            }
        }
        Ok(self.out_dir.join(path))
    }

    fn check_buffered_len(&self, header: &SectionHeader) -> Result<()> {
        if header.length > self.config.max_section_len {
            return Err(CapeError::SectionTooLarge {
                offset: header.offset,
                length: header.length,
                max: self.config.max_section_len,
            });
        }
        Ok(())
    }
}

fn require_min_length(header: &SectionHeader, min: usize) -> Result<()> {
    if header.length < min {
        return Err(CapeError::InvalidSectionLength {
            flag: header.kind.flag(),
            length: header.length,
            min,
        });
    }
    Ok(())
}

/// Skips `len` bytes, noting a truncation if the image ends first.
fn consume(
    reader: &mut EepromReader<'_>,
    header: &SectionHeader,
    len: usize,
    state: &mut WalkState,
) {
    let actual = reader.skip(len);
    if actual < len {
        truncated(header, len, actual, state);
    }
}

fn skipped(header: &SectionHeader, bytes: usize, state: &mut WalkState) {
    state.diagnostics.push(Diagnostic::SectionSkipped {
        offset: header.offset,
        kind: header.kind,
        bytes,
    });
}

fn truncated(header: &SectionHeader, expected: usize, actual: usize, state: &mut WalkState) {
    warn!(
        offset = header.offset,
        flag = header.kind.flag(),
        expected,
        actual,
        "section truncated"
    );
    state.diagnostics.push(Diagnostic::TruncatedPayload {
        offset: header.offset,
        expected,
        actual,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eeprom::PATH_FIELD_LEN;
    use crate::extract::ArchiveKind;
    use crate::sink::MemorySink;

    /// Builds a section: 6-digit length, 2-digit flag, optional path, body.
    fn section(flag: u8, length: usize, path: Option<&str>, body: &[u8]) -> Vec<u8> {
        let mut data = format!("{:06}{:02}", length, flag).into_bytes();
        if let Some(path) = path {
            let mut field = path.as_bytes().to_vec();
            field.resize(PATH_FIELD_LEN, 0);
            data.extend(field);
        }
        data.extend_from_slice(body);
        data
    }

    fn walk(config: &DecoderConfig, data: &[u8]) -> (Result<WalkEnd>, WalkState, MemorySink) {
        let out = Path::new("/out/cape");
        let mut reader = EepromReader::new(data);
        let mut sink = MemorySink::new();
        let mut state = WalkState::default();
        let result = SectionWalker::new(config, out).walk(&mut reader, &mut sink, &mut state);
        (result, state, sink)
    }

    #[test]
    fn test_raw_file_section() {
        let mut data = section(0, 5, Some("sub/file.bin"), b"hello");
        data.extend_from_slice(b"000000");

        let (result, state, sink) = walk(&DecoderConfig::default(), &data);

        assert_eq!(result.unwrap(), WalkEnd::Terminator);
        assert_eq!(state.folder, Some(PathBuf::from("/out/cape/sub")));
        assert_eq!(
            sink.file(Path::new("/out/cape/sub/file.bin")),
            Some(&b"hello"[..])
        );
        assert!(sink.archives.is_empty());
    }

    #[test]
    fn test_folder_is_last_written_directory() {
        let mut data = section(0, 1, Some("first/a.bin"), b"a");
        data.extend(section(0, 1, Some("second/b.bin"), b"b"));

        let (result, state, sink) = walk(&DecoderConfig::default(), &data);

        assert_eq!(result.unwrap(), WalkEnd::EndOfStream);
        assert_eq!(state.folder, Some(PathBuf::from("/out/cape/second")));
        assert_eq!(sink.files.len(), 2);
    }

    #[test]
    fn test_file_at_output_root_sets_folder_to_root() {
        let data = section(0, 2, Some("top.json"), b"{}");
        let (_, state, _) = walk(&DecoderConfig::default(), &data);
        assert_eq!(state.folder, Some(PathBuf::from("/out/cape")));
    }

    #[test]
    fn test_archive_sections_are_expanded() {
        let mut data = section(1, 3, Some("a/x.7z"), b"7z!");
        data.extend(section(2, 3, Some("b/x.tgz"), b"gz!"));
        data.extend(section(3, 3, Some("c/x.tbz"), b"bz!"));

        let (_, state, sink) = walk(&DecoderConfig::default(), &data);

        let kinds: Vec<ArchiveKind> = sink.archives.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            kinds,
            vec![ArchiveKind::SevenZip, ArchiveKind::TarGz, ArchiveKind::TarBz2]
        );
        assert_eq!(sink.archives[1].1, PathBuf::from("/out/cape/b/x.tgz"));
        assert_eq!(state.folder, Some(PathBuf::from("/out/cape/c")));
    }

    #[test]
    fn test_archive_expansion_can_be_disabled() {
        let data = section(2, 3, Some("b/x.tgz"), b"gz!");
        let config = DecoderConfig::default().with_extract_archives(false);

        let (_, state, sink) = walk(&config, &data);

        assert!(sink.archives.is_empty());
        assert_eq!(sink.files.len(), 1);
        assert_eq!(state.folder, Some(PathBuf::from("/out/cape/b")));
    }

    #[test]
    fn test_serial_override() {
        let mut body = b"NEWSERIAL".to_vec();
        body.resize(SERIAL_LEN + SERIAL_OVERRIDE_PADDING, b' ');
        let mut data = section(96, body.len(), None, &body);
        data.extend_from_slice(b"000000");

        let (result, state, _) = walk(&DecoderConfig::default(), &data);

        assert_eq!(result.unwrap(), WalkEnd::Terminator);
        assert_eq!(state.serial_number.as_deref(), Some("NEWSERIAL"));
    }

    #[test]
    fn test_serial_override_cut_short() {
        let declared = SERIAL_LEN + SERIAL_OVERRIDE_PADDING;
        let mut data = format!("{:06}96", declared).into_bytes();
        data.extend_from_slice(b"SN-SHO");

        let (result, state, _) = walk(&DecoderConfig::default(), &data);

        assert_eq!(result.unwrap(), WalkEnd::EndOfStream);
        assert_eq!(state.serial_number.as_deref(), Some("SN-SHO"));
        assert!(state.diagnostics.contains(&Diagnostic::TruncatedPayload {
            offset: 0,
            expected: declared,
            actual: 6
        }));
    }

    #[test]
    fn test_path_ends_at_first_nul() {
        let mut data = b"00000200".to_vec();
        let mut path = b"sub/f.bin\0junk".to_vec();
        path.resize(PATH_FIELD_LEN, 0);
        data.extend(path);
        data.extend_from_slice(b"ok000000");

        let (result, state, sink) = walk(&DecoderConfig::default(), &data);

        assert_eq!(result.unwrap(), WalkEnd::Terminator);
        assert_eq!(sink.file(Path::new("/out/cape/sub/f.bin")), Some(&b"ok"[..]));
        assert_eq!(state.folder, Some(PathBuf::from("/out/cape/sub")));
        assert_eq!(state.sections[0].path.as_deref(), Some("sub/f.bin"));
    }

    #[test]
    fn test_skip_sections_keep_cursor_aligned() {
        let mut data = section(97, 15, None, b"123456789012abc");
        data.extend(section(98, 2, None, b"zz"));
        data.extend(section(99, 8, None, b"123456xy"));
        data.extend(section(70, 4, None, b"????"));
        data.extend(section(42, 3, Some("ignored/path"), b"abc"));
        data.extend(section(0, 2, Some("after/ok.bin"), b"ok"));
        data.extend_from_slice(b"000000");

        let (result, state, sink) = walk(&DecoderConfig::default(), &data);

        assert_eq!(result.unwrap(), WalkEnd::Terminator);
        assert_eq!(state.sections.len(), 6);
        assert_eq!(sink.files.len(), 1);
        assert_eq!(state.folder, Some(PathBuf::from("/out/cape/after")));
    }

    #[test]
    fn test_short_skip_ignores_declared_length() {
        // Declared length 9, but flag 98 consumes exactly two bytes.
        let mut data = section(98, 9, None, b"zz");
        data.extend(section(0, 1, Some("d/f"), b"!"));

        let (result, state, sink) = walk(&DecoderConfig::default(), &data);

        assert!(result.is_ok());
        assert_eq!(sink.files.len(), 1);
        assert!(state.diagnostics.contains(&Diagnostic::ShortSkipLengthIgnored {
            offset: 0,
            declared: 9
        }));
    }

    #[test]
    fn test_short_skip_strict_mode() {
        let data = section(98, 9, None, b"zz");
        let config = DecoderConfig::default().with_strict_short_skip(true);

        let (result, _, _) = walk(&config, &data);

        assert!(matches!(
            result,
            Err(CapeError::LengthMismatch {
                flag: 98,
                length: 9,
                expected: 2
            })
        ));
    }

    #[test]
    fn test_oversized_section_is_rejected() {
        let data = section(0, 40_000, Some("big/blob.bin"), &[]);
        let (result, state, sink) = walk(&DecoderConfig::default(), &data);

        assert!(matches!(
            result,
            Err(CapeError::SectionTooLarge { length: 40_000, max: 32768, .. })
        ));
        assert!(sink.files.is_empty());
        assert_eq!(state.folder, None);
    }

    #[test]
    fn test_large_unknown_section_is_only_skipped() {
        let mut data = section(80, 40_000, None, &vec![0u8; 40_000]);
        data.extend_from_slice(b"000000");
        let (result, _, _) = walk(&DecoderConfig::default(), &data);
        assert_eq!(result.unwrap(), WalkEnd::Terminator);
    }

    #[test]
    fn test_undersized_subfield_sections() {
        let (result, _, _) = walk(&DecoderConfig::default(), &section(97, 4, None, b"abcd"));
        assert!(matches!(
            result,
            Err(CapeError::InvalidSectionLength { flag: 97, min: 12, .. })
        ));

        let (result, _, _) = walk(&DecoderConfig::default(), &section(99, 5, None, b"abcde"));
        assert!(matches!(
            result,
            Err(CapeError::InvalidSectionLength { flag: 99, min: 6, .. })
        ));
    }

    #[test]
    fn test_escaping_paths_are_rejected() {
        for path in ["../evil.bin", "/etc/passwd", "a/../../b", ""] {
            let data = section(0, 1, Some(path), b"x");
            let (result, _, sink) = walk(&DecoderConfig::default(), &data);
            assert!(
                matches!(result, Err(CapeError::InvalidPath { .. })),
                "path {:?} accepted",
                path
            );
            assert!(sink.files.is_empty());
        }
    }

    #[test]
    fn test_truncated_payload_is_written_partially() {
        let data = section(0, 10, Some("t/part.bin"), b"abc");

        let (result, state, sink) = walk(&DecoderConfig::default(), &data);

        assert_eq!(result.unwrap(), WalkEnd::EndOfStream);
        assert_eq!(sink.file(Path::new("/out/cape/t/part.bin")), Some(&b"abc"[..]));
        assert!(state.diagnostics.contains(&Diagnostic::TruncatedPayload {
            offset: 0,
            expected: 10,
            actual: 3
        }));
    }

    #[test]
    fn test_bad_length_keeps_earlier_state() {
        let mut data = section(0, 1, Some("ok/a.bin"), b"a");
        data.extend_from_slice(b"xyz   ");

        let (result, state, _) = walk(&DecoderConfig::default(), &data);

        assert!(matches!(
            result,
            Err(CapeError::InvalidNumber { field: "length", .. })
        ));
        assert_eq!(state.folder, Some(PathBuf::from("/out/cape/ok")));
    }

    #[test]
    fn test_apply_state_to_info() {
        let mut info = CapeInfo {
            name: "n".to_string(),
            version: "v".to_string(),
            serial_number: "old".to_string(),
            folder: None,
        };
        let mut state = WalkState {
            folder: Some(PathBuf::from("/x")),
            serial_number: Some("new".to_string()),
            ..WalkState::default()
        };

        state.apply(&mut info);

        assert_eq!(info.serial_number, "new");
        assert_eq!(info.folder, Some(PathBuf::from("/x")));
    }
}
