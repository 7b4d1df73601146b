//! Archive expansion through external tools.
//!
//! Archive sections are expanded in place by running `7z` or `tar` in the
//! directory the archive was written to. The decoder only cares whether the
//! tool could be started and finished in time; its output is discarded.

use crate::config::DecoderConfig;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Archive formats carried by data-bearing sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    SevenZip,
    TarGz,
    TarBz2,
}

impl ArchiveKind {
    /// Name of the tool family, for messages.
    pub fn tool(&self) -> &'static str {
        match self {
            ArchiveKind::SevenZip => "7z",
            ArchiveKind::TarGz | ArchiveKind::TarBz2 => "tar",
        }
    }

    /// Arguments placed before the archive path.
    pub fn args(&self) -> &'static [&'static str] {
        match self {
            ArchiveKind::SevenZip => &["x"],
            ArchiveKind::TarGz => &["-xzvf"],
            ArchiveKind::TarBz2 => &["-xjvf"],
        }
    }
}

/// What happened to an extraction attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractStatus {
    /// The tool exited; `code` is `None` if it was killed by a signal.
    Finished { code: Option<i32> },
    /// The tool was still running at the deadline and was killed.
    TimedOut,
    /// The tool could not be started.
    NotStarted(String),
    /// Expansion was not attempted (dry run).
    Skipped,
}

impl ExtractStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, ExtractStatus::Finished { code: Some(0) })
    }
}

impl fmt::Display for ExtractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractStatus::Finished { code: Some(code) } => write!(f, "exited with {}", code),
            ExtractStatus::Finished { code: None } => write!(f, "terminated by signal"),
            ExtractStatus::TimedOut => write!(f, "timed out"),
            ExtractStatus::NotStarted(reason) => write!(f, "not started: {}", reason),
            ExtractStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Runs archive tools with a bounded wait.
#[derive(Debug, Clone)]
pub struct Extractor {
    seven_zip: PathBuf,
    tar: PathBuf,
    timeout: Duration,
}

impl Extractor {
    pub fn new(config: &DecoderConfig) -> Self {
        Self {
            seven_zip: config.seven_zip_program.clone(),
            tar: config.tar_program.clone(),
            timeout: config.extract_timeout,
        }
    }

    /// Builds the command line for `archive`, run from `dir`.
    pub fn command(&self, kind: ArchiveKind, archive: &Path, dir: &Path) -> Command {
        let program = match kind {
            ArchiveKind::SevenZip => &self.seven_zip,
            ArchiveKind::TarGz | ArchiveKind::TarBz2 => &self.tar,
        };
        let mut cmd = Command::new(program);
        cmd.args(kind.args())
            .arg(archive)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        cmd
    }

    /// Expands `archive` into `dir`. Never fails; see [`ExtractStatus`].
    pub fn expand(&self, kind: ArchiveKind, archive: &Path, dir: &Path) -> ExtractStatus {
        debug!(tool = kind.tool(), archive = %archive.display(), "expanding archive");
        let status = run_with_timeout(&mut self.command(kind, archive, dir), self.timeout);
        if !status.is_success() {
            warn!(
                tool = kind.tool(),
                archive = %archive.display(),
                %status,
                "archive expansion failed"
            );
        }
        status
    }
}

/// Spawns `cmd` and waits until it exits or `timeout` elapses.
pub fn run_with_timeout(cmd: &mut Command, timeout: Duration) -> ExtractStatus {
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => return ExtractStatus::NotStarted(e.to_string()),
    };

    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return ExtractStatus::Finished { code: status.code() },
            Ok(None) if Instant::now() >= deadline => {
                stop(&mut child);
                return ExtractStatus::TimedOut;
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                stop(&mut child);
                return ExtractStatus::NotStarted(e.to_string());
            }
        }
    }
}

/// Kills `child` and reaps it so no zombie is left behind.
fn stop(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}
