//! Logging setup for the Courier binary.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "courier=info,courier_protocol=info";
const MAX_BACKUP_FILES: usize = 5;
const MAX_LOG_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Logging configuration for the Courier binary.
pub struct LogConfig<'a> {
    /// Active log file; backups are written next to it as `<name>.1` .. `<name>.5`
    pub log_file: &'a Path,
    /// Mirror the file filter on stderr instead of warnings only
    pub verbose: bool,
}

/// Initialize tracing with a size-rotated file writer and stderr output.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let file_writer = SizeRotatingFile::open(config.log_file, MAX_BACKUP_FILES, MAX_LOG_FILE_SIZE)
        .with_context(|| format!("Failed to open log file {}", config.log_file.display()))?;

    let file_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let console_filter = if config.verbose {
        file_filter.clone()
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(file_writer))
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(())
}

/// Append-only log file that moves itself to `<path>.1` once it would exceed
/// `max_size`, shifting older backups up and dropping the one past `max_backups`.
struct SizeRotatingFile {
    path: PathBuf,
    max_backups: usize,
    max_size: u64,
    file: File,
    written: u64,
}

impl SizeRotatingFile {
    fn open(path: &Path, max_backups: usize, max_size: u64) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let (file, written) = open_append(path)?;
        let mut log = Self {
            path: path.to_path_buf(),
            max_backups,
            max_size,
            file,
            written,
        };
        if log.written > log.max_size {
            log.roll()?;
        }
        Ok(log)
    }

    fn backup(&self, n: usize) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(format!(".{n}"));
        PathBuf::from(name)
    }

    fn roll(&mut self) -> io::Result<()> {
        let _ = self.file.flush();

        if self.max_backups == 0 {
            fs::remove_file(&self.path).or_else(ignore_missing)?;
        } else {
            fs::remove_file(self.backup(self.max_backups)).or_else(ignore_missing)?;
            for n in (1..self.max_backups).rev() {
                fs::rename(self.backup(n), self.backup(n + 1)).or_else(ignore_missing)?;
            }
            fs::rename(&self.path, self.backup(1)).or_else(ignore_missing)?;
        }

        let (file, written) = open_append(&self.path)?;
        self.file = file;
        self.written = written;
        Ok(())
    }
}

impl Write for SizeRotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // A single record larger than max_size still goes into a fresh file.
        if self.written > 0 && self.written + buf.len() as u64 > self.max_size {
            self.roll()?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn open_append(path: &Path) -> io::Result<(File, u64)> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let len = file.metadata()?.len();
    Ok((file, len))
}

fn ignore_missing(e: io::Error) -> io::Result<()> {
    if e.kind() == io::ErrorKind::NotFound {
        Ok(())
    } else {
        Err(e)
    }
}
