//! Append-only tracking file of terminally processed files.
//!
//! The file is opened, read or appended, and closed on every call. No handle
//! or lock outlives an operation, so the pipeline's retry loops never hold
//! the store open and the file can be inspected while the process runs.

use crate::error::{CourierError, Result};
use chrono::NaiveDateTime;
use courier_protocol::{ProcessedRecord, ProcessedStatus};
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Durable filename -> terminal status log.
#[derive(Debug, Clone)]
pub struct ProcessedStore {
    path: PathBuf,
}

impl ProcessedStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bare filename of the tracking file, used by the scanner for self-exclusion.
    pub fn file_name(&self) -> Option<String> {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
    }

    /// Names with at least one record, success or error.
    ///
    /// Creates an empty tracking file when none exists. Undecodable bytes are
    /// replaced rather than failing the whole load.
    pub fn load(&self) -> Result<HashSet<String>> {
        let Some(content) = self.read_content()? else {
            return Ok(HashSet::new());
        };

        let names: HashSet<String> = content
            .lines()
            .filter_map(ProcessedRecord::filename_of)
            .map(str::to_string)
            .collect();

        info!(
            count = names.len(),
            "Loaded {} processed files from tracking file",
            names.len()
        );
        Ok(names)
    }

    /// Every well-formed record, in file order. Malformed lines are skipped.
    pub fn records(&self) -> Result<Vec<ProcessedRecord>> {
        let Some(content) = self.read_content()? else {
            return Ok(Vec::new());
        };

        let mut records = Vec::new();
        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match ProcessedRecord::parse_line(line) {
                Ok(record) => records.push(record),
                Err(e) => debug!(line = index + 1, error = %e, "Skipping malformed tracking record"),
            }
        }
        Ok(records)
    }

    /// Append one record. Existing content is never rewritten.
    ///
    /// If a previous write left the file without a trailing newline the new
    /// record starts on a fresh line, so a torn line cannot swallow it.
    pub fn append(
        &self,
        filename: &str,
        status: ProcessedStatus,
        timestamp: NaiveDateTime,
    ) -> Result<()> {
        if !ProcessedRecord::is_representable(filename) {
            return Err(CourierError::UnrepresentableName(filename.to_string()));
        }
        let record = ProcessedRecord::new(filename, status, timestamp);

        self.ensure_parent().map_err(|e| self.io_error(e))?;
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;

        let mut line = String::new();
        if needs_leading_newline(&mut file).map_err(|e| self.io_error(e))? {
            line.push('\n');
        }
        line.push_str(&record.to_line());
        line.push('\n');

        file.write_all(line.as_bytes())
            .and_then(|_| file.sync_data())
            .map_err(|e| self.io_error(e))?;

        info!(
            file = %filename,
            status = %status,
            "[{}] Marked file as processed (status: {})",
            filename,
            status
        );
        Ok(())
    }

    /// Read the whole file, creating it empty when absent (`None`).
    fn read_content(&self) -> Result<Option<String>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.ensure_parent().map_err(|e| self.io_error(e))?;
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.path)
                    .map_err(|e| self.io_error(e))?;
                info!(
                    path = %self.path.display(),
                    "Created processed files tracking file: {}",
                    self.path.display()
                );
                Ok(None)
            }
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn ensure_parent(&self) -> io::Result<()> {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
            _ => Ok(()),
        }
    }

    fn io_error(&self, source: io::Error) -> CourierError {
        CourierError::Store {
            path: self.path.clone(),
            source,
        }
    }
}

fn needs_leading_newline(file: &mut fs::File) -> io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}
