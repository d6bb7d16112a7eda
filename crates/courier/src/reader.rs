//! Retrying file reader.
//!
//! Once enumerated, a file is assumed to become readable eventually (antivirus
//! locks, slow network shares, a writer still holding it). Nothing else would
//! pick an abandoned file up again, so reads retry forever. A permanently
//! broken file therefore blocks every file after it in scan order.

use crate::retry::{RetryLoop, Sleeper};
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Why a single read attempt failed.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("file not found")]
    NotFound,

    #[error("path is not a regular file")]
    NotAFile,

    #[error("permission denied")]
    PermissionDenied,

    #[error("content is not valid UTF-8: {0}")]
    Decode(#[from] std::string::FromUtf8Error),

    #[error("IO error: {0}")]
    Io(io::Error),
}

impl From<io::Error> for ReadError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => Self::NotFound,
            io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            _ => Self::Io(e),
        }
    }
}

pub struct FileReader {
    sleeper: Arc<dyn Sleeper>,
    retry_delay: Duration,
}

impl FileReader {
    pub fn new(sleeper: Arc<dyn Sleeper>, retry_delay: Duration) -> Self {
        Self {
            sleeper,
            retry_delay,
        }
    }

    /// Read `path` as UTF-8, blocking until it succeeds.
    pub fn read(&self, path: &Path) -> String {
        let name = display_name(path);
        let content = RetryLoop::new(self.sleeper.as_ref(), self.retry_delay, "Read")
            .run(&name, |_| Self::read_once(path));

        info!(
            file = %name,
            chars = content.chars().count(),
            "[{}] Successfully read file ({} characters)",
            name,
            content.chars().count()
        );
        content
    }

    /// One read attempt.
    pub fn read_once(path: &Path) -> Result<String, ReadError> {
        let meta = fs::metadata(path)?;
        if !meta.is_file() {
            return Err(ReadError::NotAFile);
        }
        let bytes = fs::read(path)?;
        Ok(String::from_utf8(bytes)?)
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSleeper;
    use tempfile::TempDir;

    #[test]
    fn test_read_once_classifies_failures() {
        let temp = TempDir::new().unwrap();

        let missing = temp.path().join("missing.txt");
        assert!(matches!(FileReader::read_once(&missing), Err(ReadError::NotFound)));

        assert!(matches!(FileReader::read_once(temp.path()), Err(ReadError::NotAFile)));

        let binary = temp.path().join("binary.dat");
        fs::write(&binary, [0xff, 0xfe, 0x00]).unwrap();
        assert!(matches!(FileReader::read_once(&binary), Err(ReadError::Decode(_))));

        let text = temp.path().join("a.txt");
        fs::write(&text, "MSH|^~\\&|").unwrap();
        assert_eq!(FileReader::read_once(&text).unwrap(), "MSH|^~\\&|");
    }

    #[test]
    fn test_read_retries_until_file_appears() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("late.txt");

        // The file shows up while the reader is sleeping after its second failure.
        let target = path.clone();
        let sleeper = Arc::new(RecordingSleeper::new().on_sleep(move |count| {
            if count == 2 {
                fs::write(&target, "arrived").unwrap();
            }
        }));
        let reader = FileReader::new(sleeper.clone(), Duration::from_secs(5));

        assert_eq!(reader.read(&path), "arrived");
        assert_eq!(sleeper.sleeps(), vec![Duration::from_secs(5); 2]);
    }
}
