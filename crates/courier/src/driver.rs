//! Ingestion driver
//!
//! Design principles:
//! - One `Ingestor` owns every pipeline component; nothing is process-global
//! - Exactly one file in flight; files go in scan order
//! - Per-file stages `Scanned -> Reading -> Sending -> Resolved -> Recorded`, none skipped
//! - Reading and Sending block until they succeed
//! - An unexpected error restarts the same file at Reading after the retry delay
//! - Recording is one best-effort append; a failed append is logged and the batch moves on

use crate::delivery::{DeliveryClient, DeliveryPolicy, MessageSender};
use crate::error::{CourierError, Result};
use crate::reader::FileReader;
use crate::resolver::{OutcomeResolver, Resolution};
use crate::retry::{RetryState, Sleeper};
use crate::scanner::{CandidateFile, DirectoryScanner, ScanConfig};
use crate::store::ProcessedStore;
use courier_protocol::defaults::SEND_BURST_BACKOFF_UNIT_SECS;
use courier_protocol::CourierConfig;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Where a file is in its workflow.
#[derive(Debug)]
enum FileStage {
    Scanned,
    Reading,
    Sending(String),
    Resolved(Resolution),
    Recorded(Resolution),
}

/// Counters for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub discovered: usize,
    pub recorded: usize,
    pub succeeded: usize,
}

/// The ingestion pipeline: scanner, reader, delivery client, resolver and store.
pub struct Ingestor<S> {
    directory: PathBuf,
    store: ProcessedStore,
    scanner: DirectoryScanner,
    reader: FileReader,
    delivery: DeliveryClient<S>,
    resolver: OutcomeResolver,
    sleeper: Arc<dyn Sleeper>,
    retry_delay: Duration,
}

impl<S: MessageSender> Ingestor<S> {
    pub fn new(config: &CourierConfig, sender: S, sleeper: Arc<dyn Sleeper>) -> Self {
        let retry_delay = config.retry_delay();
        let policy = DeliveryPolicy {
            retry_delay,
            burst_attempts: config.send_burst_attempts,
            burst_backoff: Duration::from_secs(SEND_BURST_BACKOFF_UNIT_SECS),
        };

        Self {
            directory: config.directory_path.clone(),
            store: ProcessedStore::new(&config.processed_files_path),
            scanner: DirectoryScanner::with_config(ScanConfig {
                include_hidden: config.include_hidden,
            }),
            reader: FileReader::new(Arc::clone(&sleeper), retry_delay),
            delivery: DeliveryClient::new(sender, Arc::clone(&sleeper), policy),
            resolver: OutcomeResolver,
            sleeper,
            retry_delay,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn store(&self) -> &ProcessedStore {
        &self.store
    }

    pub fn sender(&self) -> &S {
        self.delivery.sender()
    }

    /// Create the watched directory if it does not exist yet.
    pub fn ensure_directory(&self) -> Result<()> {
        if !self.directory.exists() {
            fs::create_dir_all(&self.directory)?;
            info!("Created directory: {}", self.directory.display());
        }
        Ok(())
    }

    /// Process one batch from the configured directory.
    pub fn process_new_files(&self) -> usize {
        self.process_batch(&self.directory)
    }

    /// Scan `directory` and drive every new file to a terminal record.
    ///
    /// Returns how many files were recorded, success and error alike.
    pub fn process_batch(&self, directory: &Path) -> usize {
        self.run_batch(directory).recorded
    }

    pub fn run_batch(&self, directory: &Path) -> BatchSummary {
        info!("Starting file processing for directory: {}", directory.display());

        let files = self.scanner.scan(directory, &self.store);
        let mut summary = BatchSummary {
            discovered: files.len(),
            ..BatchSummary::default()
        };
        if files.is_empty() {
            info!("No new files to process");
            return summary;
        }

        for file in &files {
            if let Some(resolution) = self.drive(file) {
                summary.recorded += 1;
                if resolution.is_success() {
                    summary.succeeded += 1;
                }
            }
        }

        info!(
            recorded = summary.recorded,
            succeeded = summary.succeeded,
            discovered = summary.discovered,
            "File processing completed. Recorded: {}/{} files ({} succeeded)",
            summary.recorded,
            summary.discovered,
            summary.succeeded
        );
        summary
    }

    /// Run one file through every stage. `None` when the final append failed.
    fn drive(&self, file: &CandidateFile) -> Option<Resolution> {
        info!(file = %file.filename, "[{}] Processing file", file.filename);

        let mut stage = FileStage::Scanned;
        let mut failures = RetryState::First;
        loop {
            stage = match stage {
                FileStage::Recorded(resolution) => return Some(resolution),
                FileStage::Resolved(resolution) => {
                    log_resolution(&file.filename, &resolution);
                    match self.record(file, &resolution) {
                        Ok(()) => FileStage::Recorded(resolution),
                        Err(e) => {
                            error!(
                                file = %file.filename,
                                error = %e,
                                "[{}] Failed to mark file as processed",
                                file.filename
                            );
                            return None;
                        }
                    }
                }
                other => match self.advance(file, other) {
                    Ok(next) => next,
                    Err(e) => {
                        error!(
                            file = %file.filename,
                            attempt = failures.attempt(),
                            delay_secs = self.retry_delay.as_secs_f64(),
                            error = %e,
                            "[{}] Error processing file, retrying from read",
                            file.filename
                        );
                        self.sleeper.sleep(self.retry_delay);
                        failures = failures.next();
                        FileStage::Reading
                    }
                },
            };
        }
    }

    /// One fallible step through the blocking stages.
    fn advance(&self, file: &CandidateFile, stage: FileStage) -> Result<FileStage> {
        match stage {
            FileStage::Scanned => Ok(FileStage::Reading),
            FileStage::Reading => {
                let content = self.reader.read(&file.path);
                info!(file = %file.filename, "[{}] File was successfully read", file.filename);
                Ok(FileStage::Sending(content))
            }
            FileStage::Sending(content) => {
                let outcome = self.delivery.send(&content, &file.filename)?;
                Ok(FileStage::Resolved(self.resolver.resolve(&outcome)))
            }
            other => Err(CourierError::InvalidState(format!(
                "{} cannot advance from {:?}",
                file.filename, other
            ))),
        }
    }

    fn record(&self, file: &CandidateFile, resolution: &Resolution) -> Result<()> {
        let timestamp = chrono::Local::now().naive_local();
        self.store.append(&file.filename, resolution.status, timestamp)
    }
}

/// Severity of a per-file resolution line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineLevel {
    Info,
    Warn,
    Error,
}

/// The consolidated per-file line. A rejection that came back without a
/// message id is reported as `FAILED` with the reason.
fn resolution_line(filename: &str, resolution: &Resolution) -> (LineLevel, String) {
    let http_status = resolution
        .http_status
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    match (resolution.is_success(), resolution.remote_id.as_deref()) {
        (true, remote_id) => (
            LineLevel::Info,
            format!(
                "[{}] HL7v2 sending message - SUCCESS {{status: {}, id: {}}} | Processing - SUCCESS",
                filename,
                http_status,
                remote_id.unwrap_or("unknown")
            ),
        ),
        (false, Some(remote_id)) => (
            LineLevel::Warn,
            format!(
                "[{}] HL7v2 sending message - SUCCESS {{status: {}, id: {}}} | Processing - ERROR",
                filename, http_status, remote_id
            ),
        ),
        (false, None) => {
            let message = resolution
                .error_message
                .as_deref()
                .or(resolution.business_status.as_deref())
                .unwrap_or("no message id returned");
            (
                LineLevel::Error,
                format!(
                    "[{}] HL7v2 sending message - FAILED {{status: {}, message: {}}}",
                    filename, http_status, message
                ),
            )
        }
    }
}

fn log_resolution(filename: &str, resolution: &Resolution) {
    let (level, line) = resolution_line(filename, resolution);
    let http_status = resolution.http_status;
    let remote_id = resolution.remote_id.as_deref().unwrap_or("");
    let error = resolution.error_message.as_deref().unwrap_or("");
    match level {
        LineLevel::Info => info!(file = %filename, ?http_status, remote_id, "{}", line),
        LineLevel::Warn => warn!(file = %filename, ?http_status, remote_id, error, "{}", line),
        LineLevel::Error => error!(file = %filename, ?http_status, error, "{}", line),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::SendError;
    use crate::testing::{RecordingSleeper, ScriptedSender};
    use courier_protocol::ProcessedStatus;
    use std::panic::{self, AssertUnwindSafe};
    use tempfile::TempDir;

    struct TestEnv {
        _temp: TempDir,
        config: CourierConfig,
    }

    impl TestEnv {
        fn new() -> Self {
            let temp = TempDir::new().expect("Failed to create temp dir");
            let dir = temp.path().join("inbox");
            fs::create_dir_all(&dir).unwrap();
            let config = CourierConfig {
                directory_path: dir.clone(),
                processed_files_path: dir.join("processed_files.txt"),
                aidbox_username: "courier".to_string(),
                aidbox_password: "secret".to_string(),
                retry_delay_secs: 5,
                ..CourierConfig::default()
            };
            Self {
                _temp: temp,
                config,
            }
        }

        fn write(&self, name: &str, content: &[u8]) {
            fs::write(self.config.directory_path.join(name), content).unwrap();
        }

        fn ingestor(
            &self,
            sender: &ScriptedSender,
            sleeper: &Arc<RecordingSleeper>,
        ) -> Ingestor<ScriptedSender> {
            Ingestor::new(&self.config, sender.clone(), sleeper.clone())
        }
    }

    #[test]
    fn test_unexpected_error_restarts_from_read() {
        let env = TestEnv::new();
        env.write("a.txt", b"hello");

        let sender = ScriptedSender::new();
        sender.push_error(SendError::InvalidRequest("bad header".to_string()));
        sender.push_reply(201, r#"{"id":"m-1","status":"processed"}"#);
        let sleeper = Arc::new(RecordingSleeper::new());

        let count = env.ingestor(&sender, &sleeper).process_new_files();

        assert_eq!(count, 1);
        assert_eq!(sender.calls().len(), 2);
        assert_eq!(sleeper.sleeps(), vec![Duration::from_secs(5)]);
    }

    #[test]
    fn test_failed_append_is_not_counted_and_not_retried() {
        let env = TestEnv::new();
        env.write("a.txt", b"hello");

        let mut config = env.config.clone();
        // The tracking file path is a directory: loads and appends both fail.
        config.processed_files_path = env._temp.path().join("state");
        fs::create_dir_all(&config.processed_files_path).unwrap();

        let sender = ScriptedSender::new();
        let sleeper = Arc::new(RecordingSleeper::new());
        let ingestor = Ingestor::new(&config, sender.clone(), sleeper.clone());

        assert_eq!(ingestor.process_new_files(), 0);
        assert_eq!(sender.calls().len(), 1);
        assert!(sleeper.sleeps().is_empty());
    }

    #[test]
    fn test_unreadable_file_blocks_later_files() {
        let env = TestEnv::new();
        env.write("a_broken.txt", &[0xff, 0xfe, 0x00]);
        env.write("b.txt", b"world");

        let sender = ScriptedSender::new();
        let sleeper = Arc::new(RecordingSleeper::new().panic_after(10));
        let ingestor = env.ingestor(&sender, &sleeper);

        let result = panic::catch_unwind(AssertUnwindSafe(|| ingestor.process_new_files()));

        assert!(result.is_err(), "batch must not return while a file is unreadable");
        assert_eq!(sleeper.sleeps().len(), 10);
        assert!(sender.calls().is_empty());
        assert!(ingestor.store().records().unwrap().is_empty());
    }

    #[test]
    fn test_summary_counts_errors_as_recorded() {
        let env = TestEnv::new();
        env.write("a.txt", b"one");
        env.write("b.txt", b"two");

        let sender = ScriptedSender::new();
        sender.push_reply(201, r#"{"id":"m-1","status":"error"}"#);
        sender.push_reply(201, r#"{"id":"m-2","status":"processed"}"#);
        let sleeper = Arc::new(RecordingSleeper::new());

        let summary = env
            .ingestor(&sender, &sleeper)
            .run_batch(&env.config.directory_path);

        assert_eq!(
            summary,
            BatchSummary {
                discovered: 2,
                recorded: 2,
                succeeded: 1
            }
        );
    }

    #[test]
    fn test_ensure_directory_creates_missing() {
        let env = TestEnv::new();
        let mut config = env.config.clone();
        config.directory_path = env._temp.path().join("new").join("inbox");

        let ingestor = Ingestor::new(&config, ScriptedSender::new(), Arc::new(RecordingSleeper::new()));
        ingestor.ensure_directory().unwrap();

        assert!(config.directory_path.is_dir());
        assert_eq!(ingestor.process_new_files(), 0);
    }

    #[test]
    fn test_recorded_status_matches_resolution() {
        let env = TestEnv::new();
        env.write("only.hl7", b"MSH|");

        let sender = ScriptedSender::new();
        sender.push_reply(400, "bad message");
        let sleeper = Arc::new(RecordingSleeper::new());
        let ingestor = env.ingestor(&sender, &sleeper);

        assert_eq!(ingestor.process_new_files(), 1);
        let records = ingestor.store().records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].filename, "only.hl7");
        assert_eq!(records[0].status, ProcessedStatus::Error);
    }

    fn resolution(
        status: ProcessedStatus,
        http_status: u16,
        remote_id: Option<&str>,
        error_message: Option<&str>,
    ) -> Resolution {
        Resolution {
            status,
            remote_id: remote_id.map(str::to_string),
            http_status: Some(http_status),
            business_status: None,
            error_message: error_message.map(str::to_string),
        }
    }

    #[test]
    fn test_resolution_line_variants() {
        let ok = resolution(ProcessedStatus::Success, 201, Some("m-1"), None);
        assert_eq!(
            resolution_line("a.hl7", &ok),
            (
                LineLevel::Info,
                "[a.hl7] HL7v2 sending message - SUCCESS {status: 201, id: m-1} | Processing - SUCCESS"
                    .to_string()
            )
        );

        let rejected = resolution(ProcessedStatus::Error, 201, Some("m-2"), None);
        let (level, line) = resolution_line("a.hl7", &rejected);
        assert_eq!(level, LineLevel::Warn);
        assert!(line.ends_with("{status: 201, id: m-2} | Processing - ERROR"));

        let http_error = resolution(ProcessedStatus::Error, 422, None, Some("HTTP 422: invalid"));
        assert_eq!(
            resolution_line("a.hl7", &http_error),
            (
                LineLevel::Error,
                "[a.hl7] HL7v2 sending message - FAILED {status: 422, message: HTTP 422: invalid}"
                    .to_string()
            )
        );
    }
}
