//! Canonical default values shared by the library and the binary.

pub const DEFAULT_DIRECTORY_PATH: &str = "./files";
pub const DEFAULT_AIDBOX_BASE_URL: &str = "https://api.aidbox.dev";
pub const DEFAULT_LOG_FILE_PATH: &str = "file_processor.log";
pub const DEFAULT_PROCESSED_FILES_PATH: &str = "processed_files.txt";
pub const DEFAULT_SCHEDULE_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 5;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Attempts per delivery burst before the outer retry delay kicks in.
pub const DEFAULT_SEND_BURST_ATTEMPTS: u32 = 4;

/// Backoff unit inside a burst: attempt `n` waits `n * unit` before attempt `n + 1`.
pub const SEND_BURST_BACKOFF_UNIT_SECS: u64 = 1;

/// Throttling and gateway statuses worth another attempt inside a burst
pub const RETRYABLE_HTTP_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Remote resource the pipeline posts to.
pub const HL7V2_MESSAGE_ENDPOINT: &str = "Hl7v2Message";

/// Business status the endpoint reports for an accepted message.
pub const BUSINESS_STATUS_PROCESSED: &str = "processed";
