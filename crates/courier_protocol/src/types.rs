//! Core protocol types: terminal statuses, the tracking-file record codec and delivery outcomes.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Field separator inside a tracking record.
pub const RECORD_SEPARATOR: char = '|';

/// Timestamp layout inside a tracking record.
pub const RECORD_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ============================================================================
// Terminal Status
// ============================================================================

/// Terminal local status of a file.
///
/// Presence of any record excludes a file from later scans, whatever its status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessedStatus {
    /// Delivered and accepted by the endpoint
    Success,
    /// Delivered but rejected (or not understood) by the endpoint
    Error,
}

impl ProcessedStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "success" => Some(Self::Success),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl fmt::Display for ProcessedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Tracking Record
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordParseError {
    #[error("empty record")]
    Empty,

    #[error("record has no filename")]
    MissingFilename,

    #[error("record has {0} fields, expected 3")]
    FieldCount(usize),

    #[error("invalid timestamp '{0}'")]
    Timestamp(String),

    #[error("invalid status '{0}'")]
    Status(String),
}

/// One line of the tracking file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedRecord {
    pub filename: String,
    pub timestamp: NaiveDateTime,
    pub status: ProcessedStatus,
}

impl ProcessedRecord {
    pub fn new(filename: impl Into<String>, status: ProcessedStatus, timestamp: NaiveDateTime) -> Self {
        Self {
            filename: filename.into(),
            timestamp,
            status,
        }
    }

    /// Whether `name` can be stored without corrupting the line format.
    pub fn is_representable(name: &str) -> bool {
        !name.is_empty()
            && !name.contains(RECORD_SEPARATOR)
            && !name.contains('\n')
            && !name.contains('\r')
    }

    /// Serialize without the trailing newline.
    pub fn to_line(&self) -> String {
        format!(
            "{}{sep}{}{sep}{}",
            self.filename,
            self.timestamp.format(RECORD_TIMESTAMP_FORMAT),
            self.status.as_str(),
            sep = RECORD_SEPARATOR
        )
    }

    /// Strict parse of a full record.
    pub fn parse_line(line: &str) -> Result<Self, RecordParseError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(RecordParseError::Empty);
        }

        let fields: Vec<&str> = line.split(RECORD_SEPARATOR).collect();
        if fields.len() != 3 {
            return Err(RecordParseError::FieldCount(fields.len()));
        }
        if fields[0].is_empty() {
            return Err(RecordParseError::MissingFilename);
        }

        let timestamp = NaiveDateTime::parse_from_str(fields[1], RECORD_TIMESTAMP_FORMAT)
            .map_err(|_| RecordParseError::Timestamp(fields[1].to_string()))?;
        let status = ProcessedStatus::parse(fields[2])
            .ok_or_else(|| RecordParseError::Status(fields[2].to_string()))?;

        Ok(Self {
            filename: fields[0].to_string(),
            timestamp,
            status,
        })
    }

    /// Lenient key extraction used for the exclusion check.
    ///
    /// Everything before the first separator is the filename. Blank lines and
    /// lines with an empty first field yield `None`.
    pub fn filename_of(line: &str) -> Option<&str> {
        let line = line.trim();
        let name = line.split(RECORD_SEPARATOR).next()?;
        if name.is_empty() {
            None
        } else {
            Some(name)
        }
    }
}

impl fmt::Display for ProcessedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}

// ============================================================================
// Delivery Outcome
// ============================================================================

/// Result of one delivery attempt (or of the retrying client, where `delivered` is always true).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    /// An HTTP-level response was obtained, whatever its status
    pub delivered: bool,
    pub http_status: Option<u16>,
    pub remote_id: Option<String>,
    pub business_status: Option<String>,
    pub error_message: Option<String>,
}

impl DeliveryOutcome {
    pub fn delivered(http_status: u16) -> Self {
        Self {
            delivered: true,
            http_status: Some(http_status),
            ..Self::default()
        }
    }

    pub fn undelivered(error_message: impl Into<String>) -> Self {
        Self {
            delivered: false,
            error_message: Some(error_message.into()),
            ..Self::default()
        }
    }

    pub fn with_remote_id(mut self, remote_id: Option<String>) -> Self {
        self.remote_id = remote_id;
        self
    }

    pub fn with_business_status(mut self, business_status: Option<String>) -> Self {
        self.business_status = business_status;
        self
    }

    pub fn with_error_message(mut self, error_message: Option<String>) -> Self {
        self.error_message = error_message;
        self
    }
}
