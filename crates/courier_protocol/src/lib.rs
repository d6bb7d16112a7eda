//! Courier shared protocol
//!
//! Vocabulary shared by the ingestion pipeline and its binary:
//!
//! - [`types`]: processed-record line codec, terminal statuses, delivery outcomes
//! - [`http_types`]: the HL7v2 message resource exchanged with the remote endpoint
//! - [`config`]: runtime configuration (TOML + validation)
//! - [`defaults`]: canonical default values
//!
//! # Tracking file format
//!
//! ```text
//! filename|YYYY-MM-DD HH:MM:SS|status
//! ```
//!
//! One record per line, append-only. Only the first field is a key.

pub mod config;
pub mod defaults;
pub mod http_types;
pub mod types;

pub use config::{ConfigError, CourierConfig};
pub use http_types::{Hl7v2ConfigRef, Hl7v2MessagePayload, Hl7v2MessageResponse};
pub use types::{
    DeliveryOutcome, ProcessedRecord, ProcessedStatus, RecordParseError, RECORD_SEPARATOR,
    RECORD_TIMESTAMP_FORMAT,
};
