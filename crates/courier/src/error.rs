//! Error types for the ingestion pipeline

use crate::delivery::SendError;
use courier_protocol::ConfigError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Courier error type
#[derive(Error, Debug)]
pub enum CourierError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Tracking file {path}: {source}")]
    Store {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Filename '{0}' cannot be recorded in the tracking file")]
    UnrepresentableName(String),

    #[error("Failed to list {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Delivery error: {0}")]
    Delivery(#[from] SendError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, CourierError>;
