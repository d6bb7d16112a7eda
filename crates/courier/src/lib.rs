//! Courier: watched-directory ingestion pipeline
//!
//! Every file that appears in the watched directory is read, posted to the
//! HL7v2 message endpoint, resolved to `success` or `error`, and recorded in
//! an append-only tracking file so it is never sent again.
//!
//! ```text
//! DirectoryScanner -> FileReader -> DeliveryClient -> OutcomeResolver -> ProcessedStore
//!        \______________________ Ingestor (one file at a time) ______________________/
//! ```
//!
//! Delivery is at-least-once: a file is recorded only after the endpoint has
//! answered, so a crash between delivery and the append resends it on the
//! next run.

pub mod delivery;
pub mod driver;
pub mod error;
pub mod reader;
pub mod resolver;
pub mod retry;
pub mod scanner;
pub mod scheduler;
pub mod store;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use delivery::{
    AidboxSender, DeliveryClient, DeliveryPolicy, HttpReply, MessageSender, SendError,
};
pub use driver::{BatchSummary, Ingestor};
pub use error::{CourierError, Result};
pub use reader::{FileReader, ReadError};
pub use resolver::{OutcomeResolver, Resolution};
pub use retry::{RetryLoop, RetryState, Sleeper, ThreadSleeper};
pub use scanner::{CandidateFile, DirectoryScanner, ScanConfig};
pub use scheduler::{Scheduler, ShutdownToken};
pub use store::ProcessedStore;
