//! Fixed-interval batch loop with cooperative shutdown.

use crate::delivery::MessageSender;
use crate::driver::Ingestor;
use crate::retry::Sleeper;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Longest single wait between shutdown checks.
const WAIT_SLICE: Duration = Duration::from_millis(500);

/// Shared stop request. Clone is cheap and shares state.
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    requested: Arc<AtomicBool>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }
}

/// Runs a batch immediately, then once per interval, until shutdown.
///
/// A batch in progress is never interrupted; the token is only checked
/// between batches and while waiting.
pub struct Scheduler<'a, S> {
    ingestor: &'a Ingestor<S>,
    sleeper: Arc<dyn Sleeper>,
    interval: Duration,
    shutdown: ShutdownToken,
}

impl<'a, S: MessageSender> Scheduler<'a, S> {
    pub fn new(
        ingestor: &'a Ingestor<S>,
        sleeper: Arc<dyn Sleeper>,
        interval: Duration,
        shutdown: ShutdownToken,
    ) -> Self {
        Self {
            ingestor,
            sleeper,
            interval,
            shutdown,
        }
    }

    /// Returns the number of completed cycles.
    pub fn run(&self) -> u64 {
        info!(
            interval_secs = self.interval.as_secs(),
            "Scheduler started, processing every {} seconds",
            self.interval.as_secs()
        );

        let mut cycles = 0u64;
        while !self.shutdown.is_requested() {
            cycles += 1;
            info!(cycle = cycles, "Cycle #{}", cycles);
            let processed = self.ingestor.process_new_files();
            if processed > 0 {
                info!(cycle = cycles, processed = processed, "Processed files: {}", processed);
            }

            self.wait();
        }

        info!(cycles = cycles, "Scheduler stopped after {} cycles", cycles);
        cycles
    }

    fn wait(&self) {
        let mut remaining = self.interval;
        while !remaining.is_zero() && !self.shutdown.is_requested() {
            let slice = remaining.min(WAIT_SLICE);
            self.sleeper.sleep(slice);
            remaining -= slice;
        }
    }
}
