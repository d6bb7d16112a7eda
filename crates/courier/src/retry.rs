//! Endless retry with an injectable sleep.
//!
//! Every recoverable failure in the pipeline (unreadable file, unreachable
//! endpoint, unexpected workflow error) is retried with no attempt limit. The
//! only thing bounding a loop is eventual success or process termination, so
//! the delay is the single knob and the [`Sleeper`] is the single seam tests
//! replace.

use std::fmt::Display;
use std::time::Duration;
use tracing::{info, warn};

/// Blocking pause between attempts.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Real-time sleeper backed by [`std::thread::sleep`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Position of a retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    First,
    /// Attempt number, starting at 2
    Retrying(u64),
}

impl RetryState {
    pub fn attempt(self) -> u64 {
        match self {
            Self::First => 1,
            Self::Retrying(n) => n,
        }
    }

    pub fn next(self) -> Self {
        Self::Retrying(self.attempt() + 1)
    }

    pub fn is_retry(self) -> bool {
        matches!(self, Self::Retrying(_))
    }
}

/// Fixed-delay, unbounded retry loop.
pub struct RetryLoop<'a> {
    sleeper: &'a dyn Sleeper,
    delay: Duration,
    operation: &'static str,
}

impl<'a> RetryLoop<'a> {
    pub fn new(sleeper: &'a dyn Sleeper, delay: Duration, operation: &'static str) -> Self {
        Self {
            sleeper,
            delay,
            operation,
        }
    }

    /// Run `op` until it returns `Ok`. Every failure is logged with the file,
    /// attempt number and delay, then the loop sleeps and tries again.
    pub fn run<T, E, F>(&self, file: &str, mut op: F) -> T
    where
        E: Display,
        F: FnMut(RetryState) -> Result<T, E>,
    {
        let mut state = RetryState::First;
        loop {
            match op(state) {
                Ok(value) => {
                    if state.is_retry() {
                        info!(
                            file = %file,
                            attempt = state.attempt(),
                            "[{}] {} succeeded after retrying",
                            file,
                            self.operation
                        );
                    }
                    return value;
                }
                Err(e) => {
                    warn!(
                        file = %file,
                        attempt = state.attempt(),
                        delay_secs = self.delay.as_secs_f64(),
                        error = %e,
                        "[{}] {} failed, retrying",
                        file,
                        self.operation
                    );
                    self.sleeper.sleep(self.delay);
                    state = state.next();
                }
            }
        }
    }
}
