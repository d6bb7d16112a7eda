//! Test doubles for the pipeline seams.
//!
//! [`RecordingSleeper`] replaces real waits and [`ScriptedSender`] replaces the
//! HTTP transport, so a whole batch runs deterministically in-process.
//! Compiled only for unit tests and under the `test-utils` feature.

use crate::delivery::{HttpReply, MessageSender, SendError};
use crate::retry::Sleeper;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type SleepHook = Box<dyn FnMut(usize) + Send>;

/// Records every requested sleep instead of blocking.
#[derive(Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
    hook: Mutex<Option<SleepHook>>,
    panic_after: Option<usize>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `hook` after each sleep with the 1-based sleep count.
    pub fn on_sleep(mut self, hook: impl FnMut(usize) + Send + 'static) -> Self {
        self.hook = Mutex::new(Some(Box::new(hook)));
        self
    }

    /// Panic on the sleep following the `n`th, to break out of endless retries.
    pub fn panic_after(mut self, n: usize) -> Self {
        self.panic_after = Some(n);
        self
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.lock_sleeps().clone()
    }

    pub fn count(&self) -> usize {
        self.lock_sleeps().len()
    }

    fn lock_sleeps(&self) -> std::sync::MutexGuard<'_, Vec<Duration>> {
        self.sleeps.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        let count = {
            let mut sleeps = self.lock_sleeps();
            if let Some(limit) = self.panic_after {
                if sleeps.len() >= limit {
                    panic!("RecordingSleeper: more than {} sleeps", limit);
                }
            }
            sleeps.push(duration);
            sleeps.len()
        };

        let mut hook = self.hook.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(hook) = hook.as_mut() {
            hook(count);
        }
    }
}

#[derive(Default)]
struct Script {
    replies: VecDeque<Result<HttpReply, SendError>>,
    calls: Vec<(String, String)>,
}

/// Transport double that plays back queued replies.
///
/// Once the queue is empty every call answers `201` with a `processed`
/// verdict and a generated id. Clones share the same script.
#[derive(Clone, Default)]
pub struct ScriptedSender {
    inner: Arc<Mutex<Script>>,
}

impl ScriptedSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_reply(&self, status: u16, body: &str) {
        self.lock().replies.push_back(Ok(HttpReply {
            status,
            body: body.to_string(),
        }));
    }

    pub fn push_error(&self, error: SendError) {
        self.lock().replies.push_back(Err(error));
    }

    /// `(filename, content)` of every call so far.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl MessageSender for ScriptedSender {
    fn send(&self, content: &str, filename: &str) -> Result<HttpReply, SendError> {
        let mut script = self.lock();
        script
            .calls
            .push((filename.to_string(), content.to_string()));
        let n = script.calls.len();
        script.replies.pop_front().unwrap_or_else(|| {
            Ok(HttpReply {
                status: 201,
                body: format!(r#"{{"id":"auto-{}","status":"processed"}}"#, n),
            })
        })
    }
}
