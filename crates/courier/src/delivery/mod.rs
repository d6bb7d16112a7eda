//! Delivery of file content to the remote message endpoint.
//!
//! [`MessageSender`] is the transport seam: one HTTP exchange, no retries, no
//! interpretation. [`DeliveryClient`] wraps it with the retry policy and turns
//! each reply into a [`DeliveryOutcome`] exactly once.
//!
//! # Classification
//!
//! - any HTTP status (2xx, 4xx, 5xx) -> delivered; 429/500/502/503/504 first
//!   use up the remaining attempts of the current burst
//! - connection refused, timeout, torn response -> not delivered, retried forever
//! - request that cannot be built -> surfaced to the caller as an unexpected error

mod aidbox;

pub use aidbox::AidboxSender;

use crate::retry::{RetryLoop, RetryState, Sleeper};
use courier_protocol::defaults::RETRYABLE_HTTP_STATUSES;
use courier_protocol::{DeliveryOutcome, Hl7v2MessageResponse};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

/// Raw HTTP reply from one exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

/// Failure of one exchange before an HTTP status was obtained.
#[derive(Debug, Clone, Error)]
pub enum SendError {
    #[error("Connection error: {0}")]
    Connect(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Transport error: {0}")]
    Transport(String),

    /// Retrying the same request cannot help
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl SendError {
    /// Check if this error is transient (eligible for the delivery retry loop)
    pub fn is_transient(&self) -> bool {
        !matches!(self, SendError::InvalidRequest(_))
    }
}

/// One delivery exchange with the remote endpoint.
pub trait MessageSender {
    fn send(&self, content: &str, filename: &str) -> Result<HttpReply, SendError>;
}

/// Retry policy for [`DeliveryClient`].
#[derive(Debug, Clone)]
pub struct DeliveryPolicy {
    /// Fixed delay between bursts; bursts repeat forever
    pub retry_delay: Duration,
    /// Attempts inside one burst
    pub burst_attempts: u32,
    /// Attempt `n` of a burst waits `n * burst_backoff` before attempt `n + 1`
    pub burst_backoff: Duration,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(courier_protocol::defaults::DEFAULT_RETRY_DELAY_SECS),
            burst_attempts: courier_protocol::defaults::DEFAULT_SEND_BURST_ATTEMPTS,
            burst_backoff: Duration::from_secs(
                courier_protocol::defaults::SEND_BURST_BACKOFF_UNIT_SECS,
            ),
        }
    }
}

/// Sends content until the endpoint answers with any HTTP status.
pub struct DeliveryClient<S> {
    sender: S,
    sleeper: Arc<dyn Sleeper>,
    policy: DeliveryPolicy,
}

impl<S: MessageSender> DeliveryClient<S> {
    pub fn new(sender: S, sleeper: Arc<dyn Sleeper>, policy: DeliveryPolicy) -> Self {
        Self {
            sender,
            sleeper,
            policy,
        }
    }

    pub fn sender(&self) -> &S {
        &self.sender
    }

    /// Deliver `content`, retrying forever on transport failures.
    ///
    /// The returned outcome always has `delivered == true`. `Err` is reserved
    /// for requests that can never succeed as built.
    pub fn send(&self, content: &str, filename: &str) -> Result<DeliveryOutcome, SendError> {
        info!(file = %filename, "[{}] Sending HL7v2 message to Aidbox", filename);

        RetryLoop::new(self.sleeper.as_ref(), self.policy.retry_delay, "HL7v2 message send")
            .run(filename, |_| match self.burst(content, filename) {
                Ok(outcome) if outcome.delivered => Ok(Ok(outcome)),
                Ok(outcome) => Err(outcome
                    .error_message
                    .unwrap_or_else(|| "not delivered".to_string())),
                Err(e) => Ok(Err(e)),
            })
    }

    /// A single exchange, classified.
    pub fn attempt(&self, content: &str, filename: &str) -> Result<DeliveryOutcome, SendError> {
        match self.sender.send(content, filename) {
            Ok(reply) => Ok(outcome_from_reply(reply)),
            Err(e) if e.is_transient() => Ok(DeliveryOutcome::undelivered(e.to_string())),
            Err(e) => Err(e),
        }
    }

    /// Up to `burst_attempts` exchanges with short linear backoff.
    ///
    /// Transport failures and throttling/gateway statuses use another
    /// attempt. When the burst runs out on such a status, that reply is
    /// still returned as delivered.
    fn burst(&self, content: &str, filename: &str) -> Result<DeliveryOutcome, SendError> {
        let attempts = self.policy.burst_attempts.max(1);
        let mut state = RetryState::First;
        loop {
            let outcome = self.attempt(content, filename)?;
            let attempt = state.attempt() as u32;
            let retryable = !outcome.delivered || is_retryable_status(outcome.http_status);
            if !retryable || attempt >= attempts {
                if !outcome.delivered {
                    error!(
                        file = %filename,
                        attempts = attempts,
                        "[{}] HL7v2 message send failed after {} attempts",
                        filename,
                        attempts
                    );
                }
                return Ok(outcome);
            }

            let backoff = self.policy.burst_backoff * attempt;
            info!(
                file = %filename,
                attempt = attempt,
                http_status = ?outcome.http_status,
                backoff_secs = backoff.as_secs_f64(),
                "[{}] HL7v2 message send failed (attempt {}/{}), retrying in {:?}",
                filename,
                attempt,
                attempts,
                backoff
            );
            self.sleeper.sleep(backoff);
            state = state.next();
        }
    }
}

fn is_retryable_status(status: Option<u16>) -> bool {
    status.is_some_and(|s| RETRYABLE_HTTP_STATUSES.contains(&s))
}

/// Interpret a reply once. Only 2xx bodies are read for the business verdict.
pub fn outcome_from_reply(reply: HttpReply) -> DeliveryOutcome {
    let outcome = DeliveryOutcome::delivered(reply.status);

    if !(200..300).contains(&reply.status) {
        return outcome.with_error_message(Some(format!(
            "HTTP {}: {}",
            reply.status,
            truncate(&reply.body, 500)
        )));
    }

    match Hl7v2MessageResponse::from_body(&reply.body) {
        Ok(response) => outcome
            .with_remote_id(response.id)
            .with_business_status(response.status),
        Err(e) => outcome.with_error_message(Some(format!("Unparsable response body: {e}"))),
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}... (truncated)", &s[..idx]),
        None => s.to_string(),
    }
}
