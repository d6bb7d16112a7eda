use courier_protocol::defaults::BUSINESS_STATUS_PROCESSED;
use courier_protocol::{DeliveryOutcome, ProcessedStatus};

/// Terminal decision for one file, plus what the log line needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub status: ProcessedStatus,
    pub remote_id: Option<String>,
    pub http_status: Option<u16>,
    pub business_status: Option<String>,
    pub error_message: Option<String>,
}

impl Resolution {
    pub fn is_success(&self) -> bool {
        self.status == ProcessedStatus::Success
    }
}

/// Maps a delivered outcome to a local terminal status.
///
/// `processed` is the only accepted verdict; `error`, unknown strings and a
/// missing verdict all resolve to [`ProcessedStatus::Error`]. Nothing here
/// retries: a delivered rejection is final.
#[derive(Debug, Default, Clone, Copy)]
pub struct OutcomeResolver;

impl OutcomeResolver {
    pub fn resolve(&self, outcome: &DeliveryOutcome) -> Resolution {
        let accepted = outcome.delivered
            && outcome.business_status.as_deref() == Some(BUSINESS_STATUS_PROCESSED);

        Resolution {
            status: if accepted {
                ProcessedStatus::Success
            } else {
                ProcessedStatus::Error
            },
            remote_id: outcome.remote_id.clone(),
            http_status: outcome.http_status,
            business_status: outcome.business_status.clone(),
            error_message: outcome.error_message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delivered(business: Option<&str>) -> DeliveryOutcome {
        DeliveryOutcome::delivered(201)
            .with_remote_id(Some("m-1".to_string()))
            .with_business_status(business.map(str::to_string))
    }

    #[test]
    fn test_processed_is_success() {
        let resolution = OutcomeResolver.resolve(&delivered(Some("processed")));
        assert!(resolution.is_success());
        assert_eq!(resolution.remote_id.as_deref(), Some("m-1"));
        assert_eq!(resolution.http_status, Some(201));
    }

    #[test]
    fn test_everything_else_is_error() {
        for business in [Some("error"), Some("received"), Some("PROCESSED"), None] {
            let resolution = OutcomeResolver.resolve(&delivered(business));
            assert_eq!(resolution.status, ProcessedStatus::Error, "{business:?}");
        }
    }

    #[test]
    fn test_undelivered_never_succeeds() {
        let mut outcome = DeliveryOutcome::undelivered("refused");
        outcome.business_status = Some("processed".to_string());
        assert_eq!(OutcomeResolver.resolve(&outcome).status, ProcessedStatus::Error);
    }
}
