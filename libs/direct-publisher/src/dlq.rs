//! Dead-letter records for undeliverable events.

use serde::{Deserialize, Serialize};

use event_broker::BrokerError;
use event_id::EventId;

/// What gets written to the dead-letter topic (and, as a last resort, to
/// the local backup file) when delivery is exhausted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedEventRecord {
    pub event_id: String,
    pub original_topic: String,
    pub original_payload: String,
    pub exception_type: String,
    pub exception_message: String,
    /// Epoch milliseconds.
    pub failed_at: i64,
}

impl FailedEventRecord {
    pub fn from_broker_error(
        event_id: &EventId,
        original_topic: &str,
        original_payload: &str,
        error: &BrokerError,
        failed_at_ms: i64,
    ) -> Self {
        let exception_type = match error {
            BrokerError::Timeout(_) => "Timeout",
            BrokerError::Delivery { .. } => "Delivery",
            BrokerError::Rejected(_) => "Rejected",
        };

        Self {
            event_id: event_id.as_str().to_string(),
            original_topic: original_topic.to_string(),
            original_payload: original_payload.to_string(),
            exception_type: exception_type.to_string(),
            exception_message: error.to_string(),
            failed_at: failed_at_ms,
        }
    }

    /// File name for the local backup fallback.
    pub fn backup_file_name(&self) -> String {
        format!("{}.json", self.event_id)
    }
}
