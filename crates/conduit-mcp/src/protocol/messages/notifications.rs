//! Control-Flow Notifications
//!
//! Cancellation and progress run out-of-band as notifications on the
//! same transport as the requests they refer to. Neither ever receives
//! a reply; a cancellation for an unknown id and progress for an
//! unknown token are both dropped silently.

use serde::{Deserialize, Serialize};

use crate::protocol::message::RequestId;
use crate::protocol::types::ProgressToken;

/// Parameters of `notifications/cancelled`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CancelledNotification {
    /// Id of the request being cancelled
    pub request_id: RequestId,

    /// Optional human-readable reason
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl CancelledNotification {
    /// Create a cancellation for the given request id
    pub fn new(request_id: RequestId) -> Self {
        Self {
            request_id,
            reason: None,
        }
    }

    /// Attach a reason
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Parameters of `notifications/progress`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressNotification {
    /// Token from the originating request's `_meta.progressToken`
    pub progress_token: ProgressToken,

    /// Work completed so far; monotonically non-decreasing per token
    pub progress: f64,

    /// Total amount of work, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,

    /// Optional status message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProgressNotification {
    /// Create a progress update for the given token
    pub fn new(progress_token: ProgressToken, progress: f64) -> Self {
        Self {
            progress_token,
            progress,
            total: None,
            message: None,
        }
    }

    /// Attach the total amount of work
    pub fn with_total(mut self, total: f64) -> Self {
        self.total = Some(total);
        self
    }

    /// Attach a status message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cancelled_wire_shape() {
        let cancel = CancelledNotification::new(RequestId::new_number(7)).with_reason("user");
        let value = serde_json::to_value(&cancel).unwrap();
        assert_eq!(value["requestId"], 7);
        assert_eq!(value["reason"], "user");
    }

    #[test]
    fn cancelled_preserves_string_ids() {
        let cancel: CancelledNotification =
            serde_json::from_value(json!({"requestId": "req-9"})).unwrap();
        assert_eq!(cancel.request_id, RequestId::new_string("req-9"));
    }

    #[test]
    fn progress_wire_shape() {
        let progress = ProgressNotification::new(ProgressToken::String("tok".to_string()), 3.0)
            .with_total(10.0)
            .with_message("working");
        let value = serde_json::to_value(&progress).unwrap();
        assert_eq!(value["progressToken"], "tok");
        assert_eq!(value["progress"], 3.0);
        assert_eq!(value["total"], 10.0);
    }
}
