//! Logging Messages
//!
//! The logging channel carries structured log records from server to
//! client as `notifications/message`. Each session keeps a minimum
//! level (default [`LogLevel::Warning`]); `logging/setLevel` moves it,
//! and records below the threshold are suppressed at the source.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// RFC 5424 severity levels, least to most severe
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Detailed debugging information
    Debug,
    /// Normal operational messages
    Info,
    /// Notable but normal events
    Notice,
    /// Warning conditions
    Warning,
    /// Error conditions
    Error,
    /// Critical conditions
    Critical,
    /// Action must be taken immediately
    Alert,
    /// System is unusable
    Emergency,
}

impl LogLevel {
    /// Whether a record at this level passes a session minimum
    pub fn passes(&self, minimum: LogLevel) -> bool {
        *self >= minimum
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Notice => "notice",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Critical => "critical",
            LogLevel::Alert => "alert",
            LogLevel::Emergency => "emergency",
        };
        write!(f, "{name}")
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "notice" => Ok(LogLevel::Notice),
            "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            "critical" => Ok(LogLevel::Critical),
            "alert" => Ok(LogLevel::Alert),
            "emergency" => Ok(LogLevel::Emergency),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

/// Parameters of `logging/setLevel`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SetLevelRequest {
    /// New minimum level for this session
    pub level: LogLevel,
}

/// Parameters of `notifications/message`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingMessageNotification {
    /// Severity of the record
    pub level: LogLevel,

    /// Optional logger name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logger: Option<String>,

    /// Arbitrary JSON payload
    pub data: Value,
}

impl LoggingMessageNotification {
    /// Create a log record
    pub fn new(level: LogLevel, data: Value) -> Self {
        Self {
            level,
            logger: None,
            data,
        }
    }

    /// Attach a logger name
    pub fn with_logger(mut self, logger: impl Into<String>) -> Self {
        self.logger = Some(logger.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn levels_order_by_severity() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Warning < LogLevel::Error);
        assert!(LogLevel::Emergency > LogLevel::Alert);
    }

    #[test]
    fn threshold_filtering() {
        assert!(LogLevel::Error.passes(LogLevel::Warning));
        assert!(LogLevel::Warning.passes(LogLevel::Warning));
        assert!(!LogLevel::Info.passes(LogLevel::Warning));
    }

    #[test]
    fn level_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&LogLevel::Notice).unwrap(), r#""notice""#);
        let parsed: LogLevel = serde_json::from_str(r#""emergency""#).unwrap();
        assert_eq!(parsed, LogLevel::Emergency);
    }

    #[test]
    fn level_from_str() {
        assert_eq!("critical".parse::<LogLevel>().unwrap(), LogLevel::Critical);
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn notification_round_trip() {
        let record = LoggingMessageNotification::new(LogLevel::Info, json!({"event": "started"}))
            .with_logger("session");
        let text = serde_json::to_string(&record).unwrap();
        let parsed: LoggingMessageNotification = serde_json::from_str(&text).unwrap();
        assert_eq!(record, parsed);
    }
}
