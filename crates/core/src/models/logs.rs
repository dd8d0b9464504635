use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::asset::Market;

pub const ERROR_LOGS: &str = "errorLogs";
pub const AUDIT_LOGS: &str = "auditLogs";
pub const DEAD_LETTERS: &str = "deadLetters";

/// A job failure, stored in `errorLogs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorLogEntry {
    /// Failure class (e.g., "price_update_error", "gold_update_error")
    #[serde(rename = "type")]
    pub kind: String,
    /// Job that failed
    pub function: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorLogEntry {
    pub fn new(kind: impl Into<String>, function: impl Into<String>, error: impl ToString) -> Self {
        Self {
            kind: kind.into(),
            function: function.into(),
            error: error.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Record of a successful job run, stored in `auditLogs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub action: String,
    #[serde(default)]
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl AuditLogEntry {
    pub fn new(action: impl Into<String>, details: serde_json::Value) -> Self {
        Self {
            action: action.into(),
            details,
            timestamp: Utc::now(),
        }
    }
}

/// A symbol that no provider in the chain could resolve, stored in `deadLetters`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterEntry {
    pub job: String,
    pub market: Market,
    pub symbol: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Read the `timestamp` field shared by all log entries, if present.
pub fn entry_timestamp(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    value
        .get("timestamp")
        .and_then(|t| t.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}
