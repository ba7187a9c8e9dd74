use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Sentinel outcomes for well-understood response classes.
pub const EMAIL_UPDATED: &str = "Email updated (Sms,Email)";
pub const EMAIL_NOT_FOUND: &str = "Email not found";
pub const TRANSACTIONAL_UNBLOCKED: &str = "Unblock or resubscribe a transactional Email";
pub const TRANSACTIONAL_NOT_FOUND: &str = "Transactional Email not found";

/// Status recorded when a structured upsert response carries no `status`.
pub const MISSING_STATUS: &str = "Error";

/// One normalized input row, serialized exactly as the upsert API expects it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContactRecord {
    pub email: String,
    pub email_blacklisted: bool,
    pub sms_blacklisted: bool,
    pub transactional_contact: bool,
}

/// Result of a single API call.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Parsed JSON response body.
    Structured(Value),
    Sentinel(&'static str),
}

impl Outcome {
    /// Text written to the `status` column of the audit row.
    ///
    /// Structured payloads contribute their `status` field (or `"Error"` when
    /// absent); non-object payloads are stringified as-is.
    pub fn audit_status(&self) -> String {
        match self {
            Outcome::Sentinel(text) => (*text).to_string(),
            Outcome::Structured(Value::Object(map)) => match map.get("status") {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => MISSING_STATUS.to_string(),
            },
            Outcome::Structured(Value::String(s)) => s.clone(),
            Outcome::Structured(other) => other.to_string(),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Sentinel(text) => f.write_str(text),
            Outcome::Structured(value) => write!(f, "{}", value),
        }
    }
}

/// One line of the output table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditRow {
    pub id: String,
    pub timestamp: String,
    pub email: String,
    pub status: String,
}
