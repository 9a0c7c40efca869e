use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Flat key/value settings as produced by every configuration source.
pub type SettingsMap = BTreeMap<String, Value>;

/// Properties or headers attached to a broker message.
pub type PropertyMap = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(rename = "@timestamp")]
    pub timestamp: String,
    pub destination: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Value>,
    pub properties: PropertyMap,
    pub headers: PropertyMap,
}

/// Loop-safe description of a failure and its deepest reachable cause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDescription {
    pub exception: String,
    pub exception_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_cause: Option<Box<ErrorDescription>>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub exception_loop: bool,
}

impl ErrorDescription {
    pub fn new(exception: impl Into<String>, exception_message: impl Into<String>) -> Self {
        Self {
            exception: exception.into(),
            exception_message: exception_message.into(),
            root_cause: None,
            exception_loop: false,
        }
    }
}

impl fmt::Display for ErrorDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "{}: {}", self.exception, self.exception_message),
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}
