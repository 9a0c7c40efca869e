use crate::model::SettingsMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

pub const REDACTED: &str = "<redacted>";
const REDACTED_ALTERNATE: &str = "<redacted*>";

const SECRET_KEY_SUFFIXES: &[&str] = &["password", "passwd", "secret", "token", "credentials"];

/// Returns a copy of `settings` with every credential-bearing value replaced.
///
/// Keys are never added or removed: a map without a password yields a copy
/// without a password.
pub fn redact_settings(settings: &SettingsMap) -> SettingsMap {
    settings
        .iter()
        .map(|(key, value)| (key.clone(), redact_entry(key, value)))
        .collect()
}

pub fn is_secret_key(key: &str) -> bool {
    let normalized = key.trim().trim_start_matches(':').to_ascii_lowercase();
    SECRET_KEY_SUFFIXES
        .iter()
        .any(|suffix| normalized.ends_with(suffix))
}

fn redact_entry(key: &str, value: &Value) -> Value {
    if is_secret_key(key) && !value.is_null() {
        return Value::String(placeholder_for(value).to_string());
    }
    redact_value(value)
}

fn redact_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, nested)| (key.clone(), redact_entry(key, nested)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_value).collect()),
        other => other.clone(),
    }
}

fn placeholder_for(original: &Value) -> &'static str {
    match original.as_str() {
        Some(REDACTED) => REDACTED_ALTERNATE,
        _ => REDACTED,
    }
}

/// A credential that only reveals itself through [`Secret::expose`].
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret({REDACTED})")
    }
}

impl Serialize for Secret {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(REDACTED)
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Secret)
    }
}
