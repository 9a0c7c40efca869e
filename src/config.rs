use crate::error::ConfigurationError;
use ingest_core::model::SettingsMap;
use ingest_core::redact::Secret;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Client identity used when a durable subscription names none.
pub const DEFAULT_CLIENT_ID: &str = "broker-ingest";

pub const KNOWN_OPTIONS: &[&str] = &[
    "destination",
    "pub_sub",
    "threads",
    "durable_subscriber",
    "durable_subscriber_name",
    "durable_subscriber_client_id",
    "include_body",
    "include_properties",
    "include_headers",
    "broker_url",
    "factory",
    "username",
    "password",
    "require_jars",
    "jndi_name",
    "jndi_context",
    "yaml_file",
    "yaml_section",
    "receive_timeout_ms",
    "codec",
    "skip_headers",
    "skip_properties",
    "use_message_timestamp",
    "factory_settings",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Codec {
    #[default]
    Plain,
    Json,
}

/// Canonical settings after all sources have been merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolvedConfig {
    pub destination: String,
    pub pub_sub: bool,
    pub threads: usize,
    pub durable_subscriber: bool,
    pub durable_subscriber_name: Option<String>,
    pub durable_subscriber_client_id: Option<String>,
    pub include_body: bool,
    pub include_properties: bool,
    pub include_headers: bool,
    pub broker_url: Option<String>,
    pub factory: Option<String>,
    pub username: Option<String>,
    pub password: Option<Secret>,
    pub require_jars: Vec<String>,
    pub jndi_name: Option<String>,
    pub jndi_context: SettingsMap,
    pub yaml_file: Option<PathBuf>,
    pub yaml_section: Option<String>,
    pub receive_timeout_ms: u64,
    pub codec: Codec,
    pub skip_headers: Vec<String>,
    pub skip_properties: Vec<String>,
    pub use_message_timestamp: bool,
    pub factory_settings: SettingsMap,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            destination: String::new(),
            pub_sub: false,
            threads: 1,
            durable_subscriber: false,
            durable_subscriber_name: None,
            durable_subscriber_client_id: None,
            include_body: true,
            include_properties: true,
            include_headers: true,
            broker_url: None,
            factory: None,
            username: None,
            password: None,
            require_jars: Vec::new(),
            jndi_name: None,
            jndi_context: SettingsMap::new(),
            yaml_file: None,
            yaml_section: None,
            receive_timeout_ms: 1_000,
            codec: Codec::Plain,
            skip_headers: Vec::new(),
            skip_properties: Vec::new(),
            use_message_timestamp: false,
            factory_settings: SettingsMap::new(),
        }
    }
}

impl ResolvedConfig {
    pub fn from_settings(settings: &SettingsMap) -> Result<Self, ConfigurationError> {
        for key in settings.keys() {
            if !KNOWN_OPTIONS.contains(&key.as_str()) {
                warn!(option = %key, "ignoring unrecognized connector option");
            }
        }

        let known = settings
            .iter()
            .filter(|(key, _)| KNOWN_OPTIONS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect::<serde_json::Map<_, _>>();

        serde_json::from_value(Value::Object(known)).map_err(ConfigurationError::InvalidSettings)
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms.max(1))
    }
}
