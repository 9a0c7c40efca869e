use crate::broker::{Message, MessageBody};
use crate::config::{Codec, ResolvedConfig};
use crate::error::ConversionError;
use chrono::{SecondsFormat, Utc};
use ingest_core::model::{Event, PropertyMap};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventBuilder {
    destination: String,
    include_body: bool,
    include_properties: bool,
    include_headers: bool,
    skip_properties: Vec<String>,
    skip_headers: Vec<String>,
    codec: Codec,
    use_message_timestamp: bool,
}

impl EventBuilder {
    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self {
            destination: config.destination.clone(),
            include_body: config.include_body,
            include_properties: config.include_properties,
            include_headers: config.include_headers,
            skip_properties: config.skip_properties.clone(),
            skip_headers: config.skip_headers.clone(),
            codec: config.codec,
            use_message_timestamp: config.use_message_timestamp,
        }
    }

    /// Absent properties or headers produce empty maps, never an error.
    pub fn build<M: Message>(&self, message: &M) -> Result<Event, ConversionError> {
        let body = if self.include_body {
            Some(decode_body(message.body(), self.codec)?)
        } else {
            None
        };

        let properties = if self.include_properties {
            filtered(message.properties(), &self.skip_properties)
        } else {
            PropertyMap::new()
        };

        let headers = if self.include_headers {
            filtered(message.headers(), &self.skip_headers)
        } else {
            PropertyMap::new()
        };

        let timestamp = self
            .use_message_timestamp
            .then(|| message.timestamp())
            .flatten()
            .unwrap_or_else(Utc::now);

        Ok(Event {
            id: Uuid::new_v4().to_string(),
            timestamp: timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            destination: self.destination.clone(),
            message: body,
            properties,
            headers,
        })
    }
}

fn filtered(source: Option<&PropertyMap>, skip: &[String]) -> PropertyMap {
    source
        .map(|map| {
            map.iter()
                .filter(|(key, _)| !skip.iter().any(|skipped| skipped == *key))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect()
        })
        .unwrap_or_default()
}

fn decode_body(body: Option<&MessageBody>, codec: Codec) -> Result<Value, ConversionError> {
    let Some(body) = body else {
        return Ok(Value::Null);
    };

    match (body, codec) {
        (MessageBody::Map(map), _) => Ok(Value::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        )),
        (MessageBody::Text(text), Codec::Plain) => Ok(Value::String(text.clone())),
        (MessageBody::Bytes(bytes), Codec::Plain) => {
            Ok(Value::String(String::from_utf8_lossy(bytes).into_owned()))
        }
        (MessageBody::Text(text), Codec::Json) => {
            serde_json::from_str(text).map_err(ConversionError::InvalidJson)
        }
        (MessageBody::Bytes(bytes), Codec::Json) => {
            serde_json::from_slice(bytes).map_err(ConversionError::InvalidJson)
        }
    }
}
