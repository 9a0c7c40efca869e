//! Kafka backend for the broker capability traits.
//!
//! Queue semantics come from a single shared consumer group per destination;
//! topic semantics from a private group per subscriber. A durable subscriber
//! keeps a stable group named after its client id and subscription name, so its
//! committed offsets outlive a disconnect.

use crate::broker::{
    Broker, Connection, ConnectionParams, Consumer, ConsumerMode, Message, MessageBody, Session,
};
use crate::config::DEFAULT_CLIENT_ID;
use crate::error::BrokerError;
use chrono::{DateTime, Utc};
use ingest_core::model::PropertyMap;
use rdkafka::ClientConfig;
use rdkafka::consumer::{BaseConsumer, CommitMode, Consumer as _};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::{BorrowedMessage, Headers, Message as _};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

const METADATA_PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const SUPPORTED_FACTORIES: &[&str] = &["kafka", "rdkafka"];

#[derive(Debug, Clone, Copy, Default)]
pub struct KafkaBroker;

impl Broker for KafkaBroker {
    type Connection = KafkaConnection;

    fn connect(&self, params: &ConnectionParams) -> Result<KafkaConnection, BrokerError> {
        ensure_supported_factory(params.factory.as_deref())?;
        ensure_required_artifacts(&params.require_jars)?;

        let base = base_client_config(params)?;
        let probe = base
            .create::<BaseConsumer>()
            .map_err(|error| BrokerError::fatal_with_source("create kafka client", error))?;
        probe
            .fetch_metadata(None, METADATA_PROBE_TIMEOUT)
            .map_err(classify)?;

        info!(
            bootstrap_servers = base.get("bootstrap.servers").unwrap_or_default(),
            "connected to kafka"
        );
        Ok(KafkaConnection { base, probe })
    }
}

pub struct KafkaConnection {
    base: ClientConfig,
    probe: BaseConsumer,
}

impl Connection for KafkaConnection {
    type Session = KafkaSession;

    fn session(&self) -> Result<KafkaSession, BrokerError> {
        Ok(KafkaSession {
            base: self.base.clone(),
        })
    }

    fn close(self) -> Result<(), BrokerError> {
        drop(self.probe);
        debug!("kafka connection closed");
        Ok(())
    }
}

pub struct KafkaSession {
    base: ClientConfig,
}

impl Session for KafkaSession {
    type Consumer = KafkaConsumer;

    fn consumer(
        &self,
        destination: &str,
        mode: &ConsumerMode,
    ) -> Result<KafkaConsumer, BrokerError> {
        let config = consumer_config(&self.base, destination, mode);
        let consumer = config
            .create::<BaseConsumer>()
            .map_err(|error| BrokerError::fatal_with_source("create kafka consumer", error))?;
        consumer.subscribe(&[destination]).map_err(|error| {
            BrokerError::fatal_with_source(format!("subscribe to {destination}"), error)
        })?;

        debug!(
            destination,
            mode = mode.as_str(),
            group_id = config.get("group.id").unwrap_or_default(),
            "kafka consumer subscribed"
        );

        Ok(KafkaConsumer {
            consumer,
            commit_on_close: config.get("enable.auto.commit") == Some("true"),
        })
    }

    fn close(self) -> Result<(), BrokerError> {
        Ok(())
    }
}

pub struct KafkaConsumer {
    consumer: BaseConsumer,
    commit_on_close: bool,
}

impl Consumer for KafkaConsumer {
    type Message = KafkaMessage;

    fn receive(&self, timeout: Duration) -> Result<Option<KafkaMessage>, BrokerError> {
        match self.consumer.poll(timeout) {
            None => Ok(None),
            Some(Ok(message)) => Ok(Some(KafkaMessage::from_borrowed(&message))),
            Some(Err(error)) => Err(classify(error)),
        }
    }

    fn close(self) -> Result<(), BrokerError> {
        let committed = if self.commit_on_close {
            match self.consumer.commit_consumer_state(CommitMode::Sync) {
                Err(error) if error.rdkafka_error_code() != Some(RDKafkaErrorCode::NoOffset) => {
                    Err(classify(error))
                }
                _ => Ok(()),
            }
        } else {
            Ok(())
        };
        self.consumer.unsubscribe();
        committed
    }
}

/// Record headers become properties; record metadata becomes headers.
#[derive(Debug, Clone, PartialEq)]
pub struct KafkaMessage {
    body: Option<MessageBody>,
    properties: Option<PropertyMap>,
    headers: Option<PropertyMap>,
    timestamp: Option<DateTime<Utc>>,
}

impl KafkaMessage {
    fn from_borrowed(message: &BorrowedMessage<'_>) -> Self {
        let properties = message.headers().map(|headers| {
            headers
                .iter()
                .map(|header| {
                    let value = header
                        .value
                        .map(|bytes| Value::String(String::from_utf8_lossy(bytes).into_owned()))
                        .unwrap_or(Value::Null);
                    (header.key.to_string(), value)
                })
                .collect::<PropertyMap>()
        });

        let timestamp_millis = message.timestamp().to_millis();

        let mut headers = PropertyMap::new();
        headers.insert("topic".to_string(), Value::from(message.topic()));
        headers.insert("partition".to_string(), Value::from(message.partition()));
        headers.insert("offset".to_string(), Value::from(message.offset()));
        if let Some(key) = message.key() {
            headers.insert(
                "key".to_string(),
                Value::String(String::from_utf8_lossy(key).into_owned()),
            );
        }
        if let Some(millis) = timestamp_millis {
            headers.insert("timestamp".to_string(), Value::from(millis));
        }

        Self {
            body: message
                .payload()
                .map(|payload| MessageBody::Bytes(payload.to_vec())),
            properties,
            headers: Some(headers),
            timestamp: timestamp_millis.and_then(DateTime::<Utc>::from_timestamp_millis),
        }
    }
}

impl Message for KafkaMessage {
    fn body(&self) -> Option<&MessageBody> {
        self.body.as_ref()
    }

    fn properties(&self) -> Option<&PropertyMap> {
        self.properties.as_ref()
    }

    fn headers(&self) -> Option<&PropertyMap> {
        self.headers.as_ref()
    }

    fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }
}

fn ensure_supported_factory(factory: Option<&str>) -> Result<(), BrokerError> {
    match factory.map(str::trim).filter(|factory| !factory.is_empty()) {
        None => Ok(()),
        Some(factory)
            if SUPPORTED_FACTORIES
                .iter()
                .any(|supported| supported.eq_ignore_ascii_case(factory)) =>
        {
            Ok(())
        }
        Some(factory) => Err(BrokerError::fatal(format!(
            "unsupported connection factory {factory}"
        ))),
    }
}

fn ensure_required_artifacts(artifacts: &[String]) -> Result<(), BrokerError> {
    match artifacts
        .iter()
        .find(|artifact| !Path::new(artifact.as_str()).exists())
    {
        Some(missing) => Err(BrokerError::fatal(format!(
            "required client artifact not found: {missing}"
        ))),
        None => Ok(()),
    }
}

fn base_client_config(params: &ConnectionParams) -> Result<ClientConfig, BrokerError> {
    let broker_url = params
        .broker_url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .ok_or_else(|| BrokerError::fatal("broker_url is required for the kafka backend"))?;
    let (servers, tls) = bootstrap_servers(broker_url)?;

    let mut config = ClientConfig::new();
    config.set("bootstrap.servers", servers);

    match (&params.username, &params.password) {
        (Some(username), password) => {
            config
                .set(
                    "security.protocol",
                    if tls { "SASL_SSL" } else { "SASL_PLAINTEXT" },
                )
                .set("sasl.mechanism", "PLAIN")
                .set("sasl.username", username.as_str())
                .set(
                    "sasl.password",
                    password.as_ref().map(|secret| secret.expose()).unwrap_or_default(),
                );
        }
        (None, _) if tls => {
            config.set("security.protocol", "SSL");
        }
        (None, _) => {}
    }

    if let Some(client_id) = &params.client_id {
        config.set("client.id", client_id.as_str());
    }

    for (key, value) in &params.factory_settings {
        let value = match value {
            Value::String(text) => text.clone(),
            Value::Bool(_) | Value::Number(_) => value.to_string(),
            _ => {
                return Err(BrokerError::fatal(format!(
                    "factory setting {key} must be a string, number or boolean"
                )));
            }
        };
        config.set(key.as_str(), value);
    }

    Ok(config)
}

/// Accepts `tcp://`, `kafka://`, `ssl://` or bare `host:port`, comma separated.
fn bootstrap_servers(broker_url: &str) -> Result<(String, bool), BrokerError> {
    let mut tls = false;
    let mut servers = Vec::new();

    for entry in broker_url
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
    {
        let server = match entry.split_once("://") {
            Some(("tcp" | "kafka", server)) => server,
            Some(("ssl", server)) => {
                tls = true;
                server
            }
            Some((scheme, _)) => {
                return Err(BrokerError::fatal(format!(
                    "unsupported broker url scheme {scheme}"
                )));
            }
            None => entry,
        };
        servers.push(server.trim_end_matches('/'));
    }

    if servers.is_empty() {
        return Err(BrokerError::fatal("broker_url names no servers"));
    }
    Ok((servers.join(","), tls))
}

fn consumer_config(base: &ClientConfig, destination: &str, mode: &ConsumerMode) -> ClientConfig {
    let mut config = base.clone();
    let (group_id, auto_commit, offset_reset) = match mode {
        ConsumerMode::PointToPoint => (
            format!("{DEFAULT_CLIENT_ID}.{destination}"),
            "true",
            "earliest",
        ),
        ConsumerMode::PubSub { durable: None } => (
            format!("{DEFAULT_CLIENT_ID}-{}", Uuid::new_v4()),
            "false",
            "latest",
        ),
        ConsumerMode::PubSub {
            durable: Some(durable),
        } => (
            format!("{}.{}", durable.client_id, durable.name),
            "true",
            "latest",
        ),
    };

    set_default(&mut config, "group.id", group_id);
    set_default(&mut config, "enable.auto.commit", auto_commit);
    set_default(&mut config, "auto.offset.reset", offset_reset);
    config
}

// Explicit factory settings win over mode defaults.
fn set_default(config: &mut ClientConfig, key: &str, value: impl Into<String>) {
    if config.get(key).is_none() {
        config.set(key, value);
    }
}

fn classify(error: KafkaError) -> BrokerError {
    let fatal = matches!(
        error.rdkafka_error_code(),
        Some(
            RDKafkaErrorCode::Fatal
                | RDKafkaErrorCode::Authentication
                | RDKafkaErrorCode::SaslAuthenticationFailed
                | RDKafkaErrorCode::TopicAuthorizationFailed
                | RDKafkaErrorCode::GroupAuthorizationFailed
                | RDKafkaErrorCode::InvalidGroupId
        )
    );

    if fatal {
        BrokerError::fatal_with_source("kafka session failed", error)
    } else {
        BrokerError::transient_with_source("kafka request failed", error)
    }
}
