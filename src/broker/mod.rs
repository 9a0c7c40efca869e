pub mod kafka;

use crate::error::BrokerError;
use chrono::{DateTime, Utc};
use ingest_core::model::PropertyMap;
use ingest_core::redact::Secret;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DurableSubscription {
    pub name: String,
    pub client_id: String,
}

/// How consumers attach to the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumerMode {
    /// Queue semantics: each message goes to exactly one consumer.
    PointToPoint,
    /// Topic semantics, optionally retained across disconnects.
    PubSub { durable: Option<DurableSubscription> },
}

impl ConsumerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsumerMode::PointToPoint => "point_to_point",
            ConsumerMode::PubSub { durable: None } => "pub_sub",
            ConsumerMode::PubSub { durable: Some(_) } => "pub_sub_durable",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionParams {
    pub broker_url: Option<String>,
    pub factory: Option<String>,
    pub username: Option<String>,
    pub password: Option<Secret>,
    pub require_jars: Vec<String>,
    pub client_id: Option<String>,
    pub factory_settings: PropertyMap,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    Text(String),
    Bytes(Vec<u8>),
    Map(PropertyMap),
}

/// A received message. Every accessor may legitimately return nothing.
pub trait Message {
    fn body(&self) -> Option<&MessageBody>;
    fn properties(&self) -> Option<&PropertyMap>;
    fn headers(&self) -> Option<&PropertyMap>;

    fn timestamp(&self) -> Option<DateTime<Utc>> {
        None
    }
}

pub trait Broker: Sync {
    type Connection: Connection;

    fn connect(&self, params: &ConnectionParams) -> Result<Self::Connection, BrokerError>;
}

pub trait Connection {
    type Session: Session;

    fn session(&self) -> Result<Self::Session, BrokerError>;
    fn close(self) -> Result<(), BrokerError>;
}

/// Shared by every consumer of one connector instance.
pub trait Session {
    type Consumer: Consumer;

    fn consumer(
        &self,
        destination: &str,
        mode: &ConsumerMode,
    ) -> Result<Self::Consumer, BrokerError>;
    fn close(self) -> Result<(), BrokerError>;
}

pub trait Consumer: Sync {
    type Message: Message;

    /// Blocks for at most `timeout`; `Ok(None)` means nothing arrived.
    fn receive(&self, timeout: Duration) -> Result<Option<Self::Message>, BrokerError>;
    fn close(self) -> Result<(), BrokerError>;
}
