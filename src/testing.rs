use crate::broker::{
    Broker, Connection, ConnectionParams, Consumer, ConsumerMode, Message, MessageBody, Session,
};
use crate::error::BrokerError;
use crate::queue::{EventQueue, QueueClosed};
use crate::shutdown::StopSignal;
use ingest_core::model::{Event, PropertyMap};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestMessage {
    pub body: Option<MessageBody>,
    pub properties: Option<PropertyMap>,
    pub headers: Option<PropertyMap>,
}

impl TestMessage {
    pub fn text(body: &str) -> Self {
        Self::with_body(MessageBody::Text(body.to_string()))
    }

    pub fn with_body(body: MessageBody) -> Self {
        Self {
            body: Some(body),
            ..Self::default()
        }
    }
}

impl Message for TestMessage {
    fn body(&self) -> Option<&MessageBody> {
        self.body.as_ref()
    }

    fn properties(&self) -> Option<&PropertyMap> {
        self.properties.as_ref()
    }

    fn headers(&self) -> Option<&PropertyMap> {
        self.headers.as_ref()
    }
}

pub enum Script {
    Message(TestMessage),
    Fail(BrokerError),
    /// One empty poll.
    Timeout,
}

type Journal = Arc<Mutex<Vec<String>>>;

fn record(journal: &Journal, entry: impl Into<String>) {
    journal
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .push(entry.into());
}

pub struct MemoryConsumer {
    index: usize,
    script: Mutex<VecDeque<Script>>,
    journal: Journal,
    fail_close: bool,
}

impl MemoryConsumer {
    pub fn scripted(script: Vec<Script>) -> Self {
        Self {
            index: 0,
            script: Mutex::new(script.into()),
            journal: Journal::default(),
            fail_close: false,
        }
    }
}

impl Consumer for MemoryConsumer {
    type Message = TestMessage;

    fn receive(&self, timeout: Duration) -> Result<Option<TestMessage>, BrokerError> {
        let next = self
            .script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front();
        match next {
            Some(Script::Message(message)) => Ok(Some(message)),
            Some(Script::Fail(error)) => Err(error),
            Some(Script::Timeout) | None => {
                thread::sleep(timeout);
                Ok(None)
            }
        }
    }

    fn close(self) -> Result<(), BrokerError> {
        record(&self.journal, format!("consumer {} closed", self.index));
        if self.fail_close {
            return Err(BrokerError::transient("consumer close failed"));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct BrokerBehavior {
    pub fail_connect: bool,
    pub fail_consumer_at: Option<usize>,
    pub fail_consumer_close: bool,
}

#[derive(Default)]
struct Shared {
    scripts: Mutex<VecDeque<Vec<Script>>>,
    behavior: BrokerBehavior,
    journal: Journal,
    consumers_created: Mutex<usize>,
    modes: Mutex<Vec<(String, ConsumerMode)>>,
    params: Mutex<Option<ConnectionParams>>,
}

/// Scripted broker; each created consumer takes the next script in order.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    shared: Arc<Shared>,
}

impl MemoryBroker {
    pub fn new(scripts: Vec<Vec<Script>>, behavior: BrokerBehavior) -> Self {
        Self {
            shared: Arc::new(Shared {
                scripts: Mutex::new(scripts.into()),
                behavior,
                ..Shared::default()
            }),
        }
    }

    pub fn journal(&self) -> Vec<String> {
        self.shared
            .journal
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn modes(&self) -> Vec<(String, ConsumerMode)> {
        self.shared
            .modes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn params(&self) -> Option<ConnectionParams> {
        self.shared
            .params
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Broker for MemoryBroker {
    type Connection = MemoryConnection;

    fn connect(&self, params: &ConnectionParams) -> Result<MemoryConnection, BrokerError> {
        *self
            .shared
            .params
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(params.clone());
        if self.shared.behavior.fail_connect {
            return Err(BrokerError::fatal("connection refused"));
        }
        record(&self.shared.journal, "connection opened");
        Ok(MemoryConnection {
            shared: self.shared.clone(),
        })
    }
}

pub struct MemoryConnection {
    shared: Arc<Shared>,
}

impl Connection for MemoryConnection {
    type Session = MemorySession;

    fn session(&self) -> Result<MemorySession, BrokerError> {
        record(&self.shared.journal, "session opened");
        Ok(MemorySession {
            shared: self.shared.clone(),
        })
    }

    fn close(self) -> Result<(), BrokerError> {
        record(&self.shared.journal, "connection closed");
        Ok(())
    }
}

pub struct MemorySession {
    shared: Arc<Shared>,
}

impl Session for MemorySession {
    type Consumer = MemoryConsumer;

    fn consumer(
        &self,
        destination: &str,
        mode: &ConsumerMode,
    ) -> Result<MemoryConsumer, BrokerError> {
        let mut created = self
            .shared
            .consumers_created
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let index = *created;
        if self.shared.behavior.fail_consumer_at == Some(index) {
            return Err(BrokerError::fatal("destination does not exist"));
        }
        *created += 1;

        self.shared
            .modes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((destination.to_string(), mode.clone()));
        let script = self
            .shared
            .scripts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
            .unwrap_or_default();
        record(&self.shared.journal, format!("consumer {index} opened"));

        Ok(MemoryConsumer {
            index,
            script: Mutex::new(script.into()),
            journal: self.shared.journal.clone(),
            fail_close: self.shared.behavior.fail_consumer_close,
        })
    }

    fn close(self) -> Result<(), BrokerError> {
        record(&self.shared.journal, "session closed");
        Ok(())
    }
}

/// Collects pushed events; optionally requests a stop after `n` pushes.
#[derive(Default)]
pub struct RecordingQueue {
    events: Mutex<Vec<Event>>,
    stop_after: Option<(usize, StopSignal)>,
    closed: bool,
}

impl RecordingQueue {
    pub fn stopping_after(count: usize, stop: StopSignal) -> Self {
        Self {
            stop_after: Some((count, stop)),
            ..Self::default()
        }
    }

    pub fn closed() -> Self {
        Self {
            closed: true,
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl EventQueue for RecordingQueue {
    fn push(&self, event: Event) -> Result<(), QueueClosed> {
        if self.closed {
            return Err(QueueClosed);
        }
        let mut events = self
            .events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        events.push(event);
        if let Some((count, stop)) = &self.stop_after {
            if events.len() >= *count {
                stop.request_stop();
            }
        }
        Ok(())
    }
}
