use crate::broker::{Broker, Connection, ConnectionParams, Consumer, Session};
use crate::config::ResolvedConfig;
use crate::envelope::EventBuilder;
use crate::error::{BrokerError, ConnectorError};
use crate::queue::EventQueue;
use crate::report::error_hash;
use crate::shutdown::StopSignal;
use crate::validate::ValidatedConfig;
use crate::worker::{ConsumerWorker, RunSummary, WorkerExit, WorkerStats};
use std::thread;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unconnected,
    Connected,
    Consuming,
    Closed,
}

/// Owns the connection, the shared session and every consumer for one run.
pub struct SessionManager<'a, B: Broker> {
    broker: &'a B,
    settings: &'a ValidatedConfig,
    state: SessionState,
}

impl<'a, B: Broker> SessionManager<'a, B> {
    pub fn new(broker: &'a B, settings: &'a ValidatedConfig) -> Self {
        Self {
            broker,
            settings,
            state: SessionState::Unconnected,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn run<Q: EventQueue>(
        &mut self,
        queue: &Q,
        stop: &StopSignal,
    ) -> Result<RunSummary, ConnectorError> {
        let settings = self.settings;
        let config = &settings.config;
        let params = connection_params(settings);

        let connection = match self.broker.connect(&params) {
            Ok(connection) => connection,
            Err(failure) => {
                error!(error = %error_hash(&failure), "broker connection failed");
                self.transition(SessionState::Closed);
                return Err(failure.into());
            }
        };

        let session = match connection.session() {
            Ok(session) => session,
            Err(failure) => {
                error!(error = %error_hash(&failure), "broker session creation failed");
                close_best_effort("connection", connection.close());
                self.transition(SessionState::Closed);
                return Err(failure.into());
            }
        };
        self.transition(SessionState::Connected);

        let mut consumers = Vec::with_capacity(config.threads);
        for index in 0..config.threads {
            match session.consumer(&config.destination, &settings.mode) {
                Ok(consumer) => consumers.push(consumer),
                Err(failure) => {
                    error!(
                        worker = index,
                        destination = %config.destination,
                        error = %error_hash(&failure),
                        "consumer creation failed"
                    );
                    teardown(consumers, session, connection);
                    self.transition(SessionState::Closed);
                    return Err(failure.into());
                }
            }
        }
        self.transition(SessionState::Consuming);

        info!(
            destination = %config.destination,
            mode = settings.mode.as_str(),
            threads = config.threads,
            "consuming from broker"
        );

        let builder = EventBuilder::from_config(config);
        let stats = WorkerStats::default();
        let outcome = run_workers(&consumers, &builder, queue, stop, &stats, config);

        teardown(consumers, session, connection);
        self.transition(SessionState::Closed);

        let summary = stats.summary();
        info!(
            received = summary.received,
            pushed = summary.pushed,
            skipped = summary.skipped,
            transient_failures = summary.transient_failures,
            backoff_ms = summary.backoff_ms,
            "connector stopped"
        );

        outcome.map(|()| summary)
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = ?self.state, to = ?next, "session state transition");
        self.state = next;
    }
}

/// Runs one thread per consumer; a fatal worker outranks a closed queue.
fn run_workers<C: Consumer, Q: EventQueue>(
    consumers: &[C],
    builder: &EventBuilder,
    queue: &Q,
    stop: &StopSignal,
    stats: &WorkerStats,
    config: &ResolvedConfig,
) -> Result<(), ConnectorError> {
    let receive_timeout = config.receive_timeout();

    thread::scope(|scope| {
        let mut fatal_worker = None;
        let mut queue_closed = false;
        let mut handles = Vec::with_capacity(consumers.len());
        for (index, consumer) in consumers.iter().enumerate() {
            let worker = ConsumerWorker {
                index,
                consumer,
                builder,
                queue,
                stop,
                stats,
                receive_timeout,
            };
            let spawned = thread::Builder::new()
                .name(format!("broker-ingest-worker-{index}"))
                .spawn_scoped(scope, move || worker.run());
            match spawned {
                Ok(handle) => handles.push((index, handle)),
                Err(spawn_error) => {
                    error!(worker = index, error = %spawn_error, "failed to spawn consumer worker");
                    stop.fail();
                    fatal_worker.get_or_insert(index);
                    break;
                }
            }
        }

        for (index, handle) in handles {
            let exit = handle.join().unwrap_or_else(|_| {
                error!(worker = index, "consumer worker panicked");
                stop.fail();
                WorkerExit::Fatal
            });
            match exit {
                WorkerExit::Fatal => {
                    fatal_worker.get_or_insert(index);
                }
                WorkerExit::QueueClosed => queue_closed = true,
                WorkerExit::Stopped => {}
            }
        }

        match (fatal_worker, queue_closed) {
            (Some(worker), _) => Err(ConnectorError::FatalSession { worker }),
            (None, true) => Err(ConnectorError::QueueClosed),
            (None, false) => Ok(()),
        }
    })
}

fn connection_params(settings: &ValidatedConfig) -> ConnectionParams {
    let config = &settings.config;
    ConnectionParams {
        broker_url: config.broker_url.clone(),
        factory: config.factory.clone(),
        username: config.username.clone(),
        password: config.password.clone(),
        require_jars: config.require_jars.clone(),
        client_id: config.durable_subscriber_client_id.clone(),
        factory_settings: config.factory_settings.clone(),
    }
}

/// Closes consumers, then the session, then the connection; failures are only logged.
fn teardown<C, S, N>(consumers: Vec<C>, session: S, connection: N)
where
    C: Consumer,
    S: Session<Consumer = C>,
    N: Connection<Session = S>,
{
    for (index, consumer) in consumers.into_iter().enumerate() {
        if let Err(failure) = consumer.close() {
            warn!(worker = index, error = %error_hash(&failure), "failed to close consumer");
        }
    }
    close_best_effort("session", session.close());
    close_best_effort("connection", connection.close());
}

fn close_best_effort(resource: &'static str, result: Result<(), BrokerError>) {
    if let Err(failure) = result {
        warn!(resource, error = %error_hash(&failure), "failed to close broker resource");
    }
}
