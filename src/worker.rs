use crate::broker::Consumer;
use crate::envelope::EventBuilder;
use crate::queue::EventQueue;
use crate::report::error_hash;
use crate::shutdown::StopSignal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, error, warn};

const TRANSIENT_BACKOFF_BASE_MS: u64 = 100;
const TRANSIENT_BACKOFF_MAX_MS: u64 = 5_000;

#[derive(Debug, Default)]
pub struct WorkerStats {
    pub received: AtomicU64,
    pub pushed: AtomicU64,
    pub skipped: AtomicU64,
    pub transient_failures: AtomicU64,
    pub backoff_ms: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub received: u64,
    pub pushed: u64,
    pub skipped: u64,
    pub transient_failures: u64,
    pub backoff_ms: u64,
}

impl WorkerStats {
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            received: self.received.load(Ordering::Relaxed),
            pushed: self.pushed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            transient_failures: self.transient_failures.load(Ordering::Relaxed),
            backoff_ms: self.backoff_ms.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    Stopped,
    QueueClosed,
    Fatal,
}

/// Receives from one consumer until the stop signal is observed.
pub struct ConsumerWorker<'a, C: Consumer, Q: EventQueue> {
    pub index: usize,
    pub consumer: &'a C,
    pub builder: &'a EventBuilder,
    pub queue: &'a Q,
    pub stop: &'a StopSignal,
    pub stats: &'a WorkerStats,
    pub receive_timeout: Duration,
}

impl<C: Consumer, Q: EventQueue> ConsumerWorker<'_, C, Q> {
    pub fn run(&self) -> WorkerExit {
        debug!(worker = self.index, "consumer worker started");
        let mut consecutive_failures = 0u32;

        // A message already received is always pushed before the stop check.
        loop {
            if self.stop.is_stopped() {
                debug!(worker = self.index, "consumer worker observed stop signal");
                return WorkerExit::Stopped;
            }

            let message = match self.consumer.receive(self.receive_timeout) {
                Ok(Some(message)) => message,
                Ok(None) => continue,
                Err(failure) if failure.is_fatal() => {
                    error!(
                        worker = self.index,
                        error = %error_hash(&failure),
                        "fatal session error; shutting down connector"
                    );
                    self.stop.fail();
                    return WorkerExit::Fatal;
                }
                Err(failure) => {
                    self.stats.transient_failures.fetch_add(1, Ordering::Relaxed);
                    let backoff = retry_backoff_ms(
                        TRANSIENT_BACKOFF_BASE_MS,
                        TRANSIENT_BACKOFF_MAX_MS,
                        consecutive_failures,
                    );
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    self.stats.backoff_ms.fetch_add(backoff, Ordering::Relaxed);
                    warn!(
                        worker = self.index,
                        attempt = consecutive_failures,
                        backoff_ms = backoff,
                        error = %error_hash(&failure),
                        "transient broker error; continuing to receive"
                    );
                    self.stop.wait_timeout(Duration::from_millis(backoff));
                    continue;
                }
            };

            consecutive_failures = 0;
            self.stats.received.fetch_add(1, Ordering::Relaxed);

            let event = match self.builder.build(&message) {
                Ok(event) => event,
                Err(failure) => {
                    self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        worker = self.index,
                        error = %error_hash(&failure),
                        "skipping message that could not be converted"
                    );
                    continue;
                }
            };

            if self.queue.push(event).is_err() {
                warn!(worker = self.index, "output queue closed; stopping connector");
                self.stop.request_stop();
                return WorkerExit::QueueClosed;
            }
            self.stats.pushed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

pub fn retry_backoff_ms(base_ms: u64, max_ms: u64, attempt_index: u32) -> u64 {
    let exponent = attempt_index.min(31);
    let scaled = base_ms.saturating_mul(1u64 << exponent);
    scaled.min(max_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MessageBody;
    use crate::config::{Codec, ResolvedConfig};
    use crate::error::BrokerError;
    use crate::testing::{MemoryConsumer, RecordingQueue, Script, TestMessage};

    fn builder(codec: Codec) -> EventBuilder {
        EventBuilder::from_config(&ResolvedConfig {
            destination: "orders".to_string(),
            codec,
            ..ResolvedConfig::default()
        })
    }

    fn run_worker(
        consumer: &MemoryConsumer,
        builder: &EventBuilder,
        queue: &RecordingQueue,
        stop: &StopSignal,
    ) -> (WorkerExit, RunSummary) {
        let stats = WorkerStats::default();
        let exit = ConsumerWorker {
            index: 0,
            consumer,
            builder,
            queue,
            stop,
            stats: &stats,
            receive_timeout: Duration::from_millis(5),
        }
        .run();
        (exit, stats.summary())
    }

    #[test]
    fn backoff_caps_at_max() {
        assert_eq!(retry_backoff_ms(100, 1000, 0), 100);
        assert_eq!(retry_backoff_ms(100, 1000, 1), 200);
        assert_eq!(retry_backoff_ms(100, 1000, 2), 400);
        assert_eq!(retry_backoff_ms(100, 1000, 3), 800);
        assert_eq!(retry_backoff_ms(100, 1000, 4), 1000);
        assert_eq!(retry_backoff_ms(100, 1000, 40), 1000);
    }

    #[test]
    fn pushes_every_message_then_stops() {
        let stop = StopSignal::new();
        let queue = RecordingQueue::stopping_after(2, stop.clone());
        let consumer = MemoryConsumer::scripted(vec![
            Script::Message(TestMessage::text("first")),
            Script::Message(TestMessage::text("second")),
        ]);

        let (exit, summary) = run_worker(&consumer, &builder(Codec::Plain), &queue, &stop);

        assert_eq!(exit, WorkerExit::Stopped);
        assert_eq!(summary.pushed, 2);
        let bodies = queue
            .events()
            .into_iter()
            .map(|event| event.message)
            .collect::<Vec<_>>();
        assert_eq!(
            bodies,
            vec![
                Some(serde_json::json!("first")),
                Some(serde_json::json!("second"))
            ]
        );
    }

    #[test]
    fn transient_failure_is_logged_and_receiving_continues() {
        let stop = StopSignal::new();
        let queue = RecordingQueue::stopping_after(1, stop.clone());
        let consumer = MemoryConsumer::scripted(vec![
            Script::Fail(BrokerError::transient("broker restarting")),
            Script::Message(TestMessage::text("after outage")),
        ]);

        let (exit, summary) = run_worker(&consumer, &builder(Codec::Plain), &queue, &stop);

        assert_eq!(exit, WorkerExit::Stopped);
        assert_eq!(summary.transient_failures, 1);
        assert_eq!(summary.pushed, 1);
        assert!(!stop.is_fatal());
    }

    #[test]
    fn empty_polls_between_failures_keep_the_backoff_growing() {
        let stop = StopSignal::new();
        let queue = RecordingQueue::stopping_after(1, stop.clone());
        let consumer = MemoryConsumer::scripted(vec![
            Script::Fail(BrokerError::transient("broker down")),
            Script::Timeout,
            Script::Fail(BrokerError::transient("broker still down")),
            Script::Message(TestMessage::text("recovered")),
        ]);

        let (exit, summary) = run_worker(&consumer, &builder(Codec::Plain), &queue, &stop);

        assert_eq!(exit, WorkerExit::Stopped);
        assert_eq!(summary.transient_failures, 2);
        assert_eq!(
            summary.backoff_ms,
            TRANSIENT_BACKOFF_BASE_MS + 2 * TRANSIENT_BACKOFF_BASE_MS
        );
        assert_eq!(summary.pushed, 1);
    }

    #[test]
    fn fatal_failure_stops_worker_and_signals_shutdown() {
        let stop = StopSignal::new();
        let queue = RecordingQueue::default();
        let consumer = MemoryConsumer::scripted(vec![
            Script::Fail(BrokerError::fatal("session invalidated")),
            Script::Message(TestMessage::text("never received")),
        ]);

        let (exit, summary) = run_worker(&consumer, &builder(Codec::Plain), &queue, &stop);

        assert_eq!(exit, WorkerExit::Fatal);
        assert!(stop.is_fatal());
        assert_eq!(summary.received, 0);
        assert!(queue.events().is_empty());
    }

    #[test]
    fn unconvertible_message_is_skipped() {
        let stop = StopSignal::new();
        let queue = RecordingQueue::stopping_after(1, stop.clone());
        let consumer = MemoryConsumer::scripted(vec![
            Script::Message(TestMessage::with_body(MessageBody::Text("{broken".to_string()))),
            Script::Message(TestMessage::with_body(MessageBody::Text(
                r#"{"ok":true}"#.to_string(),
            ))),
        ]);

        let (exit, summary) = run_worker(&consumer, &builder(Codec::Json), &queue, &stop);

        assert_eq!(exit, WorkerExit::Stopped);
        assert_eq!(summary.received, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.pushed, 1);
        assert_eq!(
            queue.events()[0].message,
            Some(serde_json::json!({"ok": true}))
        );
    }

    #[test]
    fn closed_queue_stops_worker() {
        let stop = StopSignal::new();
        let queue = RecordingQueue::closed();
        let consumer = MemoryConsumer::scripted(vec![Script::Message(TestMessage::text("lost"))]);

        let (exit, _) = run_worker(&consumer, &builder(Codec::Plain), &queue, &stop);

        assert_eq!(exit, WorkerExit::QueueClosed);
        assert!(stop.is_stopped());
        assert!(!stop.is_fatal());
    }

    #[test]
    fn idle_worker_exits_on_stop() {
        let stop = StopSignal::new();
        let queue = RecordingQueue::default();
        let consumer = MemoryConsumer::scripted(Vec::new());
        let stopper = stop.clone();

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            stopper.request_stop();
        });

        let (exit, summary) = run_worker(&consumer, &builder(Codec::Plain), &queue, &stop);
        handle.join().expect("stopper thread");

        assert_eq!(exit, WorkerExit::Stopped);
        assert_eq!(summary, RunSummary::default());
    }
}
