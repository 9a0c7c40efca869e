use ingest_core::model::Event;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("output queue is closed")]
pub struct QueueClosed;

/// Downstream bounded queue shared by every consumer worker.
///
/// `push` blocks while the queue is full; that stall is the only flow control
/// the connector applies.
pub trait EventQueue: Sync {
    fn push(&self, event: Event) -> Result<(), QueueClosed>;
}

/// Must be called from a plain thread, never from inside the async runtime.
impl EventQueue for mpsc::Sender<Event> {
    fn push(&self, event: Event) -> Result<(), QueueClosed> {
        self.blocking_send(event).map_err(|_| QueueClosed)
    }
}
