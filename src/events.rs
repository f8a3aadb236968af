//! The named observable signals, implemented as a thin broadcast channel
//! rather than exposing the underlying Redis transport, so logging,
//! metrics, and test assertions can all observe the same stream
//! independently without coupling to whatever produced it.

use tokio::sync::broadcast;

use crate::job::{Job, JobId};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// A completion is either a specific job finishing, or a worker-level
/// summary (e.g. when it stops itself after a processed-job cap).
#[derive(Debug, Clone)]
pub enum CompletedPayload {
    Job(Job),
    Summary(String),
}

#[derive(Debug, Clone)]
pub enum QueueEvent {
    Ready,
    Added(Job),
    Removed(JobId),
    Paused,
    Resumed,
    Closed,
    Error(String),
    Processing(Job),
    Failed(Job, String),
    Retrying(Job),
    Completed(CompletedPayload),
}

/// An in-process broadcast of `QueueEvent`s. Lagging receivers silently
/// drop old events; this is best-effort observability, not a delivery
/// guarantee.
#[derive(Clone)]
pub struct EventEmitter {
    sender: broadcast::Sender<QueueEvent>,
}

impl EventEmitter {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.sender.subscribe()
    }

    /// Broadcasts an event. A send with no subscribers is not an error.
    pub fn emit(&self, event: QueueEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_observes_emitted_events() {
        let emitter = EventEmitter::new();
        let mut rx = emitter.subscribe();

        emitter.emit(QueueEvent::Ready);
        emitter.emit(QueueEvent::Paused);

        assert!(matches!(rx.recv().await.unwrap(), QueueEvent::Ready));
        assert!(matches!(rx.recv().await.unwrap(), QueueEvent::Paused));
    }

    #[test]
    fn emit_without_subscribers_does_not_panic() {
        let emitter = EventEmitter::new();
        emitter.emit(QueueEvent::Closed);
    }
}
