//! Event bus for fusion engine notifications

use gimbal_core::FusionEvent;

use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

/// Broadcasts engine events to any number of listeners
///
/// Publishing never blocks; with no receivers the event is only kept in
/// the history ring.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<FusionEvent>,
    history: Arc<RwLock<VecDeque<FusionEvent>>>,
    max_history: usize,
    event_count: Arc<RwLock<u64>>,
}

impl EventBus {
    /// Create a new event bus
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        let max_history = 256;

        Self {
            sender,
            history: Arc::new(RwLock::new(VecDeque::with_capacity(max_history))),
            max_history,
            event_count: Arc::new(RwLock::new(0)),
        }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<FusionEvent> {
        self.sender.subscribe()
    }

    /// Publish an event
    pub fn publish(&self, event: FusionEvent) {
        {
            let mut history = self.history.write();
            history.push_back(event.clone());
            if history.len() > self.max_history {
                history.pop_front();
            }
        }

        *self.event_count.write() += 1;

        // No receivers is not an error
        let _ = self.sender.send(event);

        trace!("Event published, total: {}", self.event_count());
    }

    /// Get recent events, oldest first
    pub fn recent(&self, count: usize) -> Vec<FusionEvent> {
        let history = self.history.read();
        let start = history.len().saturating_sub(count);
        history.iter().skip(start).cloned().collect()
    }

    pub fn event_count(&self) -> u64 {
        *self.event_count.read()
    }

    /// Get subscriber count (approximate)
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
