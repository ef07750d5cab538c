use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{CourtId, Event};

const CHANNEL_CAPACITY: usize = 256;

/// Per-court change feed. Subscribers learn that a court's occupancy moved
/// and should re-query availability; the event itself is advisory.
pub struct NotifyHub {
    channels: DashMap<CourtId, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    pub fn subscribe(&self, court_id: CourtId) -> broadcast::Receiver<Event> {
        self.channels
            .entry(court_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// No-op when nobody listens to `court_id`.
    pub fn send(&self, court_id: CourtId, event: &Event) {
        if let Some(sender) = self.channels.get(&court_id) {
            let _ = sender.send(event.clone());
        }
    }

    /// Courts with an open channel.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Drop channels whose subscribers have all gone away.
    pub fn prune(&self) -> usize {
        let before = self.channels.len();
        self.channels.retain(|_, sender| sender.receiver_count() > 0);
        before - self.channels.len()
    }
}
