// Push-update fan-out for real-time viewers.
//
// Best-effort signal, not a source of truth: viewers that care about
// accuracy re-read the row. Lagging or dropped subscribers never fail the
// transition that published the update.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub spool_id: String,
    pub status: String,
    pub occupied_by: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StatusFeed {
    tx: broadcast::Sender<StatusUpdate>,
}

impl StatusFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusUpdate> {
        self.tx.subscribe()
    }

    pub fn publish(&self, update: StatusUpdate) {
        match self.tx.send(update) {
            Ok(receivers) => debug!(receivers, "status update published"),
            // No live subscribers; nothing to do.
            Err(_) => debug!("status update dropped, no subscribers"),
        }
    }
}

impl Default for StatusFeed {
    fn default() -> Self {
        Self::new(64)
    }
}
