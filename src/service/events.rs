use serde::Serialize;
use tokio::sync::broadcast;

use crate::SessionId;

use super::ServicePorts;

/// Notifications for an embedding application that prefers message passing
/// over callbacks, e.g. to hop onto its own event loop.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DialEvent {
    ServiceStarted {
        ports: ServicePorts,
    },
    ServiceStopped,
    Started {
        app: String,
        session: SessionId,
        url: String,
    },
    Hidden {
        app: String,
        session: SessionId,
    },
    Stopped {
        app: String,
        session: SessionId,
    },
}

#[derive(Clone)]
pub struct EventSink {
    tx: broadcast::Sender<DialEvent>,
}

impl EventSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DialEvent> {
        self.tx.subscribe()
    }

    /// Never blocks; dropped when nobody listens.
    pub fn publish(&self, event: DialEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new(100)
    }
}
