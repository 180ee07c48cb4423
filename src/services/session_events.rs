use chrono::Utc;
use tokio::sync::broadcast;
use tracing::trace;

use super::session::Session;
use crate::models::{SessionEvent, SessionEventKind};

const EVENT_CHANNEL_CAPACITY: usize = 128;

/// Fan-out of session lifecycle events to `/events` subscribers
#[derive(Clone)]
pub struct SessionEvents {
    sender: broadcast::Sender<SessionEvent>,
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionEvents {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, session: &Session, kind: SessionEventKind) {
        let event = SessionEvent {
            kind,
            device_id: session.device_id().to_string(),
            session_id: session.id(),
            at: Utc::now(),
            error: session.last_error(),
        };
        // No subscribers is the normal case
        if self.sender.send(event).is_err() {
            trace!(device_id = session.device_id(), ?kind, "No event subscribers");
        }
    }
}
