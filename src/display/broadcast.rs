use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use crate::reconcile::Renderer;
use crate::state::OperationalState;

/// Event published to display subscribers.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DisplayEvent {
    /// Current canonical state, sent for every accepted message.
    State { state: OperationalState },
    /// Something changed and was sent for persistence.
    Updated { at: DateTime<Utc> },
}

/// Fans display events out to any number of subscribers.
///
/// Lagging subscribers lose the oldest events; having no subscribers at all
/// is fine.
pub struct BroadcastRenderer {
    tx: broadcast::Sender<DisplayEvent>,
}

impl BroadcastRenderer {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DisplayEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    fn publish(&self, event: DisplayEvent) {
        // No subscribers is fine
        if self.tx.send(event).is_err() {
            trace!("No display subscribers");
        }
    }
}

impl Default for BroadcastRenderer {
    fn default() -> Self {
        Self::new(64)
    }
}

impl Renderer for BroadcastRenderer {
    fn render(&self, state: OperationalState) {
        self.publish(DisplayEvent::State { state });
    }

    fn notify(&self) {
        self.publish(DisplayEvent::Updated { at: Utc::now() });
    }
}
