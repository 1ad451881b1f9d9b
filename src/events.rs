//! Event fan-out
//!
//! One broadcast channel carries every outward notification (selection
//! changes, default-device changes, errors, profile results). Consumers
//! subscribe for a receiver and unsubscribe by dropping it.

use tokio::sync::broadcast;
use tracing::trace;

use crate::device::{DeviceIdentity, Direction};
use crate::profile::ActivationReport;

/// Buffered events per subscriber before the slowest one starts lagging
const EVENT_CAPACITY: usize = 64;

/// Notification emitted by the switching core
#[derive(Debug, Clone)]
pub enum Event {
    /// The selected set for `direction` changed; `devices` is the new snapshot
    SelectionChanged {
        direction: Direction,
        devices: Vec<DeviceIdentity>,
    },
    /// The OS default for `direction` settled on `device` (None if no default)
    DefaultChanged {
        direction: Direction,
        device: Option<DeviceIdentity>,
    },
    /// A cycle found nothing selected and present
    NoDevices { direction: Direction },
    /// Outcome of a profile activation
    ProfileActivated(ActivationReport),
}

/// Cloneable handle to the event channel
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    /// Publish to all current subscribers
    pub fn publish(&self, event: Event) {
        // No subscribers is fine (e.g. one-shot CLI commands)
        if let Err(broadcast::error::SendError(event)) = self.tx.send(event) {
            trace!("Event dropped, no subscribers: {:?}", event);
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
