// ── Event bus ──
//
// In-process pub/sub for store change notifications. An explicitly
// constructed instance owned by the composition root and handed to the
// store -- no ambient global. Emission is synchronous: in-process
// subscribers observe an event strictly after the mutation it followed
// completed. Cross-tab/external notifications re-enter through the same
// bus with `ChangeOrigin::External` and must be treated as possibly
// stale: re-derive from the store, never trust a notification payload.
//
// No events are queued or replayed for late subscribers; a component
// that subscribes after a change has already fired must re-fetch the
// current store state on mount.

use tokio::sync::broadcast;

use crate::store::EntityKind;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Where a change originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// A mutator on this store instance.
    Local,
    /// Another widget instance / tab, observed through storage-change
    /// notifications.
    External,
}

/// A store change notification. Carries no payload on purpose:
/// subscribers re-read the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreEvent {
    pub kind: EntityKind,
    pub origin: ChangeOrigin,
}

impl StoreEvent {
    /// The logical event name, e.g. `"activities-updated"` -- the sole
    /// vocabulary consumers subscribe to.
    pub fn name(&self) -> String {
        self.kind.event_name()
    }
}

/// Cheaply cloneable pub/sub handle.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<StoreEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Emit an event to all current subscribers. Send errors (no active
    /// subscribers) are ignored.
    pub fn emit(&self, kind: EntityKind, origin: ChangeOrigin) {
        let _ = self.tx.send(StoreEvent { kind, origin });
    }

    /// Subscribe to all store events. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
