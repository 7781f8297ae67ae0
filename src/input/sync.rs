//! Freeze/thaw bookkeeping for synchronous grabs
//!
//! A synchronous grab stops a device's delivery: events are parked in a
//! server-wide FIFO until the grabbing client says how to proceed. The state
//! machine here only records state; walking the registry and draining the
//! queue is the dispatcher's job, since replay touches every device.

use std::collections::VecDeque;

use super::event::{DeviceEvent, EventKind};
use super::grab::GrabId;
use super::DeviceId;

/// Freeze state of one device.
///
/// The variants order by "how frozen": everything at or past
/// [`SyncState::FrozenNoEvent`] has delivery suspended.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SyncState {
    /// No grab is armed for synchronization
    #[default]
    NotGrabbed,
    /// A synchronous grab was allowed asynchronously; delivery flows
    Thawed,
    /// Deliver one event, then freeze again
    FreezeNextEvent,
    /// Deliver one event, then freeze this device and its pair
    FreezeBothNextEvent,
    /// Frozen, no event captured yet
    FrozenNoEvent,
    /// Frozen holding a captured event awaiting client disposition
    FrozenWithEvent,
}

/// Per-device synchronization record.
#[derive(Debug, Default, Clone)]
pub struct SyncRecord {
    /// Own freeze state
    pub state: SyncState,
    /// Grab on another device that also freezes this one
    pub other: Option<GrabId>,
    /// Event captured by a freeze, pending replay or discard
    pub event: Option<DeviceEvent>,
}

impl SyncRecord {
    /// Whether delivery for the device is currently suspended.
    pub fn frozen(&self) -> bool {
        self.other.is_some() || self.state >= SyncState::FrozenNoEvent
    }

    /// Reset to the unarmed state, dropping any captured event.
    pub fn clear(&mut self) {
        *self = SyncRecord::default();
    }
}

/// Client instruction releasing a frozen device.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AllowEvents {
    /// Resume unrestricted delivery for this device
    AsyncThis,
    /// Deliver the next event, then freeze again
    SyncThis,
    /// Redeliver the captured event as if the grab never matched, and
    /// deactivate the grab
    Replay,
    /// Resume unrestricted delivery for this device and its pair
    AsyncBoth,
    /// Deliver the next event, then freeze this device and its pair
    SyncBoth,
}

/// One parked event.
#[derive(Debug, Clone)]
pub struct QueuedEvent {
    /// Device the event belongs to
    pub device: DeviceId,
    /// The event itself
    pub event: DeviceEvent,
}

/// Server-wide FIFO of events parked by frozen devices.
///
/// A single queue rather than one per device keeps cross-device arrival
/// order observable through replay.
#[derive(Debug, Default)]
pub struct PendingQueue {
    events: VecDeque<QueuedEvent>,
    /// Set while the queue is being drained, so replayed events are not
    /// re-parked by the freeze check they re-enter through
    pub playing: bool,
}

impl PendingQueue {
    /// Park an event.
    ///
    /// Consecutive motion events of the same device compress to the
    /// newest one; positions between them were never observable anyway.
    pub fn enqueue(&mut self, device: DeviceId, event: DeviceEvent) {
        if event.kind == EventKind::Motion {
            if let Some(tail) = self.events.back_mut() {
                if tail.device == device && tail.event.kind == EventKind::Motion {
                    tail.event = event;
                    return;
                }
            }
        }
        self.events.push_back(QueuedEvent { device, event });
    }

    /// Remove and return the first parked event of an unfrozen device.
    ///
    /// `frozen` reports whether a device is still frozen at this point of
    /// the drain. Returns `None` when every remaining event belongs to a
    /// frozen device.
    pub fn pop_playable(&mut self, frozen: impl Fn(DeviceId) -> bool) -> Option<QueuedEvent> {
        let index = self.events.iter().position(|queued| !frozen(queued.device))?;
        self.events.remove(index)
    }

    /// Whether any event of `device` is parked.
    pub fn has_events_for(&self, device: DeviceId) -> bool {
        self.events.iter().any(|queued| queued.device == device)
    }

    /// Drop all parked events of `device`.
    pub fn drop_device(&mut self, device: DeviceId) {
        self.events.retain(|queued| queued.device != device);
    }

    /// Whether no event is parked.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of parked events.
    pub fn len(&self) -> usize {
        self.events.len()
    }
}
