//! Mask-based event delivery
//!
//! Clients select event masks on windows; delivery walks from the event
//! window towards the root and hands the event to every interested client of
//! the first window that has one. A per-window union of selected and
//! propagated masks is kept cached so uninteresting events are dropped
//! without walking the tree.

use std::collections::HashMap;

use indexmap::IndexMap;
use tracing::trace;

use super::device::DeviceRegistry;
use super::event::{DeviceEvent, Event, EventKind, EventMask, WindowEvent};
use super::{ClientId, DispatchHandler, WindowId};

/// Outcome of one delivery attempt.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// At least one client received the event; the first recipient and the
    /// mask it selected are recorded
    Delivered {
        /// Window the event was delivered on
        window: WindowId,
        /// First client that received it
        client: ClientId,
        /// That client's selected mask on the window
        mask: EventMask,
    },
    /// An interested client refused the event; propagation stops without a
    /// recipient
    Rejected,
    /// No client was interested
    None,
}

/// Errors raised by event selection.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SelectionError {
    /// Another client already selected a mask bit that admits only one
    /// client per window
    #[error("mask {0:?} is already selected by another client on this window")]
    AlreadySelected(EventMask),
}

#[derive(Debug, Default)]
struct WindowSelections {
    clients: Vec<(ClientId, EventMask)>,
    dont_propagate: EventMask,
}

impl WindowSelections {
    fn union(&self) -> EventMask {
        self.clients
            .iter()
            .fold(EventMask::empty(), |acc, (_, mask)| acc | *mask)
    }
}

/// Per-window client event selections, with a cached deliverable summary.
#[derive(Debug, Default)]
pub struct Selections {
    windows: IndexMap<WindowId, WindowSelections>,
    deliverable: HashMap<WindowId, EventMask>,
}

impl Selections {
    /// Set a client's selection on a window. An empty mask removes the
    /// selection.
    ///
    /// Bits in [`EventMask::AT_MOST_ONE_CLIENT`] may only be held by one
    /// client per window at a time.
    pub fn select<D: DispatchHandler>(
        &mut self,
        data: &mut D,
        window: WindowId,
        client: ClientId,
        mask: EventMask,
    ) -> Result<(), SelectionError> {
        let contested = mask & EventMask::AT_MOST_ONE_CLIENT;
        if !contested.is_empty() {
            if let Some(selections) = self.windows.get(&window) {
                let taken = selections
                    .clients
                    .iter()
                    .filter(|(other, _)| *other != client)
                    .fold(EventMask::empty(), |acc, (_, mask)| acc | *mask);
                if taken.intersects(contested) {
                    return Err(SelectionError::AlreadySelected(taken & contested));
                }
            }
        }
        let selections = self.windows.entry(window).or_default();
        selections.clients.retain(|(other, _)| *other != client);
        if !mask.is_empty() {
            selections.clients.push((client, mask));
        }
        self.recompute(data, window);
        Ok(())
    }

    /// Set the window's dont-propagate mask, stopping upward propagation of
    /// the named events at this window.
    pub fn set_dont_propagate<D: DispatchHandler>(
        &mut self,
        data: &mut D,
        window: WindowId,
        mask: EventMask,
    ) {
        self.windows.entry(window).or_default().dont_propagate = mask;
        self.recompute(data, window);
    }

    /// The window's dont-propagate mask.
    pub fn dont_propagate(&self, window: WindowId) -> EventMask {
        self.windows
            .get(&window)
            .map(|selections| selections.dont_propagate)
            .unwrap_or_default()
    }

    /// Union of all selections on a window.
    pub fn mask_of(&self, window: WindowId) -> EventMask {
        self.windows
            .get(&window)
            .map(WindowSelections::union)
            .unwrap_or_default()
    }

    /// A specific client's selection on a window.
    pub fn client_mask(&self, window: WindowId, client: ClientId) -> EventMask {
        self.windows
            .get(&window)
            .and_then(|selections| {
                selections
                    .clients
                    .iter()
                    .find(|(owner, _)| *owner == client)
                    .map(|(_, mask)| *mask)
            })
            .unwrap_or_default()
    }

    /// Cached union of events deliverable somewhere at or below the walk
    /// through this window, own selections plus propagated ancestors.
    pub fn deliverable(&self, window: WindowId) -> EventMask {
        self.deliverable.get(&window).copied().unwrap_or_default()
    }

    /// Recompute the deliverable summary for a window and its subtree.
    pub fn recompute<D: DispatchHandler>(&mut self, data: &mut D, window: WindowId) {
        let inherited = data
            .parent(window)
            .map(|parent| self.deliverable(parent) & EventMask::PROPAGATED)
            .unwrap_or_default();
        self.recompute_from(data, window, inherited);
    }

    fn recompute_from<D: DispatchHandler>(
        &mut self,
        data: &mut D,
        window: WindowId,
        inherited: EventMask,
    ) {
        let (own, dont_propagate) = self
            .windows
            .get(&window)
            .map(|selections| (selections.union(), selections.dont_propagate))
            .unwrap_or_default();
        let deliverable = own | (inherited & !dont_propagate);
        self.deliverable.insert(window, deliverable);
        for child in data.children(window) {
            self.recompute_from(data, child, deliverable & EventMask::PROPAGATED);
        }
    }

    /// Drop all selections owned by `client`.
    pub fn remove_client<D: DispatchHandler>(&mut self, data: &mut D, client: ClientId) {
        let mut touched = Vec::new();
        for (window, selections) in self.windows.iter_mut() {
            let before = selections.clients.len();
            selections.clients.retain(|(owner, _)| *owner != client);
            if selections.clients.len() != before {
                touched.push(*window);
            }
        }
        for window in touched {
            self.recompute(data, window);
        }
    }

    /// Drop all selections on a destroyed window.
    pub fn remove_window(&mut self, window: WindowId) {
        self.windows.shift_remove(&window);
        self.deliverable.remove(&window);
    }

    /// Clients whose selection on `window` matches `filter`.
    pub fn interested(&self, window: WindowId, filter: EventMask) -> Vec<ClientId> {
        self.clients(window)
            .iter()
            .filter(|(_, mask)| mask.intersects(filter))
            .map(|(client, _)| *client)
            .collect()
    }

    fn clients(&self, window: WindowId) -> &[(ClientId, EventMask)] {
        self.windows
            .get(&window)
            .map(|selections| selections.clients.as_slice())
            .unwrap_or(&[])
    }
}

/// Whether delivering `event` to `client` would interfere with a device
/// grab the same client holds elsewhere.
///
/// A client actively grabbing one pointer must not receive another
/// pointer's key or button events through ordinary selection; the grab is
/// its exclusive channel for those. Motion keeps flowing, and a grab on
/// the event's own device never interferes with itself.
pub fn is_interfering(registry: &DeviceRegistry, client: ClientId, event: &DeviceEvent) -> bool {
    if event.kind == EventKind::Motion {
        return false;
    }
    let own_grab = registry
        .get(event.device)
        .ok()
        .and_then(|dev| dev.grab.as_ref());
    if own_grab.map_or(false, |active| active.grab.client == client) {
        return false;
    }
    registry.other_masters(event.device).any(|device| {
        match &device.grab {
            Some(active) => {
                active.grab.client == client
                    && !active.from_passive
                    && device.kind.is_pointer() == event.kind.is_pointer()
            }
            None => false,
        }
    })
}

/// Deliver an event to the clients selecting for it on one window.
///
/// `restrict_to` limits delivery to one client, used while that client's
/// grab is held.
pub fn deliver_to_window<D: DispatchHandler>(
    data: &mut D,
    selections: &Selections,
    registry: &DeviceRegistry,
    window: WindowId,
    child: Option<WindowId>,
    event: &DeviceEvent,
    restrict_to: Option<ClientId>,
) -> Delivery {
    let filter = event.kind.filter();
    let mut first: Option<(ClientId, EventMask)> = None;
    let mut recipients = Vec::new();
    for (client, mask) in selections.clients(window) {
        if !mask.intersects(filter) {
            continue;
        }
        if let Some(only) = restrict_to {
            if *client != only {
                continue;
            }
        }
        if is_interfering(registry, *client, event) {
            continue;
        }
        if !data.allow_delivery(window, *client, event) {
            return Delivery::Rejected;
        }
        recipients.push(*client);
        if first.is_none() {
            first = Some((*client, *mask));
        }
    }
    let Some((client, mask)) = first else {
        return Delivery::None;
    };
    let wrapped = Event::Device(WindowEvent {
        raw: event.clone(),
        window,
        child,
    });
    for recipient in recipients {
        data.deliver(window, recipient, &wrapped);
    }
    Delivery::Delivered {
        window,
        client,
        mask,
    }
}

/// Deliver an event by walking from `start` towards the root.
///
/// The walk stops at the first window with an interested client, at a
/// window whose dont-propagate mask names the event, or after processing
/// `stop_at`.
pub fn deliver_device_event<D: DispatchHandler>(
    data: &mut D,
    selections: &Selections,
    registry: &DeviceRegistry,
    start: WindowId,
    event: &DeviceEvent,
    stop_at: Option<WindowId>,
    restrict_to: Option<ClientId>,
) -> Delivery {
    let filter = event.kind.filter();
    let mut window = start;
    let mut child = None;
    loop {
        match deliver_to_window(data, selections, registry, window, child, event, restrict_to) {
            delivered @ Delivery::Delivered { .. } => return delivered,
            Delivery::Rejected => return Delivery::Rejected,
            Delivery::None => {}
        }
        if stop_at == Some(window) {
            trace!(?window, "propagation boundary reached");
            return Delivery::None;
        }
        if selections.dont_propagate(window).intersects(filter) {
            return Delivery::None;
        }
        child = Some(window);
        match data.parent(window) {
            Some(parent) => window = parent,
            None => return Delivery::None,
        }
    }
}
