//! Grab types and the passive-grab registry
//!
//! A [`Grab`] is a client's claim on a device's events. Registered against
//! future input it is *passive*; installed on a device it is *active*. The
//! same value describes both, only the bookkeeping around it differs.
//!
//! Grabs carry a protocol-level tag through their [`GrabMask`]: one press
//! event can independently match a basic grab view and either extended view,
//! and delivery walks the levels from most to least specific.

use std::collections::HashMap;

use indexmap::IndexMap;

use super::event::{DeviceEvent, EventKind, EventMask, Modifiers};
use super::{ClientId, CursorId, DeviceId, WindowId};

/// Outcome of a grab request, reported to the requesting client.
///
/// These are values, not errors: every variant is a legitimate answer the
/// caller turns into user-visible behavior.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum GrabStatus {
    /// The grab is installed
    Success,
    /// Another client already holds a grab on the device
    AlreadyGrabbed,
    /// The grab or confine-to window is not viewable
    NotViewable,
    /// The request timestamp is outside [last-grab time, current time]
    InvalidTime,
    /// The device is frozen by another client's synchronous grab
    Frozen,
}

/// Synchronicity of one half of a grab.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum GrabMode {
    /// Events keep flowing while the grab is held
    #[default]
    Async,
    /// The device freezes on the next event until the client allows more
    Sync,
}

/// Key code or button number a passive grab matches.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum GrabDetail {
    /// Match any detail
    Any,
    /// Match exactly this key code / button number
    Exact(u32),
}

impl GrabDetail {
    fn matches(self, detail: u32) -> bool {
        match self {
            GrabDetail::Any => true,
            GrabDetail::Exact(want) => want == detail,
        }
    }
}

/// Modifier state a passive grab matches.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum GrabModifiers {
    /// Match any modifier combination
    Any,
    /// Match exactly this combination
    Exact(Modifiers),
}

impl GrabModifiers {
    fn matches(self, modifiers: Modifiers) -> bool {
        match self {
            GrabModifiers::Any => true,
            GrabModifiers::Exact(want) => want == modifiers,
        }
    }
}

/// Event mask of a grab, tagged by protocol level.
///
/// Each level carries only the fields that level knows about; delivery
/// matches on the variant exhaustively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrabMask {
    /// Basic protocol: one mask, device-agnostic
    Basic(EventMask),
    /// First extension level: a mask plus the device mask recorded at
    /// implicit-grab time
    ExtendedV1 {
        /// Events the grabbing client asked for
        event_mask: EventMask,
        /// Events selected on the grab window at activation time
        device_mask: EventMask,
    },
    /// Second extension level: per-device masks
    ExtendedV2 {
        /// Mask per device id
        masks: HashMap<DeviceId, EventMask>,
    },
}

impl GrabMask {
    /// The effective mask for events of `device` under this grab.
    pub fn mask_for(&self, device: DeviceId, implicit: bool) -> EventMask {
        match self {
            GrabMask::Basic(mask) => *mask,
            GrabMask::ExtendedV1 {
                event_mask,
                device_mask,
            } => {
                if implicit {
                    *device_mask
                } else {
                    *event_mask
                }
            }
            GrabMask::ExtendedV2 { masks } => masks.get(&device).copied().unwrap_or_default(),
        }
    }

    /// Whether this mask is device-agnostic (basic protocol).
    pub fn is_basic(&self) -> bool {
        matches!(self, GrabMask::Basic(_))
    }
}

/// A client's claim on a device's events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grab {
    /// Target window of the grab
    pub window: WindowId,
    /// Owning client
    pub client: ClientId,
    /// Grabbed device
    pub device: DeviceId,
    /// Press kind this grab triggers on, [`EventKind::ButtonPress`] or
    /// [`EventKind::KeyPress`]
    pub kind: EventKind,
    /// Keyboard supplying the modifier state for passive matching; `None`
    /// uses the device's paired master keyboard
    pub modifier_device: Option<DeviceId>,
    /// Key/button a passive registration matches
    pub detail: GrabDetail,
    /// Modifier state a passive registration matches
    pub modifiers: GrabModifiers,
    /// Level-tagged event mask
    pub mask: GrabMask,
    /// Whether events inside the grab window still follow window masks
    pub owner_events: bool,
    /// Synchronicity for the pointer half
    pub pointer_mode: GrabMode,
    /// Synchronicity for the keyboard half
    pub keyboard_mode: GrabMode,
    /// Window the sprite is confined to while the grab is held
    pub confine_to: Option<WindowId>,
    /// Cursor shown while the grab is held
    pub cursor: Option<CursorId>,
}

impl Grab {
    /// Whether this passive registration matches an incoming press event.
    ///
    /// Basic-level grabs are device-agnostic; extended levels require the
    /// exact device. The modifier state is the keyboard state captured in
    /// the event itself.
    pub fn matches_event(&self, event: &DeviceEvent) -> bool {
        if event.kind != self.kind {
            return false;
        }
        if !self.mask.is_basic() && self.device != event.device {
            return false;
        }
        self.detail.matches(event.detail) && self.modifiers.matches(event.modifiers)
    }

    /// Whether two passive registrations would match the same events.
    ///
    /// Used to reject conflicting duplicate registrations; wildcards only
    /// conflict with themselves, an exact registration may coexist with a
    /// wildcard one.
    pub fn conflicts_with(&self, other: &Grab) -> bool {
        if self.mask.is_basic() != other.mask.is_basic() {
            return false;
        }
        if !self.mask.is_basic() && self.device != other.device {
            return false;
        }
        self.kind == other.kind
            && self.detail == other.detail
            && self.modifiers == other.modifiers
    }
}

/// Identity of one grab activation.
///
/// Freeze pairing stores which grab froze a device; comparing activations by
/// id rather than by value keeps teardown order irrelevant.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct GrabId(pub(super) u64);

/// A grab installed on a device.
#[derive(Debug, Clone)]
pub struct ActiveGrab {
    /// Activation identity
    pub id: GrabId,
    /// The grab itself
    pub grab: Grab,
    /// When the grab activated
    pub time: crate::utils::Timestamp,
    /// Whether the grab came from a passive registration
    pub from_passive: bool,
    /// Whether the grab was created implicitly by a button press
    pub implicit: bool,
}

/// Passive-grab registrations, keyed by target window.
///
/// Scanning order is registration order and the first match wins; this is
/// the observable tie-break between registrations at different wildcard
/// specificities.
#[derive(Debug, Default)]
pub struct PassiveGrabs {
    grabs: IndexMap<WindowId, Vec<Grab>>,
}

impl PassiveGrabs {
    /// Register a passive grab on its target window.
    ///
    /// Fails with [`GrabStatus::AlreadyGrabbed`] if another client already
    /// registered a grab matching the same (device, detail, modifiers)
    /// tuple on the window.
    pub fn register(&mut self, grab: Grab) -> GrabStatus {
        let list = self.grabs.entry(grab.window).or_default();
        if list
            .iter()
            .any(|other| other.client != grab.client && other.conflicts_with(&grab))
        {
            return GrabStatus::AlreadyGrabbed;
        }
        // re-registering the same tuple replaces the old entry in place
        if let Some(existing) = list
            .iter_mut()
            .find(|other| other.client == grab.client && other.conflicts_with(&grab))
        {
            *existing = grab;
        } else {
            list.push(grab);
        }
        GrabStatus::Success
    }

    /// Remove a client's registration for an exact (device, detail,
    /// modifiers) tuple.
    pub fn unregister(
        &mut self,
        window: WindowId,
        client: ClientId,
        device: DeviceId,
        detail: GrabDetail,
        modifiers: GrabModifiers,
    ) {
        if let Some(list) = self.grabs.get_mut(&window) {
            list.retain(|grab| {
                !(grab.client == client
                    && grab.device == device
                    && grab.detail == detail
                    && grab.modifiers == modifiers)
            });
        }
    }

    /// All registrations on a window, in registration order.
    pub fn on_window(&self, window: WindowId) -> &[Grab] {
        self.grabs.get(&window).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Drop every registration owned by `client`.
    pub fn remove_client(&mut self, client: ClientId) {
        for list in self.grabs.values_mut() {
            list.retain(|grab| grab.client != client);
        }
    }

    /// Drop every registration targeting `window`.
    pub fn remove_window(&mut self, window: WindowId) {
        self.grabs.shift_remove(&window);
    }
}
