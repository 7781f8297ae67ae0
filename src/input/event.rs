//! Event types produced by devices and emitted to clients
//!
//! A [`DeviceEvent`] is what the driver layer feeds into
//! [`DispatchState::process_event`](super::DispatchState::process_event): a
//! raw event in root-window coordinates, not yet attributed to any window.
//! The dispatcher turns it into one or more [`Event`]s, each addressed to a
//! (window, client) pair, which the embedder serializes onto the wire.

use bitflags::bitflags;

use crate::utils::{Point, Timestamp};

use super::{DeviceId, WindowId};

bitflags! {
    /// Per-window event selection mask.
    ///
    /// Clients select event classes on windows; the delivery engine matches
    /// each event's filter against these bits while walking up the tree.
    #[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct EventMask: u32 {
        /// Key press events
        const KEY_PRESS = 1 << 0;
        /// Key release events
        const KEY_RELEASE = 1 << 1;
        /// Button press events
        const BUTTON_PRESS = 1 << 2;
        /// Button release events
        const BUTTON_RELEASE = 1 << 3;
        /// Pointer motion events
        const POINTER_MOTION = 1 << 4;
        /// Enter notifications
        const ENTER_WINDOW = 1 << 5;
        /// Leave notifications
        const LEAVE_WINDOW = 1 << 6;
        /// Focus change notifications
        const FOCUS_CHANGE = 1 << 7;
        /// Keep sending pointer events to the implicit grab owner even
        /// while the pointer is inside the grab window
        const OWNER_GRAB_BUTTON = 1 << 8;
    }
}

impl EventMask {
    /// Event classes that propagate up the window tree.
    ///
    /// Crossing and focus events are generated per window and never
    /// propagate; neither does the owner-grab flag.
    pub const PROPAGATED: EventMask = EventMask::KEY_PRESS
        .union(EventMask::KEY_RELEASE)
        .union(EventMask::BUTTON_PRESS)
        .union(EventMask::BUTTON_RELEASE)
        .union(EventMask::POINTER_MOTION);

    /// Event classes only one client at a time may select on a window.
    pub const AT_MOST_ONE_CLIENT: EventMask = EventMask::BUTTON_PRESS;
}

bitflags! {
    /// Keyboard modifier state at the time of an event.
    #[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct Modifiers: u16 {
        /// Shift
        const SHIFT = 1 << 0;
        /// Caps lock
        const LOCK = 1 << 1;
        /// Control
        const CONTROL = 1 << 2;
        /// Mod1 (usually Alt)
        const MOD1 = 1 << 3;
        /// Mod2 (usually Num lock)
        const MOD2 = 1 << 4;
        /// Mod3
        const MOD3 = 1 << 5;
        /// Mod4 (usually Super)
        const MOD4 = 1 << 6;
        /// Mod5
        const MOD5 = 1 << 7;
    }
}

/// Class of a raw device event.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// The pointer moved
    Motion,
    /// A pointer button went down
    ButtonPress,
    /// A pointer button went up
    ButtonRelease,
    /// A key went down
    KeyPress,
    /// A key went up
    KeyRelease,
}

impl EventKind {
    /// The selection-mask filter matching this event class.
    pub fn filter(self) -> EventMask {
        match self {
            EventKind::Motion => EventMask::POINTER_MOTION,
            EventKind::ButtonPress => EventMask::BUTTON_PRESS,
            EventKind::ButtonRelease => EventMask::BUTTON_RELEASE,
            EventKind::KeyPress => EventMask::KEY_PRESS,
            EventKind::KeyRelease => EventMask::KEY_RELEASE,
        }
    }

    /// Whether this class comes from a pointer device
    pub fn is_pointer(self) -> bool {
        matches!(
            self,
            EventKind::Motion | EventKind::ButtonPress | EventKind::ButtonRelease
        )
    }

    /// Whether this class comes from a keyboard device
    pub fn is_keyboard(self) -> bool {
        matches!(self, EventKind::KeyPress | EventKind::KeyRelease)
    }

    /// Whether this is a press event that can trigger grab activation
    pub fn is_press(self) -> bool {
        matches!(self, EventKind::ButtonPress | EventKind::KeyPress)
    }
}

/// A raw event as produced by an input device.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DeviceEvent {
    /// Device that produced the event
    pub device: DeviceId,
    /// Event class
    pub kind: EventKind,
    /// Key code or button number
    pub detail: u32,
    /// Keyboard modifier state at event time
    pub modifiers: Modifiers,
    /// Event time
    pub time: Timestamp,
    /// Pointer position in root-window coordinates
    pub root_pos: Point,
}

/// Why a crossing or focus event was generated.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CrossingMode {
    /// Ordinary pointer motion or focus change
    Normal,
    /// Transition caused by a grab activation
    Grab,
    /// Transition caused by a grab deactivation
    Ungrab,
}

/// Relationship between the event window and the device's old/new window.
///
/// The classic ancestor/virtual/nonlinear taxonomy, extended with the
/// focus-only details.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CrossingDetail {
    /// The window is an ancestor of the origin/destination
    Ancestor,
    /// The window lies between the origin and destination
    Virtual,
    /// The window is a descendant of the origin/destination
    Inferior,
    /// Origin and destination are unrelated
    Nonlinear,
    /// The window lies between a common ancestor and origin/destination
    NonlinearVirtual,
    /// Focus only: the window holds the pointer while focus is elsewhere
    Pointer,
    /// Focus only: focus reverted to pointer-root
    PointerRoot,
    /// Focus only: focus reverted to none
    DetailNone,
}

/// An Enter or Leave notification addressed to one window.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CrossingEvent {
    /// Device whose pointer crossed
    pub device: DeviceId,
    /// `true` for Enter, `false` for Leave
    pub entered: bool,
    /// Why the crossing happened
    pub mode: CrossingMode,
    /// Relation of the event window to the crossing
    pub detail: CrossingDetail,
    /// Window the event is addressed to
    pub window: WindowId,
    /// Child of the event window containing the pointer, if any
    pub child: Option<WindowId>,
}

/// A FocusIn or FocusOut notification addressed to one window.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FocusEvent {
    /// Keyboard device whose focus changed
    pub device: DeviceId,
    /// `true` for FocusIn, `false` for FocusOut
    pub focused: bool,
    /// Why the focus changed
    pub mode: CrossingMode,
    /// Relation of the event window to the focus change
    pub detail: CrossingDetail,
    /// Window the event is addressed to
    pub window: WindowId,
}

/// A device event attributed to a window.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct WindowEvent {
    /// The raw device event
    pub raw: DeviceEvent,
    /// Window the event is addressed to
    pub window: WindowId,
    /// Child of the event window the event actually happened in, if any
    pub child: Option<WindowId>,
}

/// An event ready for serialization to one client.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Event {
    /// A key/button/motion event attributed to a window
    Device(WindowEvent),
    /// An Enter/Leave notification
    Crossing(CrossingEvent),
    /// A FocusIn/FocusOut notification
    Focus(FocusEvent),
}

impl Event {
    /// The selection-mask filter this event is matched against.
    pub fn filter(&self) -> EventMask {
        match self {
            Event::Device(ev) => ev.raw.kind.filter(),
            Event::Crossing(ev) => {
                if ev.entered {
                    EventMask::ENTER_WINDOW
                } else {
                    EventMask::LEAVE_WINDOW
                }
            }
            Event::Focus(_) => EventMask::FOCUS_CHANGE,
        }
    }

    /// The window this event is addressed to.
    pub fn window(&self) -> WindowId {
        match self {
            Event::Device(ev) => ev.window,
            Event::Crossing(ev) => ev.window,
            Event::Focus(ev) => ev.window,
        }
    }
}
