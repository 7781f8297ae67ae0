//! Input dispatch for a multi-device window server
//!
//! This module routes raw device events to clients. The embedder supplies
//! the window tree and the wire layer through [`DispatchHandler`]; the
//! [`DispatchState`] owns everything else: devices, grabs, event
//! selections, the freeze queue and the crossing presence table.
//!
//! An event travels through a fixed pipeline. A frozen device's events are
//! parked; otherwise the sprite moves and crossings fire, an active grab
//! claims the event, a press may activate a passive grab, and finally
//! ordinary mask-based delivery walks the window tree. Synchronous grabs
//! suspend the pipeline per device until the grabbing client releases it
//! with [`DispatchState::allow_events`].
//!
//! ```no_run
//! # use seatcore::input::{DispatchState, DispatchHandler, ClientId, CursorId, DeviceId, WindowId};
//! # use seatcore::input::event::{DeviceEvent, Event};
//! # use seatcore::utils::{Point, Rectangle};
//! struct Server { /* window tree, client connections */ }
//!
//! impl DispatchHandler for Server {
//!     fn root(&self) -> WindowId { WindowId(1) }
//!     # fn parent(&self, _: WindowId) -> Option<WindowId> { None }
//!     # fn children(&self, _: WindowId) -> Vec<WindowId> { Vec::new() }
//!     # fn is_viewable(&self, _: WindowId) -> bool { true }
//!     # fn border_box(&self, _: WindowId) -> Option<Rectangle> { None }
//!     # fn window_at(&self, _: Point) -> WindowId { WindowId(1) }
//!     fn deliver(&mut self, window: WindowId, client: ClientId, event: &Event) {
//!         // serialize onto the client's connection
//!     }
//!     // remaining methods elided
//! }
//!
//! let mut server = Server { };
//! let mut state: DispatchState<Server> = DispatchState::new();
//! let (pointer, keyboard) = state.add_master_pair(&mut server, "seat0");
//! # let raw: DeviceEvent = todo!();
//! state.process_event(&mut server, raw);
//! ```

use tracing::{debug, debug_span, info, trace, warn};

use crate::utils::{Point, Rectangle, Timestamp};

pub mod crossing;
pub mod delivery;
pub mod device;
pub mod event;
pub mod filter;
pub mod focus;
pub mod grab;
pub mod sprite;
pub mod sync;

pub use delivery::{Delivery, SelectionError};
pub use device::{DeviceError, DeviceKind};
pub use event::{DeviceEvent, Event, EventKind, EventMask, Modifiers};
pub use filter::{FilterId, FilterResult};
pub use focus::{FocusWindow, RevertTo};
pub use grab::{Grab, GrabDetail, GrabMask, GrabMode, GrabModifiers, GrabStatus};
pub use sync::AllowEvents;

use crossing::Presence;
use delivery::Selections;
use device::{Device, DeviceRegistry};
use event::{CrossingMode, WindowEvent};
use filter::KeyFilterChain;
use grab::{ActiveGrab, GrabId, PassiveGrabs};
use sync::{PendingQueue, SyncState};

/// Identity of a window in the embedder's tree.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(pub u32);

/// Identity of a connected client.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ClientId(pub u32);

/// Identity of an input device.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(pub u32);

/// Identity of a cursor image owned by the embedder.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct CursorId(pub u32);

/// Trait implemented by the embedding server.
///
/// The read side describes the window tree; the write side receives the
/// events the dispatcher addressed to (window, client) pairs.
pub trait DispatchHandler: Sized {
    /// The root window.
    fn root(&self) -> WindowId;
    /// A window's parent, `None` for the root.
    fn parent(&self, window: WindowId) -> Option<WindowId>;
    /// A window's children, bottom-most first.
    fn children(&self, window: WindowId) -> Vec<WindowId>;
    /// Whether the window is mapped and all its ancestors are.
    fn is_viewable(&self, window: WindowId) -> bool;
    /// The window's border box in root coordinates, `None` when it has no
    /// visible area.
    fn border_box(&self, window: WindowId) -> Option<Rectangle>;
    /// The deepest viewable window containing a root-space position.
    fn window_at(&self, pos: Point) -> WindowId;

    /// Serialize one event to one client.
    fn deliver(&mut self, window: WindowId, client: ClientId, event: &Event);

    /// Veto hook consulted before each device-event delivery. Returning
    /// `false` rejects the event for this window and stops propagation.
    fn allow_delivery(&mut self, _window: WindowId, _client: ClientId, _event: &DeviceEvent) -> bool {
        true
    }

    /// The cursor to show for a device changed; `None` restores the
    /// window-defined cursor.
    fn cursor_changed(&mut self, _device: DeviceId, _cursor: Option<CursorId>) {}
}

/// Errors surfaced by dispatch requests.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// A device lookup failed
    #[error(transparent)]
    Device(#[from] DeviceError),
    /// An event selection was rejected
    #[error(transparent)]
    Selection(#[from] SelectionError),
    /// The request names a window with no visible area
    #[error("window {0:?} is not viewable")]
    NotViewable(WindowId),
    /// The request needs a keyboard but the device has no focus class
    #[error("device {0:?} is not a keyboard")]
    NotAKeyboard(DeviceId),
    /// The request needs a pointer but the device has no sprite
    #[error("device {0:?} is not a pointer")]
    NotAPointer(DeviceId),
}

/// Parameters of an active-grab request.
///
/// Split out of the argument list because every field except the window is
/// optional in practice.
#[derive(Debug, Clone)]
pub struct GrabRequest {
    /// Window the grab reports events relative to
    pub window: WindowId,
    /// Whether events inside the grab window still follow window masks
    pub owner_events: bool,
    /// Event mask of the grab
    pub mask: GrabMask,
    /// Synchronicity of the pointer half
    pub pointer_mode: GrabMode,
    /// Synchronicity of the keyboard half
    pub keyboard_mode: GrabMode,
    /// Window to confine the sprite to
    pub confine_to: Option<WindowId>,
    /// Cursor to show while grabbed
    pub cursor: Option<CursorId>,
    /// Client time of the request
    pub time: Timestamp,
}

/// The input-dispatch core.
///
/// One instance per server. All methods take the embedder as `data` so the
/// dispatcher can query the window tree and push deliveries while holding
/// its own state mutably.
pub struct DispatchState<D: DispatchHandler> {
    devices: DeviceRegistry,
    passive_grabs: PassiveGrabs,
    selections: Selections,
    presence: Presence,
    filters: KeyFilterChain<D>,
    pending: PendingQueue,
    /// Device and propagation boundary of a pending replay
    replay: Option<(DeviceId, WindowId)>,
    next_grab_id: u64,
    current_time: Timestamp,
}

impl<D: DispatchHandler> Default for DispatchState<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: DispatchHandler> std::fmt::Debug for DispatchState<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchState")
            .field("devices", &self.devices)
            .field("pending", &self.pending)
            .field("replay", &self.replay)
            .finish_non_exhaustive()
    }
}

impl<D: DispatchHandler> DispatchState<D> {
    /// Create an empty dispatch state with no devices.
    pub fn new() -> Self {
        DispatchState {
            devices: DeviceRegistry::default(),
            passive_grabs: PassiveGrabs::default(),
            selections: Selections::default(),
            presence: Presence::default(),
            filters: KeyFilterChain::default(),
            pending: PendingQueue::default(),
            replay: None,
            next_grab_id: 0,
            current_time: Timestamp(0),
        }
    }

    // ------------------------------------------------------------------
    // devices

    /// Create a paired master pointer and keyboard. The pointer starts on
    /// the root window, the keyboard focus at pointer-root.
    pub fn add_master_pair(&mut self, data: &mut D, name: &str) -> (DeviceId, DeviceId) {
        let root = data.root();
        let (pointer, keyboard) = self.devices.add_master_pair(name, root);
        self.presence.note_pointer(pointer, root);
        self.presence.note_focus(keyboard, FocusWindow::PointerRoot);
        info!(?pointer, ?keyboard, name, "master pair added");
        (pointer, keyboard)
    }

    /// Attach a slave device; its events route through the master.
    pub fn add_slave(
        &mut self,
        name: &str,
        master: DeviceId,
        pointer: bool,
    ) -> Result<DeviceId, DeviceError> {
        self.devices.add_slave(name, master, pointer)
    }

    /// Remove a device, releasing its grab and dropping its parked events.
    pub fn remove_device(&mut self, data: &mut D, device: DeviceId) -> Result<(), DeviceError> {
        self.deactivate_grab(data, device);
        self.pending.drop_device(device);
        self.presence.remove_device(device);
        // anything frozen by this device's grab thaws with it
        self.devices.remove(device)?;
        self.compute_freezes(data);
        Ok(())
    }

    /// The window currently under a pointer's sprite.
    pub fn pointer_window(&self, device: DeviceId) -> Option<WindowId> {
        self.devices.get(device).ok()?.sprite_window()
    }

    /// A keyboard's current focus.
    pub fn focus_of(&self, device: DeviceId) -> Option<FocusWindow> {
        Some(self.devices.get(device).ok()?.focus.as_ref()?.win)
    }

    /// The grab currently installed on a device.
    pub fn active_grab(&self, device: DeviceId) -> Option<&ActiveGrab> {
        self.devices.get(device).ok()?.grab.as_ref()
    }

    /// Whether a device's delivery is currently suspended.
    pub fn is_frozen(&self, device: DeviceId) -> bool {
        self.devices
            .get(device)
            .map(|dev| dev.sync.frozen())
            .unwrap_or(false)
    }

    /// Number of events parked in the freeze queue.
    pub fn pending_events(&self) -> usize {
        self.pending.len()
    }

    // ------------------------------------------------------------------
    // selections and filters

    /// Set a client's event selection on a window.
    pub fn select_input(
        &mut self,
        data: &mut D,
        window: WindowId,
        client: ClientId,
        mask: EventMask,
    ) -> Result<(), SelectionError> {
        self.selections.select(data, window, client, mask)
    }

    /// Stop the named event classes from propagating past a window.
    pub fn set_dont_propagate(&mut self, data: &mut D, window: WindowId, mask: EventMask) {
        self.selections.set_dont_propagate(data, window, mask);
    }

    /// Register a key filter for events addressed to `window`.
    pub fn register_key_filter<F>(&mut self, window: WindowId, filter: F) -> FilterId
    where
        F: FnMut(&mut D, &DeviceEvent) -> FilterResult + Send + 'static,
    {
        self.filters.register(window, filter)
    }

    /// Remove a key filter.
    pub fn unregister_key_filter(&mut self, id: FilterId) {
        self.filters.unregister(id);
    }

    // ------------------------------------------------------------------
    // focus

    /// Move a keyboard's focus.
    ///
    /// A request with a stale timestamp is ignored without error, so racing
    /// clients cannot fight over the focus out of order.
    pub fn set_input_focus(
        &mut self,
        data: &mut D,
        device: DeviceId,
        focus: FocusWindow,
        revert_to: RevertTo,
        time: Timestamp,
    ) -> Result<(), DispatchError> {
        let device = self.devices.master_of(device)?;
        let (old, focus_time, grabbed) = {
            let dev = self.devices.get(device)?;
            let state = dev
                .focus
                .as_ref()
                .ok_or(DispatchError::NotAKeyboard(device))?;
            (state.win, state.time, dev.grab.is_some())
        };
        if !time.is_no_older_than(&focus_time) || !self.current_time.is_no_older_than(&time) {
            trace!(?device, ?time, "stale focus request ignored");
            return Ok(());
        }
        if let FocusWindow::Window(win) = focus {
            if !data.is_viewable(win) {
                return Err(DispatchError::NotViewable(win));
            }
        }
        // focus events wait until the grab releases the keyboard
        if !grabbed {
            self.emit_focus_change(data, device, old, focus, CrossingMode::Normal);
        }
        let dev = self.devices.get_mut(device)?;
        if let Some(state) = dev.focus.as_mut() {
            state.retrace(data, focus);
            state.revert_to = revert_to;
            state.time = time;
        }
        debug!(?device, ?focus, "input focus changed");
        Ok(())
    }

    // ------------------------------------------------------------------
    // grabs

    /// Install an active grab on a device.
    ///
    /// The returned status is the protocol-visible answer; only lookup
    /// failures are errors.
    pub fn grab_device(
        &mut self,
        data: &mut D,
        client: ClientId,
        device: DeviceId,
        request: GrabRequest,
    ) -> Result<GrabStatus, DispatchError> {
        let device = self.devices.master_of(device)?;
        let (held_by_other, grab_time, frozen_other) = {
            let dev = self.devices.get(device)?;
            let held = dev
                .grab
                .as_ref()
                .map(|active| active.grab.client != client)
                .unwrap_or(false);
            (held, dev.grab_time, dev.sync.other)
        };
        if held_by_other {
            return Ok(GrabStatus::AlreadyGrabbed);
        }
        let confine_ok = match request.confine_to {
            Some(confine) => {
                data.is_viewable(confine)
                    && data.border_box(confine).map_or(false, |b| !b.is_empty())
            }
            None => true,
        };
        if !data.is_viewable(request.window) || !confine_ok {
            return Ok(GrabStatus::NotViewable);
        }
        if !request.time.is_no_older_than(&grab_time)
            || !self.current_time.is_no_older_than(&request.time)
        {
            return Ok(GrabStatus::InvalidTime);
        }
        if self.is_frozen(device) {
            if let Some(other) = frozen_other {
                if self.grab_owner(other) != Some(client) {
                    return Ok(GrabStatus::Frozen);
                }
            }
        }
        let kind = if self.devices.get(device)?.kind.is_pointer() {
            EventKind::ButtonPress
        } else {
            EventKind::KeyPress
        };
        let grab = Grab {
            window: request.window,
            client,
            device,
            kind,
            modifier_device: None,
            detail: GrabDetail::Any,
            modifiers: GrabModifiers::Any,
            mask: request.mask,
            owner_events: request.owner_events,
            pointer_mode: request.pointer_mode,
            keyboard_mode: request.keyboard_mode,
            confine_to: request.confine_to,
            cursor: request.cursor,
        };
        self.activate_grab(data, device, grab, request.time, false, false);
        Ok(GrabStatus::Success)
    }

    /// Release a client's active grab on a device. Stale timestamps and
    /// grabs held by other clients are ignored.
    pub fn ungrab_device(
        &mut self,
        data: &mut D,
        client: ClientId,
        device: DeviceId,
        time: Timestamp,
    ) -> Result<(), DeviceError> {
        let device = self.devices.master_of(device)?;
        let release = {
            let dev = self.devices.get(device)?;
            match &dev.grab {
                Some(active) => {
                    active.grab.client == client
                        && time.is_no_older_than(&dev.grab_time)
                        && self.current_time.is_no_older_than(&time)
                }
                None => false,
            }
        };
        if release {
            self.deactivate_grab(data, device);
        }
        Ok(())
    }

    /// Register a passive grab, armed until the matching press arrives.
    pub fn grab_passive(&mut self, grab: Grab) -> Result<GrabStatus, DeviceError> {
        // the registration targets the routing master
        let mut grab = grab;
        grab.device = self.devices.master_of(grab.device)?;
        Ok(self.passive_grabs.register(grab))
    }

    /// Remove a passive registration matching the exact tuple.
    pub fn ungrab_passive(
        &mut self,
        window: WindowId,
        client: ClientId,
        device: DeviceId,
        detail: GrabDetail,
        modifiers: GrabModifiers,
    ) -> Result<(), DeviceError> {
        let device = self.devices.master_of(device)?;
        self.passive_grabs
            .unregister(window, client, device, detail, modifiers);
        Ok(())
    }

    // ------------------------------------------------------------------
    // freeze/thaw

    /// Release events from a device frozen by `client`'s synchronous grab.
    ///
    /// Requests from clients that neither hold nor are synced to the
    /// freezing grab, and requests with stale timestamps, are ignored.
    pub fn allow_events(
        &mut self,
        data: &mut D,
        client: ClientId,
        device: DeviceId,
        mode: AllowEvents,
        time: Timestamp,
    ) -> Result<(), DeviceError> {
        let device = self.devices.master_of(device)?;
        let (this_grabbed, my_state, my_other, mut grab_time) = {
            let dev = self.devices.get(device)?;
            (
                dev.grab
                    .as_ref()
                    .map_or(false, |active| active.grab.client == client),
                dev.sync.state,
                dev.sync.other,
                dev.grab_time,
            )
        };
        let mut this_synced = false;
        let mut other_grabbed = false;
        let mut others_frozen = false;
        for other in self.devices.iter() {
            if other.id == device {
                continue;
            }
            let Some(active) = &other.grab else { continue };
            if active.grab.client != client {
                continue;
            }
            if !(this_grabbed || other_grabbed) || other.grab_time > grab_time {
                grab_time = other.grab_time;
            }
            other_grabbed = true;
            if my_other == Some(active.id) {
                this_synced = true;
            }
            if other.sync.state >= SyncState::FrozenNoEvent {
                others_frozen = true;
            }
        }
        if !((this_grabbed && my_state >= SyncState::FrozenNoEvent) || this_synced) {
            return Ok(());
        }
        if !time.is_no_older_than(&grab_time) || !self.current_time.is_no_older_than(&time) {
            return Ok(());
        }
        debug!(?device, ?mode, "allow events");
        match mode {
            AllowEvents::AsyncThis => {
                let dev = self.devices.get_mut(device)?;
                if this_grabbed {
                    dev.sync.state = SyncState::Thawed;
                }
                if this_synced {
                    dev.sync.other = None;
                }
                self.compute_freezes(data);
            }
            AllowEvents::SyncThis => {
                if this_grabbed {
                    let dev = self.devices.get_mut(device)?;
                    dev.sync.state = SyncState::FreezeNextEvent;
                    if this_synced {
                        dev.sync.other = None;
                    }
                    self.compute_freezes(data);
                }
            }
            AllowEvents::AsyncBoth => {
                if others_frozen {
                    self.thaw_client_devices(client, SyncState::Thawed);
                    self.compute_freezes(data);
                }
            }
            AllowEvents::SyncBoth => {
                if others_frozen {
                    self.thaw_client_devices(client, SyncState::FreezeBothNextEvent);
                    self.compute_freezes(data);
                }
            }
            AllowEvents::Replay => {
                if this_grabbed && my_state == SyncState::FrozenWithEvent {
                    let boundary = {
                        let dev = self.devices.get_mut(device)?;
                        if this_synced {
                            dev.sync.other = None;
                        }
                        dev.grab.as_ref().map(|active| active.grab.window)
                    };
                    if let Some(boundary) = boundary {
                        self.replay = Some((device, boundary));
                        self.deactivate_grab(data, device);
                    }
                }
            }
        }
        Ok(())
    }

    fn thaw_client_devices(&mut self, client: ClientId, state: SyncState) {
        let owners: Vec<(DeviceId, bool, bool)> = self
            .devices
            .iter()
            .map(|dev| {
                let holds = dev
                    .grab
                    .as_ref()
                    .map_or(false, |active| active.grab.client == client);
                let synced = dev
                    .sync
                    .other
                    .map_or(false, |other| self.grab_owner(other) == Some(client));
                (dev.id, holds, synced)
            })
            .collect();
        for (id, holds, synced) in owners {
            let Ok(dev) = self.devices.get_mut(id) else { continue };
            if holds {
                dev.sync.state = state;
            }
            if synced {
                dev.sync.other = None;
            }
        }
    }

    // ------------------------------------------------------------------
    // event pipeline

    /// Feed one raw device event into the pipeline.
    pub fn process_event(&mut self, data: &mut D, event: DeviceEvent) -> Result<(), DeviceError> {
        let master = self.devices.master_of(event.device)?;
        let mut event = event;
        event.device = master;
        if event.time > self.current_time {
            self.current_time = event.time;
        }
        let span = debug_span!("dispatch", device = ?master, kind = ?event.kind);
        let _guard = span.enter();
        self.run_event(data, event);
        Ok(())
    }

    fn run_event(&mut self, data: &mut D, event: DeviceEvent) {
        let device = event.device;
        {
            let Ok(dev) = self.devices.get(device) else { return };
            if dev.sync.frozen() {
                trace!(?device, "device frozen, event parked");
                self.pending.enqueue(device, event);
                return;
            }
        }
        if let Ok(dev) = self.devices.get_mut(device) {
            match event.kind {
                EventKind::ButtonPress | EventKind::KeyPress => dev.down.press(event.detail),
                EventKind::ButtonRelease | EventKind::KeyRelease => dev.down.release(event.detail),
                EventKind::Motion => {}
            }
        }
        if event.kind.is_pointer() {
            self.update_sprite(data, device, &event);
        }

        let mut deactivate_after = false;
        if event.kind == EventKind::ButtonRelease {
            let Ok(dev) = self.devices.get(device) else { return };
            if dev.down.count() == 0 {
                if let Some(active) = &dev.grab {
                    if active.from_passive {
                        deactivate_after = true;
                    }
                }
            }
        }

        if event.kind.is_press() {
            let has_grab = self
                .devices
                .get(device)
                .map(|dev| dev.grab.is_some())
                .unwrap_or(true);
            if !has_grab && self.check_device_grabs(data, device, &event, None) {
                // a passive grab activated and delivered the event itself
                return;
            }
        }

        let has_grab = self
            .devices
            .get(device)
            .map(|dev| dev.grab.is_some())
            .unwrap_or(false);
        if has_grab {
            self.deliver_grabbed(data, device, &event, deactivate_after);
        } else if event.kind.is_keyboard() {
            let consumed = {
                let windows = self.filter_windows(device);
                self.filters.run(data, &windows, &event)
            };
            if !consumed {
                let sprite_win = self.sprite_window_of(data, device);
                self.deliver_focused(data, device, &event, sprite_win);
            }
        } else {
            let start = self.sprite_window_of(data, device);
            let outcome = delivery::deliver_device_event(
                data,
                &self.selections,
                &self.devices,
                start,
                &event,
                None,
                None,
            );
            if event.kind == EventKind::ButtonPress {
                if let Delivery::Delivered {
                    window,
                    client,
                    mask,
                } = outcome
                {
                    self.activate_implicit_grab(data, device, window, client, mask, &event);
                }
            }
        }
        if deactivate_after {
            self.deactivate_grab(data, device);
        }
    }

    fn update_sprite(&mut self, data: &mut D, device: DeviceId, event: &DeviceEvent) {
        let Some((old_win, clamped)) = self.devices.get(device).ok().and_then(|dev| {
            let sprite = dev.sprite.as_ref()?;
            Some((sprite.window(), sprite.clamp(event.root_pos)))
        }) else {
            return;
        };
        let new_win = data.window_at(clamped);
        {
            let Ok(dev) = self.devices.get_mut(device) else { return };
            let Some(sprite) = dev.sprite.as_mut() else { return };
            sprite.hot_phys = event.root_pos;
            sprite.hot = clamped;
            if new_win != old_win {
                sprite.retrace(data, new_win);
            }
        }
        if new_win != old_win {
            let grabbed = self
                .devices
                .get(device)
                .map(|dev| dev.grab.is_some())
                .unwrap_or(false);
            let mut out = Vec::new();
            crossing::pointer_crossing(
                data,
                &mut self.presence,
                device,
                grabbed,
                old_win,
                new_win,
                CrossingMode::Normal,
                &mut out,
            );
            self.emit_notifications(data, out);
        }
    }

    /// Sweep the focus and sprite traces for a passive grab matching a
    /// press event. `boundary` bounds a replay sweep to windows strictly
    /// below the deactivated grab's window, so the replayed event cannot
    /// re-match the grab it escaped from.
    fn check_device_grabs(
        &mut self,
        data: &mut D,
        device: DeviceId,
        event: &DeviceEvent,
        boundary: Option<WindowId>,
    ) -> bool {
        if !event.kind.is_press() {
            return false;
        }
        let (is_pointer, down, has_grab, focus) = {
            let Ok(dev) = self.devices.get(device) else {
                return false;
            };
            (
                dev.kind.is_pointer(),
                dev.down.count(),
                dev.grab.is_some(),
                dev.focus.clone(),
            )
        };
        if event.kind == EventKind::ButtonPress && down != 1 {
            return false;
        }
        if has_grab {
            return false;
        }
        let sprite_trace = self.sprite_trace_of(device, is_pointer);
        let mut i = 0;
        if let Some(boundary) = boundary {
            match sprite_trace.iter().position(|win| *win == boundary) {
                Some(pos) => i = pos + 1,
                None => return false,
            }
        }
        if event.kind.is_keyboard() {
            if let Some(focus) = focus {
                let mut last = None;
                while i < focus.trace.len() {
                    let win = focus.trace[i];
                    last = Some(win);
                    i += 1;
                    if self.try_passive_grab(data, win, device, event) {
                        return true;
                    }
                }
                // continue down the sprite trace only when focus follows
                // the pointer or the focus window is on the pointer's path
                if focus.win == FocusWindow::None {
                    return false;
                }
                if i >= sprite_trace.len() {
                    return false;
                }
                if let Some(last) = last {
                    if i == 0 || sprite_trace.get(i - 1) != Some(&last) {
                        return false;
                    }
                }
            }
        }
        while i < sprite_trace.len() {
            let win = sprite_trace[i];
            i += 1;
            if self.try_passive_grab(data, win, device, event) {
                return true;
            }
        }
        false
    }

    fn try_passive_grab(
        &mut self,
        data: &mut D,
        window: WindowId,
        device: DeviceId,
        event: &DeviceEvent,
    ) -> bool {
        let candidates: Vec<Grab> = self.passive_grabs.on_window(window).to_vec();
        for grab in candidates {
            if !grab.matches_event(event) {
                continue;
            }
            if let Some(confine) = grab.confine_to {
                let viewable = data.is_viewable(confine)
                    && data.border_box(confine).map_or(false, |b| !b.is_empty());
                if !viewable {
                    continue;
                }
            }
            if grab.mask.is_basic() && self.basic_grab_interferes(&grab) {
                continue;
            }
            debug!(?window, ?device, "passive grab activated");
            self.activate_passive_grab(data, device, grab, event);
            return true;
        }
        false
    }

    // A basic-level passive grab must not activate while the same client
    // already holds a basic grab on another device of the same class; the
    // client could not tell the two event streams apart.
    fn basic_grab_interferes(&self, grab: &Grab) -> bool {
        self.devices.iter().any(|other| {
            let Some(active) = &other.grab else {
                return false;
            };
            active.grab.mask.is_basic()
                && active.grab.client == grab.client
                && other.kind.is_pointer() == grab.kind.is_pointer()
        })
    }

    fn activate_passive_grab(
        &mut self,
        data: &mut D,
        device: DeviceId,
        grab: Grab,
        event: &DeviceEvent,
    ) {
        let window = grab.window;
        let client = grab.client;
        self.activate_grab(data, device, grab, event.time, true, false);
        if let Ok(dev) = self.devices.get_mut(device) {
            if dev.sync.state == SyncState::FrozenNoEvent {
                dev.sync.state = SyncState::FrozenWithEvent;
            }
            dev.sync.event = Some(*event);
        }
        // the triggering event goes straight to the grab owner
        if data.allow_delivery(window, client, event) {
            let child = self.child_below(device, window);
            let wrapped = Event::Device(WindowEvent {
                raw: *event,
                window,
                child,
            });
            data.deliver(window, client, &wrapped);
        }
    }

    fn activate_implicit_grab(
        &mut self,
        data: &mut D,
        device: DeviceId,
        window: WindowId,
        client: ClientId,
        mask: EventMask,
        event: &DeviceEvent,
    ) {
        let grab = Grab {
            window,
            client,
            device,
            kind: EventKind::ButtonPress,
            modifier_device: None,
            detail: GrabDetail::Any,
            modifiers: GrabModifiers::Any,
            owner_events: mask.contains(EventMask::OWNER_GRAB_BUTTON),
            mask: GrabMask::Basic(mask),
            pointer_mode: GrabMode::Async,
            keyboard_mode: GrabMode::Async,
            confine_to: None,
            cursor: None,
        };
        debug!(?device, ?window, ?client, "implicit grab");
        self.activate_grab(data, device, grab, event.time, true, true);
        if let Ok(dev) = self.devices.get_mut(device) {
            dev.sync.event = Some(*event);
        }
    }

    fn activate_grab(
        &mut self,
        data: &mut D,
        device: DeviceId,
        grab: Grab,
        time: Timestamp,
        from_passive: bool,
        implicit: bool,
    ) {
        self.next_grab_id += 1;
        let id = GrabId(self.next_grab_id);
        let Ok(dev) = self.devices.get(device) else { return };
        let is_pointer = dev.kind.is_pointer();
        let old_grab_window = dev.grab.as_ref().map(|active| active.grab.window);

        if is_pointer {
            if let Some(confine) = grab.confine_to {
                self.apply_confinement(data, device, Some(confine), false);
            }
            let old_win = old_grab_window.unwrap_or_else(|| self.sprite_window_of(data, device));
            let mut out = Vec::new();
            crossing::pointer_crossing(
                data,
                &mut self.presence,
                device,
                old_grab_window.is_some(),
                old_win,
                grab.window,
                CrossingMode::Grab,
                &mut out,
            );
            self.emit_notifications(data, out);
        } else {
            let old = match old_grab_window {
                Some(win) => FocusWindow::Window(win),
                None => self
                    .devices
                    .get(device)
                    .ok()
                    .and_then(|dev| dev.focus.as_ref())
                    .map(|focus| focus.win)
                    .unwrap_or(FocusWindow::PointerRoot),
            };
            self.emit_focus_change(
                data,
                device,
                old,
                FocusWindow::Window(grab.window),
                CrossingMode::Grab,
            );
        }

        let (this_mode, other_mode) = if is_pointer {
            (grab.pointer_mode, grab.keyboard_mode)
        } else {
            (grab.keyboard_mode, grab.pointer_mode)
        };
        let client = grab.client;
        let cursor = grab.cursor;
        if let Ok(dev) = self.devices.get_mut(device) {
            dev.grab = Some(ActiveGrab {
                id,
                grab,
                time,
                from_passive,
                implicit,
            });
            dev.grab_time = time;
        }
        if let Some(cursor) = cursor {
            data.cursor_changed(device, Some(cursor));
        }
        self.check_grab_for_syncs(data, device, id, client, this_mode, other_mode);
    }

    fn deactivate_grab(&mut self, data: &mut D, device: DeviceId) {
        let Some(active) = self
            .devices
            .get_mut(device)
            .ok()
            .and_then(|dev| dev.grab.take())
        else {
            warn!(?device, "deactivation of a grab that is not active");
            return;
        };
        debug!(?device, window = ?active.grab.window, "grab deactivated");
        let is_pointer = {
            let Ok(dev) = self.devices.get_mut(device) else { return };
            dev.sync.state = SyncState::NotGrabbed;
            dev.kind.is_pointer()
        };
        let ids = self.devices.ids();
        for id in ids {
            if let Ok(dev) = self.devices.get_mut(id) {
                if dev.sync.other == Some(active.id) {
                    dev.sync.other = None;
                }
            }
        }
        if is_pointer {
            let natural = self.sprite_window_of(data, device);
            let mut out = Vec::new();
            crossing::pointer_crossing(
                data,
                &mut self.presence,
                device,
                false,
                active.grab.window,
                natural,
                CrossingMode::Ungrab,
                &mut out,
            );
            self.emit_notifications(data, out);
            if active.grab.confine_to.is_some() {
                self.apply_confinement(data, device, None, false);
            }
            if active.grab.cursor.is_some() {
                data.cursor_changed(device, None);
            }
        } else {
            let natural = self
                .devices
                .get(device)
                .ok()
                .and_then(|dev| dev.focus.as_ref())
                .map(|focus| focus.win)
                .unwrap_or(FocusWindow::PointerRoot);
            self.emit_focus_change(
                data,
                device,
                FocusWindow::Window(active.grab.window),
                natural,
                CrossingMode::Ungrab,
            );
        }
        self.compute_freezes(data);
    }

    // `notify` emits crossing events for a sprite pushed onto another
    // window; grab transitions pass false since they report the move
    // themselves.
    fn apply_confinement(
        &mut self,
        data: &mut D,
        device: DeviceId,
        confine: Option<WindowId>,
        notify: bool,
    ) {
        let rect = confine.and_then(|win| data.border_box(win));
        let moved = {
            let Ok(dev) = self.devices.get_mut(device) else { return };
            let Some(sprite) = dev.sprite.as_mut() else { return };
            sprite.confined_to = rect;
            let clamped = sprite.clamp(sprite.hot_phys);
            if clamped == sprite.hot {
                None
            } else {
                sprite.hot = clamped;
                let old_win = sprite.window();
                let new_win = data.window_at(clamped);
                if new_win != old_win {
                    sprite.retrace(data, new_win);
                }
                Some((old_win, new_win))
            }
        };
        if let Some((old_win, new_win)) = moved {
            if notify && new_win != old_win {
                let mut out = Vec::new();
                crossing::pointer_crossing(
                    data,
                    &mut self.presence,
                    device,
                    true,
                    old_win,
                    new_win,
                    CrossingMode::Normal,
                    &mut out,
                );
                self.emit_notifications(data, out);
            }
        }
    }

    fn check_grab_for_syncs(
        &mut self,
        data: &mut D,
        device: DeviceId,
        grab_id: GrabId,
        client: ClientId,
        this_mode: GrabMode,
        other_mode: GrabMode,
    ) {
        let my_other = self.devices.get(device).ok().and_then(|dev| dev.sync.other);
        let my_other_same_client = my_other.map_or(false, |id| self.grab_owner(id) == Some(client));
        if let Ok(dev) = self.devices.get_mut(device) {
            if this_mode == GrabMode::Sync {
                dev.sync.state = SyncState::FrozenNoEvent;
            } else {
                dev.sync.state = SyncState::Thawed;
                if my_other_same_client {
                    dev.sync.other = None;
                }
            }
        }
        if let Some(paired) = self.devices.paired_master(device) {
            let paired_other = self
                .devices
                .get(paired)
                .ok()
                .and_then(|dev| dev.sync.other);
            let paired_same_client =
                paired_other.map_or(false, |id| self.grab_owner(id) == Some(client));
            if let Ok(dev) = self.devices.get_mut(paired) {
                if other_mode == GrabMode::Sync {
                    dev.sync.other = Some(grab_id);
                } else if paired_same_client {
                    dev.sync.other = None;
                }
            }
        }
        self.compute_freezes(data);
    }

    /// After delivering a grabbed key or button event, arm any requested
    /// freeze: a sync grab captures the event and suspends the device, the
    /// both-variant suspends its pair too.
    fn freeze_this_event_if_needed(&mut self, device: DeviceId, event: &DeviceEvent) {
        let (state, grab_id, grab_client) = {
            let Ok(dev) = self.devices.get(device) else { return };
            let Some(active) = &dev.grab else { return };
            (dev.sync.state, active.id, active.grab.client)
        };
        match state {
            SyncState::FreezeBothNextEvent => {
                if let Some(paired) = self.devices.paired_master(device) {
                    let paired_same_client = self
                        .devices
                        .get(paired)
                        .ok()
                        .and_then(|dev| dev.grab.as_ref())
                        .map_or(false, |active| active.grab.client == grab_client);
                    if let Ok(dev) = self.devices.get_mut(paired) {
                        if dev.sync.state == SyncState::FreezeBothNextEvent && paired_same_client {
                            dev.sync.state = SyncState::FrozenNoEvent;
                        } else {
                            dev.sync.other = Some(grab_id);
                        }
                    }
                }
                if let Ok(dev) = self.devices.get_mut(device) {
                    dev.sync.state = SyncState::FrozenWithEvent;
                    dev.sync.event = Some(*event);
                }
            }
            SyncState::FreezeNextEvent => {
                if let Ok(dev) = self.devices.get_mut(device) {
                    dev.sync.state = SyncState::FrozenWithEvent;
                    dev.sync.event = Some(*event);
                }
            }
            _ => {}
        }
    }

    fn deliver_grabbed(
        &mut self,
        data: &mut D,
        device: DeviceId,
        event: &DeviceEvent,
        deactivating: bool,
    ) -> bool {
        let Some(active) = self
            .devices
            .get(device)
            .ok()
            .and_then(|dev| dev.grab.clone())
        else {
            return false;
        };
        let grab = &active.grab;
        let mut delivered = false;
        if grab.owner_events {
            let sprite_win = self.sprite_window_of(data, device);
            let focus = if event.kind.is_pointer() {
                FocusWindow::PointerRoot
            } else {
                self.devices
                    .get(device)
                    .ok()
                    .and_then(|dev| dev.focus.as_ref())
                    .map(|focus| focus.win)
                    .unwrap_or(FocusWindow::PointerRoot)
            };
            let outcome = match focus {
                FocusWindow::None => Delivery::None,
                FocusWindow::PointerRoot => delivery::deliver_device_event(
                    data,
                    &self.selections,
                    &self.devices,
                    sprite_win,
                    event,
                    None,
                    Some(grab.client),
                ),
                FocusWindow::Window(focus_win) => {
                    if focus_win == sprite_win || crossing::is_ancestor(data, focus_win, sprite_win)
                    {
                        delivery::deliver_device_event(
                            data,
                            &self.selections,
                            &self.devices,
                            sprite_win,
                            event,
                            Some(focus_win),
                            Some(grab.client),
                        )
                    } else {
                        delivery::deliver_to_window(
                            data,
                            &self.selections,
                            &self.devices,
                            focus_win,
                            None,
                            event,
                            Some(grab.client),
                        )
                    }
                }
            };
            delivered = matches!(outcome, Delivery::Delivered { .. });
        }
        if !delivered {
            let mask = grab.mask.mask_for(device, active.implicit);
            if mask.intersects(event.kind.filter())
                && !(grab.mask.is_basic()
                    && delivery::is_interfering(&self.devices, grab.client, event))
                && data.allow_delivery(grab.window, grab.client, event)
            {
                let child = self.child_below(device, grab.window);
                let wrapped = Event::Device(WindowEvent {
                    raw: *event,
                    window: grab.window,
                    child,
                });
                data.deliver(grab.window, grab.client, &wrapped);
                delivered = true;
            }
        }
        if delivered && !deactivating && event.kind != EventKind::Motion {
            self.freeze_this_event_if_needed(device, event);
        }
        delivered
    }

    fn deliver_focused(
        &mut self,
        data: &mut D,
        device: DeviceId,
        event: &DeviceEvent,
        sprite_win: WindowId,
    ) {
        let focus = self
            .devices
            .get(device)
            .ok()
            .and_then(|dev| dev.focus.as_ref())
            .map(|focus| focus.win);
        match focus {
            None | Some(FocusWindow::PointerRoot) => {
                delivery::deliver_device_event(
                    data,
                    &self.selections,
                    &self.devices,
                    sprite_win,
                    event,
                    None,
                    None,
                );
            }
            Some(FocusWindow::None) => {}
            Some(FocusWindow::Window(focus_win)) => {
                if focus_win == sprite_win || crossing::is_ancestor(data, focus_win, sprite_win) {
                    let outcome = delivery::deliver_device_event(
                        data,
                        &self.selections,
                        &self.devices,
                        sprite_win,
                        event,
                        Some(focus_win),
                        None,
                    );
                    if !matches!(outcome, Delivery::None) {
                        return;
                    }
                } else {
                    delivery::deliver_to_window(
                        data,
                        &self.selections,
                        &self.devices,
                        focus_win,
                        None,
                        event,
                        None,
                    );
                    return;
                }
                // the walk below the focus found nobody; the focus window
                // itself already had its chance during the walk
            }
        }
    }

    /// Re-derive everyone's frozen state and, once anything thawed, play
    /// the replay and the parked queue. Replayed events run the full
    /// pipeline again and may freeze devices anew, so the drain restarts
    /// from the head after every played event.
    fn compute_freezes(&mut self, data: &mut D) {
        if self.pending.playing {
            return;
        }
        if self.replay.is_none() && self.pending.is_empty() {
            return;
        }
        self.pending.playing = true;
        if let Some((replay_dev, boundary)) = self.replay.take() {
            let captured = self
                .devices
                .get_mut(replay_dev)
                .ok()
                .and_then(|dev| dev.sync.event.take());
            if let Some(event) = captured {
                trace!(?replay_dev, "replaying captured event");
                if !self.check_device_grabs(data, replay_dev, &event, Some(boundary)) {
                    let under = data.window_at(event.root_pos);
                    let focused = self
                        .devices
                        .get(replay_dev)
                        .map(|dev| dev.focus.is_some() && event.kind.is_keyboard())
                        .unwrap_or(false);
                    if focused {
                        self.deliver_focused(data, replay_dev, &event, under);
                    } else {
                        delivery::deliver_device_event(
                            data,
                            &self.selections,
                            &self.devices,
                            under,
                            &event,
                            None,
                            None,
                        );
                    }
                }
            }
        }
        loop {
            let frozen: Vec<DeviceId> = self
                .devices
                .iter()
                .filter(|dev| dev.sync.frozen())
                .map(|dev| dev.id)
                .collect();
            let Some(queued) = self.pending.pop_playable(|dev| frozen.contains(&dev)) else {
                break;
            };
            self.run_event(data, queued.event);
        }
        self.pending.playing = false;
        // confinement boxes may have gone stale while events were parked
        for id in self.devices.ids() {
            let confine = self
                .devices
                .get(id)
                .ok()
                .and_then(|dev| dev.grab.as_ref())
                .and_then(|active| active.grab.confine_to);
            if let Some(confine) = confine {
                self.apply_confinement(data, id, Some(confine), true);
            }
        }
    }

    // ------------------------------------------------------------------
    // teardown

    /// Release everything a disconnecting client owns.
    ///
    /// Deactivating one grab can activate or thaw others, so the scan
    /// repeats until no grab of the client remains.
    pub fn cleanup_client(&mut self, data: &mut D, client: ClientId) {
        info!(?client, "client cleanup");
        loop {
            let held = self.devices.iter().find_map(|dev| {
                dev.grab
                    .as_ref()
                    .filter(|active| active.grab.client == client)
                    .map(|_| dev.id)
            });
            match held {
                Some(device) => self.deactivate_grab(data, device),
                None => break,
            }
        }
        self.passive_grabs.remove_client(client);
        self.selections.remove_client(data, client);
    }

    /// Drop all state referring to a destroyed window.
    pub fn window_destroyed(&mut self, data: &mut D, window: WindowId) {
        self.passive_grabs.remove_window(window);
        self.filters.remove_window(window);
        for id in self.devices.ids() {
            let grab_refers = self
                .devices
                .get(id)
                .ok()
                .and_then(|dev| dev.grab.as_ref())
                .map_or(false, |active| {
                    active.grab.window == window || active.grab.confine_to == Some(window)
                });
            if grab_refers {
                self.deactivate_grab(data, id);
            }
            self.revert_focus_from(data, id, window);
            self.resettle_sprite(data, id, window);
        }
        self.selections.remove_window(window);
    }

    // Focus reverts per the owner's revert-to policy when its window dies.
    fn revert_focus_from(&mut self, data: &mut D, device: DeviceId, window: WindowId) {
        let needs_revert = self
            .devices
            .get(device)
            .ok()
            .and_then(|dev| dev.focus.as_ref())
            .map_or(false, |focus| {
                focus.win == FocusWindow::Window(window) || focus.trace_contains(window)
            });
        if !needs_revert {
            return;
        }
        let (old, revert_to) = {
            let Ok(dev) = self.devices.get(device) else { return };
            let Some(focus) = dev.focus.as_ref() else { return };
            (focus.win, focus.revert_to)
        };
        let new = match revert_to {
            RevertTo::None => FocusWindow::None,
            RevertTo::PointerRoot => FocusWindow::PointerRoot,
            RevertTo::Parent => {
                let mut candidate = data.parent(window);
                while let Some(win) = candidate {
                    if data.is_viewable(win) {
                        break;
                    }
                    candidate = data.parent(win);
                }
                candidate
                    .map(FocusWindow::Window)
                    .unwrap_or(FocusWindow::PointerRoot)
            }
        };
        self.emit_focus_change(data, device, old, new, CrossingMode::Normal);
        if let Ok(dev) = self.devices.get_mut(device) {
            if let Some(focus) = dev.focus.as_mut() {
                focus.retrace(data, new);
                // reverting to the parent is one-shot
                if revert_to == RevertTo::Parent {
                    focus.revert_to = RevertTo::PointerRoot;
                }
            }
        }
    }

    // A sprite standing on a destroyed window drops to whatever the tree
    // now shows at its position.
    fn resettle_sprite(&mut self, data: &mut D, device: DeviceId, window: WindowId) {
        let stale = self
            .devices
            .get(device)
            .ok()
            .and_then(|dev| dev.sprite.as_ref())
            .map_or(false, |sprite| sprite.trace_contains(window));
        if !stale {
            return;
        }
        let (old_win, hot) = {
            let Ok(dev) = self.devices.get(device) else { return };
            let Some(sprite) = dev.sprite.as_ref() else { return };
            (sprite.window(), sprite.hot)
        };
        let new_win = data.window_at(hot);
        if let Ok(dev) = self.devices.get_mut(device) {
            if let Some(sprite) = dev.sprite.as_mut() {
                sprite.retrace(data, new_win);
            }
        }
        if new_win != old_win {
            let grabbed = self
                .devices
                .get(device)
                .map(|dev| dev.grab.is_some())
                .unwrap_or(false);
            let mut out = Vec::new();
            crossing::pointer_crossing(
                data,
                &mut self.presence,
                device,
                grabbed,
                old_win,
                new_win,
                CrossingMode::Normal,
                &mut out,
            );
            self.emit_notifications(data, out);
        }
    }

    // ------------------------------------------------------------------
    // plumbing

    fn grab_owner(&self, id: GrabId) -> Option<ClientId> {
        self.devices.iter().find_map(|dev| {
            dev.grab
                .as_ref()
                .filter(|active| active.id == id)
                .map(|active| active.grab.client)
        })
    }

    fn emit_focus_change(
        &mut self,
        data: &mut D,
        device: DeviceId,
        from: FocusWindow,
        to: FocusWindow,
        mode: CrossingMode,
    ) {
        let paired = self.devices.paired_master(device);
        let root = data.root();
        let mut out = Vec::new();
        crossing::focus_change(
            data,
            &mut self.presence,
            device,
            paired,
            from,
            to,
            root,
            mode,
            &mut out,
        );
        self.emit_notifications(data, out);
    }

    fn emit_notifications(&mut self, data: &mut D, events: Vec<Event>) {
        for event in events {
            let window = event.window();
            for client in self.selections.interested(window, event.filter()) {
                data.deliver(window, client, &event);
            }
        }
    }

    // Windows a key filter chain is consulted for: the focus path, or the
    // pointer path while the focus follows the pointer.
    fn filter_windows(&self, device: DeviceId) -> Vec<WindowId> {
        let focus = self
            .devices
            .get(device)
            .ok()
            .and_then(|dev| dev.focus.as_ref());
        match focus.map(|state| state.win) {
            Some(FocusWindow::Window(_)) => focus
                .map(|state| state.trace.clone())
                .unwrap_or_default(),
            Some(FocusWindow::PointerRoot) | None => self.sprite_trace_of(device, false),
            Some(FocusWindow::None) => Vec::new(),
        }
    }

    // The sprite trace used for passive sweeps; keyboards borrow their
    // paired pointer's.
    fn sprite_trace_of(&self, device: DeviceId, is_pointer: bool) -> Vec<WindowId> {
        let source = if is_pointer {
            Some(device)
        } else {
            self.devices.paired_master(device)
        };
        source
            .and_then(|id| self.devices.get(id).ok())
            .and_then(|dev| dev.sprite.as_ref())
            .map(|sprite| sprite.trace.clone())
            .unwrap_or_default()
    }

    fn sprite_window_of(&self, data: &D, device: DeviceId) -> WindowId {
        let direct = self
            .devices
            .get(device)
            .ok()
            .and_then(Device::sprite_window);
        if let Some(win) = direct {
            return win;
        }
        self.devices
            .paired_master(device)
            .and_then(|id| self.devices.get(id).ok())
            .and_then(Device::sprite_window)
            .unwrap_or_else(|| data.root())
    }

    // The sprite-trace hop directly below `window`, reported as the child
    // field of events addressed above the pointer.
    fn child_below(&self, device: DeviceId, window: WindowId) -> Option<WindowId> {
        let source = if self.devices.get(device).ok()?.sprite.is_some() {
            device
        } else {
            self.devices.paired_master(device)?
        };
        let dev = self.devices.get(source).ok()?;
        let sprite = dev.sprite.as_ref()?;
        let pos = sprite.trace.iter().position(|win| *win == window)?;
        sprite.trace.get(pos + 1).copied()
    }
}


#[cfg(test)]
mod tests {
    use super::event::CrossingDetail;
    use super::test_support::TestTree;
    use super::*;

    fn setup() -> (TestTree, DispatchState<TestTree>, DeviceId, DeviceId) {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
        let mut tree = TestTree::new();
        let mut state = DispatchState::new();
        let (pointer, keyboard) = state.add_master_pair(&mut tree, "seat0");
        (tree, state, pointer, keyboard)
    }

    fn pointer_event(device: DeviceId, kind: EventKind, detail: u32, time: u32, pos: (i32, i32)) -> DeviceEvent {
        DeviceEvent {
            device,
            kind,
            detail,
            modifiers: Modifiers::empty(),
            time: Timestamp(time),
            root_pos: pos.into(),
        }
    }

    fn key_event(device: DeviceId, kind: EventKind, detail: u32, time: u32) -> DeviceEvent {
        DeviceEvent {
            device,
            kind,
            detail,
            modifiers: Modifiers::empty(),
            time: Timestamp(time),
            root_pos: (0, 0).into(),
        }
    }

    /// Device-event deliveries only, crossing and focus noise stripped.
    fn device_deliveries(tree: &TestTree) -> Vec<(WindowId, ClientId, EventKind, Timestamp)> {
        tree.delivered
            .iter()
            .filter_map(|(window, client, event)| match event {
                Event::Device(ev) => Some((*window, *client, ev.raw.kind, ev.raw.time)),
                _ => None,
            })
            .collect()
    }

    fn crossing_deliveries(tree: &TestTree) -> Vec<(WindowId, bool, CrossingDetail)> {
        tree.delivered
            .iter()
            .filter_map(|(_, _, event)| match event {
                Event::Crossing(ev) => Some((ev.window, ev.entered, ev.detail)),
                _ => None,
            })
            .collect()
    }

    fn grab_request(window: WindowId, time: u32) -> GrabRequest {
        GrabRequest {
            window,
            owner_events: false,
            mask: GrabMask::Basic(
                EventMask::BUTTON_PRESS | EventMask::BUTTON_RELEASE | EventMask::POINTER_MOTION,
            ),
            pointer_mode: GrabMode::Async,
            keyboard_mode: GrabMode::Async,
            confine_to: None,
            cursor: None,
            time: Timestamp(time),
        }
    }

    fn passive_button_grab(window: WindowId, client: u32, device: DeviceId, mode: GrabMode) -> Grab {
        Grab {
            window,
            client: ClientId(client),
            device,
            kind: EventKind::ButtonPress,
            modifier_device: None,
            detail: GrabDetail::Exact(1),
            modifiers: GrabModifiers::Any,
            mask: GrabMask::Basic(
                EventMask::BUTTON_PRESS | EventMask::BUTTON_RELEASE | EventMask::POINTER_MOTION,
            ),
            owner_events: false,
            pointer_mode: mode,
            keyboard_mode: GrabMode::Async,
            confine_to: None,
            cursor: None,
        }
    }

    #[test]
    fn motion_walks_to_interested_client() {
        let (mut tree, mut state, pointer, _) = setup();
        let root = tree.root();
        let window = tree.add_window(root);
        state
            .select_input(&mut tree, window, ClientId(1), EventMask::POINTER_MOTION)
            .unwrap();

        state
            .process_event(&mut tree, pointer_event(pointer, EventKind::Motion, 0, 1, (10, 10)))
            .unwrap();
        assert_eq!(
            device_deliveries(&tree),
            vec![(window, ClientId(1), EventKind::Motion, Timestamp(1))]
        );
        assert_eq!(state.pointer_window(pointer), Some(window));
    }

    #[test]
    fn button_press_installs_implicit_grab() {
        let (mut tree, mut state, pointer, _) = setup();
        let root = tree.root();
        let window = tree.add_window(root);
        state
            .select_input(
                &mut tree,
                window,
                ClientId(1),
                EventMask::BUTTON_PRESS | EventMask::BUTTON_RELEASE,
            )
            .unwrap();

        state
            .process_event(
                &mut tree,
                pointer_event(pointer, EventKind::ButtonPress, 1, 1, (10, 10)),
            )
            .unwrap();
        let active = state.active_grab(pointer).expect("implicit grab expected");
        assert!(active.implicit);
        assert_eq!(active.grab.client, ClientId(1));
        assert_eq!(active.grab.window, window);

        state
            .process_event(
                &mut tree,
                pointer_event(pointer, EventKind::ButtonRelease, 1, 2, (10, 10)),
            )
            .unwrap();
        assert!(state.active_grab(pointer).is_none());
        assert_eq!(
            device_deliveries(&tree),
            vec![
                (window, ClientId(1), EventKind::ButtonPress, Timestamp(1)),
                (window, ClientId(1), EventKind::ButtonRelease, Timestamp(2)),
            ]
        );
    }

    #[test]
    fn active_grab_captures_events() {
        let (mut tree, mut state, pointer, _) = setup();
        let root = tree.root();
        let selected = tree.add_window(root);
        let grab_win = tree.add_window_at(root, Rectangle::new(0, 0, 50, 50));
        state
            .select_input(&mut tree, selected, ClientId(1), EventMask::POINTER_MOTION)
            .unwrap();

        let status = state
            .grab_device(&mut tree, ClientId(2), pointer, grab_request(grab_win, 0))
            .unwrap();
        assert_eq!(status, GrabStatus::Success);

        state
            .process_event(&mut tree, pointer_event(pointer, EventKind::Motion, 0, 1, (300, 300)))
            .unwrap();
        // the grab owns the event stream, client 1's selection is bypassed
        assert_eq!(
            device_deliveries(&tree),
            vec![(grab_win, ClientId(2), EventKind::Motion, Timestamp(1))]
        );

        state
            .ungrab_device(&mut tree, ClientId(2), pointer, Timestamp(1))
            .unwrap();
        assert!(state.active_grab(pointer).is_none());
    }

    #[test]
    fn grab_request_status_checks() {
        let (mut tree, mut state, pointer, _) = setup();
        let root = tree.root();
        let window = tree.add_window(root);
        let hidden = tree.add_window(root);
        tree.set_viewable(hidden, false);

        let status = state
            .grab_device(&mut tree, ClientId(2), pointer, grab_request(window, 0))
            .unwrap();
        assert_eq!(status, GrabStatus::Success);

        let status = state
            .grab_device(&mut tree, ClientId(3), pointer, grab_request(window, 0))
            .unwrap();
        assert_eq!(status, GrabStatus::AlreadyGrabbed);

        let status = state
            .grab_device(&mut tree, ClientId(2), pointer, grab_request(hidden, 0))
            .unwrap();
        assert_eq!(status, GrabStatus::NotViewable);

        // a timestamp from the future is rejected
        let status = state
            .grab_device(&mut tree, ClientId(2), pointer, grab_request(window, 5))
            .unwrap();
        assert_eq!(status, GrabStatus::InvalidTime);
    }

    #[test]
    fn passive_grab_triggers_on_matching_press() {
        let (mut tree, mut state, pointer, _) = setup();
        let root = tree.root();
        let window = tree.add_window(root);
        state
            .select_input(&mut tree, window, ClientId(1), EventMask::BUTTON_PRESS)
            .unwrap();
        let status = state
            .grab_passive(passive_button_grab(window, 2, pointer, GrabMode::Async))
            .unwrap();
        assert_eq!(status, GrabStatus::Success);

        // a non-matching detail falls through to ordinary delivery
        state
            .process_event(
                &mut tree,
                pointer_event(pointer, EventKind::ButtonPress, 3, 1, (10, 10)),
            )
            .unwrap();
        let active = state.active_grab(pointer).expect("implicit grab expected");
        assert!(active.implicit);
        state
            .process_event(
                &mut tree,
                pointer_event(pointer, EventKind::ButtonRelease, 3, 2, (10, 10)),
            )
            .unwrap();
        tree.delivered.clear();

        // the matching detail activates the registration
        state
            .process_event(
                &mut tree,
                pointer_event(pointer, EventKind::ButtonPress, 1, 3, (10, 10)),
            )
            .unwrap();
        let active = state.active_grab(pointer).expect("passive grab expected");
        assert!(active.from_passive);
        assert!(!active.implicit);
        assert_eq!(active.grab.client, ClientId(2));
        assert_eq!(
            device_deliveries(&tree),
            vec![(window, ClientId(2), EventKind::ButtonPress, Timestamp(3))]
        );
    }

    #[test]
    fn sync_grab_freezes_and_async_allow_thaws() {
        let (mut tree, mut state, pointer, _) = setup();
        let root = tree.root();
        let window = tree.add_window(root);
        state
            .grab_passive(passive_button_grab(window, 2, pointer, GrabMode::Sync))
            .unwrap();

        state
            .process_event(
                &mut tree,
                pointer_event(pointer, EventKind::ButtonPress, 1, 10, (10, 10)),
            )
            .unwrap();
        assert!(state.is_frozen(pointer));

        // motion while frozen is parked, consecutive motion compresses
        state
            .process_event(&mut tree, pointer_event(pointer, EventKind::Motion, 0, 11, (11, 11)))
            .unwrap();
        state
            .process_event(&mut tree, pointer_event(pointer, EventKind::Motion, 0, 12, (12, 12)))
            .unwrap();
        assert_eq!(state.pending_events(), 1);

        state
            .allow_events(&mut tree, ClientId(2), pointer, AllowEvents::AsyncThis, Timestamp(10))
            .unwrap();
        assert!(!state.is_frozen(pointer));
        assert_eq!(state.pending_events(), 0);
        assert_eq!(
            device_deliveries(&tree),
            vec![
                (window, ClientId(2), EventKind::ButtonPress, Timestamp(10)),
                (window, ClientId(2), EventKind::Motion, Timestamp(12)),
            ]
        );
    }

    #[test]
    fn replay_redelivers_through_ordinary_path() {
        let (mut tree, mut state, pointer, _) = setup();
        let root = tree.root();
        let window = tree.add_window(root);
        state
            .select_input(&mut tree, window, ClientId(1), EventMask::BUTTON_PRESS)
            .unwrap();
        state
            .grab_passive(passive_button_grab(window, 2, pointer, GrabMode::Sync))
            .unwrap();

        state
            .process_event(
                &mut tree,
                pointer_event(pointer, EventKind::ButtonPress, 1, 10, (10, 10)),
            )
            .unwrap();
        assert!(state.is_frozen(pointer));
        tree.delivered.clear();

        state
            .allow_events(&mut tree, ClientId(2), pointer, AllowEvents::Replay, Timestamp(10))
            .unwrap();
        // the grab is gone and the press reaches the ordinary selection
        // without re-matching the registration that captured it
        assert!(state.active_grab(pointer).is_none());
        assert!(!state.is_frozen(pointer));
        assert_eq!(
            device_deliveries(&tree),
            vec![(window, ClientId(1), EventKind::ButtonPress, Timestamp(10))]
        );
    }

    #[test]
    fn frozen_queue_preserves_order_and_rearms() {
        let (mut tree, mut state, pointer, _) = setup();
        let root = tree.root();
        let window = tree.add_window(root);
        state
            .grab_passive(passive_button_grab(window, 2, pointer, GrabMode::Sync))
            .unwrap();

        state
            .process_event(
                &mut tree,
                pointer_event(pointer, EventKind::ButtonPress, 1, 10, (10, 10)),
            )
            .unwrap();
        state
            .process_event(
                &mut tree,
                pointer_event(pointer, EventKind::ButtonRelease, 1, 11, (10, 10)),
            )
            .unwrap();
        state
            .process_event(
                &mut tree,
                pointer_event(pointer, EventKind::ButtonPress, 1, 12, (10, 10)),
            )
            .unwrap();
        assert_eq!(state.pending_events(), 2);

        state
            .allow_events(&mut tree, ClientId(2), pointer, AllowEvents::AsyncThis, Timestamp(12))
            .unwrap();
        // the release ends the first activation, the queued press re-arms
        // the registration and freezes the device again
        assert_eq!(
            device_deliveries(&tree),
            vec![
                (window, ClientId(2), EventKind::ButtonPress, Timestamp(10)),
                (window, ClientId(2), EventKind::ButtonRelease, Timestamp(11)),
                (window, ClientId(2), EventKind::ButtonPress, Timestamp(12)),
            ]
        );
        assert!(state.is_frozen(pointer));
        let active = state.active_grab(pointer).expect("re-armed grab expected");
        assert_eq!(active.time, Timestamp(12));
        assert_eq!(state.pending_events(), 0);
    }

    #[test]
    fn crossing_notifications_on_motion() {
        let (mut tree, mut state, pointer, _) = setup();
        let root = tree.root();
        let left = tree.add_window_at(root, Rectangle::new(0, 0, 100, 100));
        let right = tree.add_window_at(root, Rectangle::new(200, 0, 100, 100));
        let mask = EventMask::ENTER_WINDOW | EventMask::LEAVE_WINDOW;
        state.select_input(&mut tree, left, ClientId(1), mask).unwrap();
        state.select_input(&mut tree, right, ClientId(1), mask).unwrap();

        state
            .process_event(&mut tree, pointer_event(pointer, EventKind::Motion, 0, 1, (10, 10)))
            .unwrap();
        state
            .process_event(&mut tree, pointer_event(pointer, EventKind::Motion, 0, 2, (210, 10)))
            .unwrap();
        assert_eq!(
            crossing_deliveries(&tree),
            vec![
                (left, true, CrossingDetail::Ancestor),
                (left, false, CrossingDetail::Nonlinear),
                (right, true, CrossingDetail::Nonlinear),
            ]
        );
    }

    #[test]
    fn second_pointer_keeps_window_occupied() {
        let (mut tree, mut state, first, _) = setup();
        let (second, _) = state.add_master_pair(&mut tree, "seat1");
        let root = tree.root();
        let window = tree.add_window_at(root, Rectangle::new(0, 0, 100, 100));
        state
            .select_input(
                &mut tree,
                window,
                ClientId(1),
                EventMask::ENTER_WINDOW | EventMask::LEAVE_WINDOW,
            )
            .unwrap();

        state
            .process_event(&mut tree, pointer_event(first, EventKind::Motion, 0, 1, (10, 10)))
            .unwrap();
        state
            .process_event(&mut tree, pointer_event(second, EventKind::Motion, 0, 2, (20, 20)))
            .unwrap();
        tree.delivered.clear();

        // the first pointer is still inside, so no Leave is observable
        state
            .process_event(&mut tree, pointer_event(second, EventKind::Motion, 0, 3, (200, 200)))
            .unwrap();
        assert!(crossing_deliveries(&tree).is_empty());

        // coming back in is equally silent
        state
            .process_event(&mut tree, pointer_event(second, EventKind::Motion, 0, 4, (20, 20)))
            .unwrap();
        state
            .process_event(&mut tree, pointer_event(second, EventKind::Motion, 0, 5, (200, 200)))
            .unwrap();
        assert!(crossing_deliveries(&tree).is_empty());

        // the last pointer out produces the Leave
        state
            .process_event(&mut tree, pointer_event(first, EventKind::Motion, 0, 6, (200, 200)))
            .unwrap();
        assert_eq!(crossing_deliveries(&tree), vec![(window, false, CrossingDetail::Ancestor)]);
    }

    #[test]
    fn grab_on_one_pointer_keeps_other_pointers_motion_flowing() {
        let (mut tree, mut state, first, _) = setup();
        let (second, _) = state.add_master_pair(&mut tree, "seat1");
        let root = tree.root();
        let window = tree.add_window(root);
        state
            .select_input(&mut tree, window, ClientId(1), EventMask::POINTER_MOTION)
            .unwrap();
        let status = state
            .grab_device(&mut tree, ClientId(1), first, grab_request(window, 0))
            .unwrap();
        assert_eq!(status, GrabStatus::Success);

        // the grab on the first pointer is no reason to starve the
        // client of the second pointer's motion
        state
            .process_event(&mut tree, pointer_event(second, EventKind::Motion, 0, 1, (10, 10)))
            .unwrap();
        assert_eq!(
            device_deliveries(&tree),
            vec![(window, ClientId(1), EventKind::Motion, Timestamp(1))]
        );
    }

    #[test]
    fn focus_change_notifies_and_routes_keys() {
        let (mut tree, mut state, _, keyboard) = setup();
        let root = tree.root();
        let window = tree.add_window_at(root, Rectangle::new(0, 0, 100, 100));
        state
            .select_input(
                &mut tree,
                window,
                ClientId(1),
                EventMask::FOCUS_CHANGE | EventMask::KEY_PRESS,
            )
            .unwrap();

        state
            .set_input_focus(
                &mut tree,
                keyboard,
                FocusWindow::Window(window),
                RevertTo::PointerRoot,
                Timestamp(0),
            )
            .unwrap();
        assert!(tree.delivered.iter().any(|(win, _, event)| {
            *win == window && matches!(event, Event::Focus(ev) if ev.focused)
        }));

        state
            .process_event(&mut tree, key_event(keyboard, EventKind::KeyPress, 38, 1))
            .unwrap();
        assert_eq!(
            device_deliveries(&tree),
            vec![(window, ClientId(1), EventKind::KeyPress, Timestamp(1))]
        );
    }

    #[test]
    fn stale_focus_request_is_ignored() {
        let (mut tree, mut state, _, keyboard) = setup();
        let root = tree.root();
        let window = tree.add_window(root);
        state
            .process_event(&mut tree, key_event(keyboard, EventKind::KeyPress, 38, 5))
            .unwrap();

        state
            .set_input_focus(
                &mut tree,
                keyboard,
                FocusWindow::Window(window),
                RevertTo::PointerRoot,
                Timestamp(3),
            )
            .unwrap();
        assert_eq!(state.focus_of(keyboard), Some(FocusWindow::Window(window)));

        // an older request loses the race
        state
            .set_input_focus(
                &mut tree,
                keyboard,
                FocusWindow::Window(root),
                RevertTo::PointerRoot,
                Timestamp(2),
            )
            .unwrap();
        assert_eq!(state.focus_of(keyboard), Some(FocusWindow::Window(window)));
    }

    #[test]
    fn key_filter_consumes_before_delivery() {
        let (mut tree, mut state, _, keyboard) = setup();
        let root = tree.root();
        state
            .select_input(&mut tree, root, ClientId(1), EventMask::KEY_PRESS)
            .unwrap();
        let id = state.register_key_filter(root, |_, event| {
            if event.detail == 38 {
                FilterResult::Consumed
            } else {
                FilterResult::Forward
            }
        });

        state
            .process_event(&mut tree, key_event(keyboard, EventKind::KeyPress, 38, 1))
            .unwrap();
        assert!(device_deliveries(&tree).is_empty());

        state
            .process_event(&mut tree, key_event(keyboard, EventKind::KeyPress, 40, 2))
            .unwrap();
        assert_eq!(
            device_deliveries(&tree),
            vec![(root, ClientId(1), EventKind::KeyPress, Timestamp(2))]
        );

        state.unregister_key_filter(id);
        state
            .process_event(&mut tree, key_event(keyboard, EventKind::KeyPress, 38, 3))
            .unwrap();
        assert_eq!(device_deliveries(&tree).len(), 2);
    }

    #[test]
    fn cleanup_client_releases_everything() {
        let (mut tree, mut state, pointer, _) = setup();
        let root = tree.root();
        let window = tree.add_window(root);
        state
            .grab_passive(passive_button_grab(window, 2, pointer, GrabMode::Async))
            .unwrap();
        let status = state
            .grab_device(&mut tree, ClientId(2), pointer, grab_request(window, 0))
            .unwrap();
        assert_eq!(status, GrabStatus::Success);

        state.cleanup_client(&mut tree, ClientId(2));
        assert!(state.active_grab(pointer).is_none());

        // the passive registration is gone too
        state
            .process_event(
                &mut tree,
                pointer_event(pointer, EventKind::ButtonPress, 1, 1, (10, 10)),
            )
            .unwrap();
        assert!(state.active_grab(pointer).is_none());
    }

    #[test]
    fn destroyed_window_reverts_focus_to_parent() {
        let (mut tree, mut state, _, keyboard) = setup();
        let root = tree.root();
        let window = tree.add_window(root);
        state
            .set_input_focus(
                &mut tree,
                keyboard,
                FocusWindow::Window(window),
                RevertTo::Parent,
                Timestamp(0),
            )
            .unwrap();

        state.window_destroyed(&mut tree, window);
        assert_eq!(state.focus_of(keyboard), Some(FocusWindow::Window(root)));
    }

    #[test]
    fn keyboard_sync_grab_freezes_the_paired_pointer() {
        let (mut tree, mut state, pointer, keyboard) = setup();
        let root = tree.root();
        let window = tree.add_window(root);
        state
            .select_input(&mut tree, window, ClientId(1), EventMask::POINTER_MOTION)
            .unwrap();

        let mut request = grab_request(window, 0);
        request.mask = GrabMask::Basic(EventMask::KEY_PRESS | EventMask::KEY_RELEASE);
        request.pointer_mode = GrabMode::Sync;
        request.keyboard_mode = GrabMode::Sync;
        let status = state
            .grab_device(&mut tree, ClientId(2), keyboard, request)
            .unwrap();
        assert_eq!(status, GrabStatus::Success);
        assert!(state.is_frozen(keyboard));
        assert!(state.is_frozen(pointer));

        state
            .process_event(&mut tree, pointer_event(pointer, EventKind::Motion, 0, 1, (10, 10)))
            .unwrap();
        assert_eq!(state.pending_events(), 1);

        // releasing the pointer half alone plays its queue
        state
            .allow_events(&mut tree, ClientId(2), pointer, AllowEvents::AsyncThis, Timestamp(0))
            .unwrap();
        assert!(!state.is_frozen(pointer));
        assert!(state.is_frozen(keyboard));
        assert_eq!(state.pending_events(), 0);
        assert_eq!(
            device_deliveries(&tree),
            vec![(window, ClientId(1), EventKind::Motion, Timestamp(1))]
        );
    }

    #[test]
    fn replay_follows_the_current_tree() {
        let (mut tree, mut state, pointer, _) = setup();
        let root = tree.root();
        let window = tree.add_window(root);
        state
            .select_input(&mut tree, root, ClientId(1), EventMask::BUTTON_PRESS)
            .unwrap();
        state
            .grab_passive(passive_button_grab(window, 2, pointer, GrabMode::Sync))
            .unwrap();

        state
            .process_event(
                &mut tree,
                pointer_event(pointer, EventKind::ButtonPress, 1, 10, (10, 10)),
            )
            .unwrap();
        assert!(state.is_frozen(pointer));
        tree.delivered.clear();

        // the window goes away while the device is frozen; the replayed
        // press lands on what the tree shows now
        tree.set_viewable(window, false);
        state
            .allow_events(&mut tree, ClientId(2), pointer, AllowEvents::Replay, Timestamp(10))
            .unwrap();
        assert_eq!(
            device_deliveries(&tree),
            vec![(root, ClientId(1), EventKind::ButtonPress, Timestamp(10))]
        );
    }

    #[test]
    fn allow_both_thaws_every_device_the_client_froze() {
        let (mut tree, mut state, pointer, keyboard) = setup();
        let root = tree.root();
        let window = tree.add_window(root);

        let mut request = grab_request(window, 0);
        request.mask = GrabMask::Basic(EventMask::KEY_PRESS);
        request.pointer_mode = GrabMode::Sync;
        request.keyboard_mode = GrabMode::Sync;
        let status = state
            .grab_device(&mut tree, ClientId(2), keyboard, request)
            .unwrap();
        assert_eq!(status, GrabStatus::Success);

        // the pointer is frozen by the same client, so a second grab goes
        // through
        let mut request = grab_request(window, 0);
        request.pointer_mode = GrabMode::Sync;
        request.keyboard_mode = GrabMode::Sync;
        let status = state
            .grab_device(&mut tree, ClientId(2), pointer, request)
            .unwrap();
        assert_eq!(status, GrabStatus::Success);
        assert!(state.is_frozen(pointer));
        assert!(state.is_frozen(keyboard));

        state
            .process_event(&mut tree, pointer_event(pointer, EventKind::Motion, 0, 1, (10, 10)))
            .unwrap();
        assert_eq!(state.pending_events(), 1);

        state
            .allow_events(&mut tree, ClientId(2), pointer, AllowEvents::AsyncBoth, Timestamp(0))
            .unwrap();
        assert!(!state.is_frozen(pointer));
        assert!(!state.is_frozen(keyboard));
        assert_eq!(state.pending_events(), 0);
        assert_eq!(
            device_deliveries(&tree),
            vec![(window, ClientId(2), EventKind::Motion, Timestamp(1))]
        );
    }

    #[test]
    fn cleanup_client_unfreezes_synced_devices() {
        let (mut tree, mut state, pointer, keyboard) = setup();
        let root = tree.root();
        let window = tree.add_window(root);
        let mut request = grab_request(window, 0);
        request.mask = GrabMask::Basic(EventMask::KEY_PRESS);
        request.pointer_mode = GrabMode::Sync;
        request.keyboard_mode = GrabMode::Sync;
        state
            .grab_device(&mut tree, ClientId(2), keyboard, request)
            .unwrap();
        assert!(state.is_frozen(pointer));

        state.cleanup_client(&mut tree, ClientId(2));
        assert!(state.active_grab(keyboard).is_none());
        assert!(!state.is_frozen(pointer));
        assert!(!state.is_frozen(keyboard));
    }

    #[test]
    fn grabbed_keys_bypass_the_filter_chain() {
        let (mut tree, mut state, _, keyboard) = setup();
        let root = tree.root();
        let window = tree.add_window(root);
        state.register_key_filter(root, |_, _| FilterResult::Consumed);

        let mut request = grab_request(window, 0);
        request.mask = GrabMask::Basic(EventMask::KEY_PRESS | EventMask::KEY_RELEASE);
        let status = state
            .grab_device(&mut tree, ClientId(2), keyboard, request)
            .unwrap();
        assert_eq!(status, GrabStatus::Success);

        state
            .process_event(&mut tree, key_event(keyboard, EventKind::KeyPress, 38, 1))
            .unwrap();
        assert_eq!(
            device_deliveries(&tree),
            vec![(window, ClientId(2), EventKind::KeyPress, Timestamp(1))]
        );
    }
}
