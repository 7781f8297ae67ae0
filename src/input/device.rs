//! Devices and the device registry
//!
//! Devices come in master/slave pairs: a master pointer and master keyboard
//! are created together and stay paired for their lifetime, slaves attach to
//! one master. Grabs, freezes and event routing all operate on masters; the
//! registry keeps the pairing so the paired device of any master is one
//! lookup away.

use indexmap::IndexMap;

use crate::utils::Timestamp;

use super::focus::FocusState;
use super::grab::ActiveGrab;
use super::sprite::Sprite;
use super::sync::SyncRecord;
use super::{DeviceId, WindowId};

/// Errors raised by device lookups and registry changes.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DeviceError {
    /// No device with this id exists
    #[error("unknown device {0:?}")]
    Unknown(DeviceId),
    /// The referenced device is not a master of the needed class
    #[error("device {0:?} is not a master device of the required class")]
    NotAMaster(DeviceId),
    /// The slave's master was removed
    #[error("device {0:?} is detached from any master")]
    Detached(DeviceId),
}

/// Role of a device.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DeviceKind {
    /// Routing endpoint for pointer events
    MasterPointer,
    /// Routing endpoint for keyboard events
    MasterKeyboard,
    /// Physical pointer attached to a master pointer
    SlavePointer,
    /// Physical keyboard attached to a master keyboard
    SlaveKeyboard,
}

impl DeviceKind {
    /// Whether the device routes pointer events.
    pub fn is_pointer(self) -> bool {
        matches!(self, DeviceKind::MasterPointer | DeviceKind::SlavePointer)
    }

    /// Whether the device is a master.
    pub fn is_master(self) -> bool {
        matches!(self, DeviceKind::MasterPointer | DeviceKind::MasterKeyboard)
    }
}

/// Pressed keys and buttons of one device, by key code / button number.
#[derive(Debug, Clone)]
pub struct DownState {
    bits: [u64; 4],
    pressed: u32,
}

impl Default for DownState {
    fn default() -> Self {
        DownState {
            bits: [0; 4],
            pressed: 0,
        }
    }
}

impl DownState {
    /// Mark `detail` pressed. Repeated presses of the same detail are
    /// counted once.
    pub fn press(&mut self, detail: u32) {
        let (word, bit) = (detail as usize / 64 % 4, detail % 64);
        if self.bits[word] & (1 << bit) == 0 {
            self.bits[word] |= 1 << bit;
            self.pressed += 1;
        }
    }

    /// Mark `detail` released.
    pub fn release(&mut self, detail: u32) {
        let (word, bit) = (detail as usize / 64 % 4, detail % 64);
        if self.bits[word] & (1 << bit) != 0 {
            self.bits[word] &= !(1 << bit);
            self.pressed -= 1;
        }
    }

    /// Whether `detail` is currently pressed.
    pub fn is_down(&self, detail: u32) -> bool {
        let (word, bit) = (detail as usize / 64 % 4, detail % 64);
        self.bits[word] & (1 << bit) != 0
    }

    /// Number of distinct details currently pressed.
    pub fn count(&self) -> u32 {
        self.pressed
    }
}

/// One input device and its routing state.
#[derive(Debug)]
pub struct Device {
    /// Stable identity
    pub id: DeviceId,
    /// Role of the device
    pub kind: DeviceKind,
    /// Descriptive name for logs
    pub name: String,
    /// Paired master for masters, owning master for slaves
    pub paired: Option<DeviceId>,
    /// Pointer position and window trace; pointer devices only
    pub sprite: Option<Sprite>,
    /// Keyboard focus; keyboard devices only
    pub focus: Option<FocusState>,
    /// Currently installed grab
    pub grab: Option<ActiveGrab>,
    /// Activation time of the most recent grab, retained across release
    /// for timestamp validation of later requests
    pub grab_time: Timestamp,
    /// Freeze bookkeeping
    pub sync: SyncRecord,
    /// Pressed keys or buttons
    pub down: DownState,
}

impl Device {
    /// The window under the sprite, for pointer devices.
    pub fn sprite_window(&self) -> Option<WindowId> {
        self.sprite.as_ref().map(Sprite::window)
    }
}

/// All devices, in registration order.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: IndexMap<DeviceId, Device>,
    next_id: u32,
}

impl DeviceRegistry {
    fn allocate(&mut self) -> DeviceId {
        self.next_id += 1;
        DeviceId(self.next_id)
    }

    /// Create a paired master pointer and master keyboard.
    ///
    /// The pointer's sprite starts at the root window's origin.
    pub fn add_master_pair(&mut self, name: &str, root: WindowId) -> (DeviceId, DeviceId) {
        let pointer = self.allocate();
        let keyboard = self.allocate();
        self.devices.insert(
            pointer,
            Device {
                id: pointer,
                kind: DeviceKind::MasterPointer,
                name: format!("{name} pointer"),
                paired: Some(keyboard),
                sprite: Some(Sprite::new(root)),
                focus: None,
                grab: None,
                grab_time: Timestamp(0),
                sync: SyncRecord::default(),
                down: DownState::default(),
            },
        );
        self.devices.insert(
            keyboard,
            Device {
                id: keyboard,
                kind: DeviceKind::MasterKeyboard,
                name: format!("{name} keyboard"),
                paired: Some(pointer),
                sprite: None,
                focus: Some(FocusState::new()),
                grab: None,
                grab_time: Timestamp(0),
                sync: SyncRecord::default(),
                down: DownState::default(),
            },
        );
        (pointer, keyboard)
    }

    /// Attach a slave device to a master.
    pub fn add_slave(
        &mut self,
        name: &str,
        master: DeviceId,
        pointer: bool,
    ) -> Result<DeviceId, DeviceError> {
        let master_kind = self.get(master)?.kind;
        if !master_kind.is_master() || master_kind.is_pointer() != pointer {
            return Err(DeviceError::NotAMaster(master));
        }
        let id = self.allocate();
        let kind = if pointer {
            DeviceKind::SlavePointer
        } else {
            DeviceKind::SlaveKeyboard
        };
        self.devices.insert(
            id,
            Device {
                id,
                kind,
                name: name.to_owned(),
                paired: Some(master),
                sprite: None,
                focus: None,
                grab: None,
                grab_time: Timestamp(0),
                sync: SyncRecord::default(),
                down: DownState::default(),
            },
        );
        Ok(id)
    }

    /// Remove a device. Removing a master also detaches its slaves.
    pub fn remove(&mut self, id: DeviceId) -> Result<(), DeviceError> {
        let kind = self.get(id)?.kind;
        self.devices.shift_remove(&id);
        if kind.is_master() {
            for device in self.devices.values_mut() {
                if device.paired == Some(id) {
                    device.paired = None;
                }
            }
        }
        Ok(())
    }

    /// Look a device up by id.
    pub fn get(&self, id: DeviceId) -> Result<&Device, DeviceError> {
        self.devices.get(&id).ok_or(DeviceError::Unknown(id))
    }

    /// Look a device up by id, mutably.
    pub fn get_mut(&mut self, id: DeviceId) -> Result<&mut Device, DeviceError> {
        self.devices.get_mut(&id).ok_or(DeviceError::Unknown(id))
    }

    /// The master a device's events are routed through. Masters route
    /// through themselves.
    pub fn master_of(&self, id: DeviceId) -> Result<DeviceId, DeviceError> {
        let device = self.get(id)?;
        if device.kind.is_master() {
            Ok(id)
        } else {
            device.paired.ok_or(DeviceError::Detached(id))
        }
    }

    /// The paired master of a master device.
    pub fn paired_master(&self, id: DeviceId) -> Option<DeviceId> {
        let device = self.devices.get(&id)?;
        if device.kind.is_master() {
            device.paired
        } else {
            None
        }
    }

    /// All devices, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    /// All device ids, in registration order.
    pub fn ids(&self) -> Vec<DeviceId> {
        self.devices.keys().copied().collect()
    }

    /// Master devices other than `id`, for grab-interference checks.
    pub fn other_masters(&self, id: DeviceId) -> impl Iterator<Item = &Device> {
        self.devices
            .values()
            .filter(move |device| device.kind.is_master() && device.id != id)
    }
}
