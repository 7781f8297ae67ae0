//! Per-pointer cursor state
//!
//! Every pointer-capable device owns one [`Sprite`]: the tracked hotspot
//! position, the confinement box applied by grabs, and the ancestor trace
//! from the root window down to the window currently under the cursor. The
//! trace is what passive-grab matching and crossing generation walk.

use crate::utils::{Point, Rectangle};

use super::{DispatchHandler, WindowId};

/// Cursor state of one pointer device.
#[derive(Debug, Clone)]
pub struct Sprite {
    /// Effective hotspot position, after confinement
    pub hot: Point,
    /// Physical hotspot position as last reported by the device
    pub hot_phys: Point,
    /// Box the hotspot is currently confined to, if any
    pub confined_to: Option<Rectangle>,
    /// Optional shape region further restricting the hotspot
    pub shape: Option<Rectangle>,
    /// Path of windows from the root (inclusive) to the window under the
    /// cursor (inclusive)
    pub trace: Vec<WindowId>,
}

impl Sprite {
    pub(super) fn new(root: WindowId) -> Sprite {
        Sprite {
            hot: Point::default(),
            hot_phys: Point::default(),
            confined_to: None,
            shape: None,
            trace: vec![root],
        }
    }

    /// The window currently under the cursor.
    pub fn window(&self) -> WindowId {
        *self.trace.last().unwrap_or(&WindowId(0))
    }

    /// Whether `window` appears in the current trace.
    pub fn trace_contains(&self, window: WindowId) -> bool {
        self.trace.contains(&window)
    }

    /// Apply confinement and shape to a physical position.
    pub(super) fn clamp(&self, pos: Point) -> Point {
        let mut pos = pos;
        if let Some(rect) = self.confined_to {
            pos = pos.constrain(rect);
        }
        if let Some(rect) = self.shape {
            pos = pos.constrain(rect);
        }
        pos
    }

    /// Rebuild the trace for the window now under the cursor.
    pub(super) fn retrace<D: DispatchHandler>(&mut self, data: &D, window: WindowId) {
        self.trace.clear();
        let mut cursor = Some(window);
        while let Some(win) = cursor {
            self.trace.push(win);
            cursor = data.parent(win);
        }
        self.trace.reverse();
    }
}
