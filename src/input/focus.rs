//! Per-keyboard focus state

use crate::utils::Timestamp;

use super::{DispatchHandler, WindowId};

/// Target of a keyboard's input focus.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum FocusWindow {
    /// No window has the focus; keyboard events are discarded
    None,
    /// Focus follows the pointer: events go to the window under the sprite
    #[default]
    PointerRoot,
    /// A concrete window holds the focus
    Window(WindowId),
}

impl FocusWindow {
    /// The concrete window, if the focus names one.
    pub fn window(self) -> Option<WindowId> {
        match self {
            FocusWindow::Window(win) => Some(win),
            _ => None,
        }
    }
}

/// What the focus reverts to when the focus window becomes unviewable.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum RevertTo {
    /// Revert to no focus
    None,
    /// Revert to pointer-root
    #[default]
    PointerRoot,
    /// Revert to the nearest viewable ancestor
    Parent,
}

/// Focus state of one keyboard device.
#[derive(Debug, Clone)]
pub struct FocusState {
    /// Current focus target
    pub win: FocusWindow,
    /// Revert policy applied when the focus window goes away
    pub revert_to: RevertTo,
    /// Time of the last focus change, for request validation
    pub time: Timestamp,
    /// Path of windows from the root (inclusive) to the focus window
    /// (inclusive); empty for the sentinel targets
    pub trace: Vec<WindowId>,
}

impl FocusState {
    pub(super) fn new() -> FocusState {
        FocusState {
            win: FocusWindow::PointerRoot,
            revert_to: RevertTo::PointerRoot,
            time: Timestamp(0),
            trace: Vec::new(),
        }
    }

    /// Whether `window` appears in the current focus trace.
    pub fn trace_contains(&self, window: WindowId) -> bool {
        self.trace.contains(&window)
    }

    /// Rebuild the trace for the new focus target.
    pub(super) fn retrace<D: DispatchHandler>(&mut self, data: &D, focus: FocusWindow) {
        self.win = focus;
        self.trace.clear();
        let mut cursor = focus.window();
        while let Some(win) = cursor {
            self.trace.push(win);
            cursor = data.parent(win);
        }
        self.trace.reverse();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::test_support::TestTree;

    #[test]
    fn sentinel_focus_has_empty_trace() {
        let tree = TestTree::new();
        let mut focus = FocusState::new();
        focus.retrace(&tree, FocusWindow::PointerRoot);
        assert!(focus.trace.is_empty());
        focus.retrace(&tree, FocusWindow::None);
        assert!(focus.trace.is_empty());
    }

    #[test]
    fn window_focus_traces_ancestry() {
        let mut tree = TestTree::new();
        let a = tree.add_window(tree.root());
        let b = tree.add_window(a);
        let mut focus = FocusState::new();
        focus.retrace(&tree, FocusWindow::Window(b));
        assert_eq!(focus.trace, vec![tree.root(), a, b]);
        assert_eq!(focus.win.window(), Some(b));
    }
}
