//! Enter/Leave and FocusIn/FocusOut computation
//!
//! With several master devices, a window only learns about a crossing when
//! its view of "which device is here" actually changed. The presence table
//! records, per device, the window the pointer is directly in and the window
//! holding the keyboard focus; every notification is checked against it
//! before being emitted.
//!
//! Detail codes follow the classic taxonomy: the windows between an old and
//! new position get Virtual/NonlinearVirtual notifications, the endpoints
//! get Ancestor/Inferior/Nonlinear depending on their relationship, and a
//! suppressed endpoint whose presence merely moved deeper is rewritten to
//! Inferior.

use std::collections::HashMap;

use tracing::trace;

use super::event::{CrossingDetail, CrossingEvent, CrossingMode, Event, FocusEvent};
use super::focus::FocusWindow;
use super::{DeviceId, DispatchHandler, WindowId};

/// Which window each device is directly in, pointer and focus separately.
#[derive(Debug, Default)]
pub struct Presence {
    pointer: HashMap<DeviceId, WindowId>,
    focus: HashMap<DeviceId, FocusWindow>,
}

impl Presence {
    /// The window `device`'s pointer is directly in.
    pub fn pointer(&self, device: DeviceId) -> Option<WindowId> {
        self.pointer.get(&device).copied()
    }

    /// The focus of `device`, if one was recorded.
    pub fn focus(&self, device: DeviceId) -> Option<FocusWindow> {
        self.focus.get(&device).copied()
    }

    /// Forget a removed device entirely.
    pub fn remove_device(&mut self, device: DeviceId) {
        self.pointer.remove(&device);
        self.focus.remove(&device);
    }

    /// Record a pointer position without generating events, for device
    /// creation and silent warps.
    pub fn note_pointer(&mut self, device: DeviceId, window: WindowId) {
        self.pointer.insert(device, window);
    }

    /// Record a focus without generating events.
    pub fn note_focus(&mut self, device: DeviceId, focus: FocusWindow) {
        self.focus.insert(device, focus);
    }

    fn has_pointer(&self, window: WindowId, moving_grabbed: bool) -> bool {
        // a grabbed device reports no presence anywhere; its sprite moves
        // with the grab, not with what windows observe
        if moving_grabbed {
            return false;
        }
        self.pointer.values().any(|win| *win == window)
    }

    fn has_other_pointer(&self, window: WindowId, exclude: Option<DeviceId>) -> bool {
        self.pointer
            .iter()
            .any(|(device, win)| Some(*device) != exclude && *win == window)
    }

    fn first_pointer_child<D: DispatchHandler>(
        &self,
        data: &mut D,
        window: WindowId,
    ) -> Option<WindowId> {
        self.pointer
            .values()
            .copied()
            .find(|win| is_ancestor(data, window, *win))
    }

    fn has_focus(&self, window: WindowId) -> bool {
        self.focus
            .values()
            .any(|focus| *focus == FocusWindow::Window(window))
    }

    fn first_focus_child<D: DispatchHandler>(
        &self,
        data: &mut D,
        window: WindowId,
    ) -> Option<WindowId> {
        self.focus
            .values()
            .copied()
            .filter_map(FocusWindow::window)
            .find(|win| is_ancestor(data, window, *win))
    }
}

/// Whether `ancestor` is a strict ancestor of `window`.
pub fn is_ancestor<D: DispatchHandler>(
    data: &mut D,
    ancestor: WindowId,
    window: WindowId,
) -> bool {
    let mut current = window;
    while let Some(parent) = data.parent(current) {
        if parent == ancestor {
            return true;
        }
        current = parent;
    }
    false
}

/// Lowest common ancestor of two windows. The windows themselves count.
pub fn common_ancestor<D: DispatchHandler>(
    data: &mut D,
    a: WindowId,
    b: WindowId,
) -> Option<WindowId> {
    let mut chain = vec![a];
    let mut current = a;
    while let Some(parent) = data.parent(current) {
        chain.push(parent);
        current = parent;
    }
    let mut current = b;
    loop {
        if chain.contains(&current) {
            return Some(current);
        }
        current = data.parent(current)?;
    }
}

/// Compute the Enter/Leave notifications for a pointer moving between two
/// windows, updating the presence table.
///
/// `grabbed` marks the moving device as holding a grab, which suppresses
/// its own presence from every check.
pub fn pointer_crossing<D: DispatchHandler>(
    data: &mut D,
    presence: &mut Presence,
    device: DeviceId,
    grabbed: bool,
    from: WindowId,
    to: WindowId,
    mode: CrossingMode,
    out: &mut Vec<Event>,
) {
    presence.pointer.remove(&device);
    if from != to {
        trace!(?device, ?from, ?to, "pointer crossing");
        let ctx = PointerCtx {
            device,
            grabbed,
            mode,
        };
        if is_ancestor(data, from, to) {
            pointer_to_descendant(data, presence, &ctx, from, to, out);
        } else if is_ancestor(data, to, from) {
            pointer_to_ancestor(data, presence, &ctx, from, to, out);
        } else if let Some(common) = common_ancestor(data, from, to) {
            pointer_nonlinear(data, presence, &ctx, from, to, common, out);
        }
    }
    presence.pointer.insert(device, to);
}

struct PointerCtx {
    device: DeviceId,
    grabbed: bool,
    mode: CrossingMode,
}

impl PointerCtx {
    fn event(
        &self,
        entered: bool,
        detail: CrossingDetail,
        window: WindowId,
        child: Option<WindowId>,
    ) -> Event {
        Event::Crossing(CrossingEvent {
            device: self.device,
            entered,
            mode: self.mode,
            detail,
            window,
            child,
        })
    }
}

// Enter notifications between `ancestor` (exclusive) and `below`
// (exclusive), top-down. A window keeps quiet while any pointer is on it or
// below it.
fn pointer_enter_between<D: DispatchHandler>(
    data: &mut D,
    presence: &Presence,
    ctx: &PointerCtx,
    ancestor: WindowId,
    below: WindowId,
    detail: CrossingDetail,
    out: &mut Vec<Event>,
) {
    let Some(parent) = data.parent(below) else {
        return;
    };
    if parent == ancestor {
        return;
    }
    pointer_enter_between(data, presence, ctx, ancestor, parent, detail, out);
    if !presence.has_pointer(parent, ctx.grabbed)
        && presence.first_pointer_child(data, parent).is_none()
    {
        out.push(ctx.event(true, detail, parent, Some(below)));
    }
}

// Leave notifications between `below` (exclusive) and `ancestor`
// (exclusive), bottom-up. The walk stops early once a window still holds
// presence, since everything above it sees no change either.
fn pointer_leave_between<D: DispatchHandler>(
    data: &mut D,
    presence: &Presence,
    ctx: &PointerCtx,
    below: WindowId,
    ancestor: WindowId,
    detail: CrossingDetail,
    out: &mut Vec<Event>,
) {
    let mut child = below;
    let mut current = data.parent(below);
    while let Some(window) = current {
        if window == ancestor {
            return;
        }
        if presence.has_pointer(window, ctx.grabbed)
            || presence.first_pointer_child(data, window).is_some()
        {
            return;
        }
        out.push(ctx.event(false, detail, window, Some(child)));
        child = window;
        current = data.parent(window);
    }
}

fn pointer_to_descendant<D: DispatchHandler>(
    data: &mut D,
    presence: &Presence,
    ctx: &PointerCtx,
    from: WindowId,
    to: WindowId,
    out: &mut Vec<Event>,
) {
    if !presence.has_pointer(from, ctx.grabbed) {
        out.push(ctx.event(false, CrossingDetail::Inferior, from, None));
    }
    pointer_enter_between(data, presence, ctx, from, to, CrossingDetail::Virtual, out);
    if !presence.has_pointer(to, ctx.grabbed) {
        let detail = if presence.first_pointer_child(data, to).is_some() {
            CrossingDetail::Inferior
        } else {
            CrossingDetail::Ancestor
        };
        out.push(ctx.event(true, detail, to, None));
    }
}

fn pointer_to_ancestor<D: DispatchHandler>(
    data: &mut D,
    presence: &Presence,
    ctx: &PointerCtx,
    from: WindowId,
    to: WindowId,
    out: &mut Vec<Event>,
) {
    if !presence.has_pointer(from, ctx.grabbed) {
        let detail = if presence.first_pointer_child(data, from).is_some() {
            CrossingDetail::Inferior
        } else {
            CrossingDetail::Ancestor
        };
        out.push(ctx.event(false, detail, from, None));
    }
    pointer_leave_between(data, presence, ctx, from, to, CrossingDetail::Virtual, out);
    if !presence.has_pointer(to, ctx.grabbed) {
        out.push(ctx.event(true, CrossingDetail::Inferior, to, None));
    }
}

fn pointer_nonlinear<D: DispatchHandler>(
    data: &mut D,
    presence: &Presence,
    ctx: &PointerCtx,
    from: WindowId,
    to: WindowId,
    common: WindowId,
    out: &mut Vec<Event>,
) {
    if !presence.has_pointer(from, ctx.grabbed) {
        let detail = if presence.first_pointer_child(data, from).is_some() {
            CrossingDetail::Inferior
        } else {
            CrossingDetail::Nonlinear
        };
        out.push(ctx.event(false, detail, from, None));
    }
    pointer_leave_between(
        data,
        presence,
        ctx,
        from,
        common,
        CrossingDetail::NonlinearVirtual,
        out,
    );
    pointer_enter_between(
        data,
        presence,
        ctx,
        common,
        to,
        CrossingDetail::NonlinearVirtual,
        out,
    );
    if !presence.has_pointer(to, ctx.grabbed) {
        let detail = if presence.first_pointer_child(data, to).is_some() {
            CrossingDetail::Inferior
        } else {
            CrossingDetail::Nonlinear
        };
        out.push(ctx.event(true, detail, to, None));
    }
}

/// Compute the FocusIn/FocusOut notifications for a keyboard's focus moving
/// between two targets, updating the presence table.
///
/// `paired_pointer` is the keyboard's paired master pointer; windows
/// between it and the focus get the NotifyPointer runs.
#[allow(clippy::too_many_arguments)]
pub fn focus_change<D: DispatchHandler>(
    data: &mut D,
    presence: &mut Presence,
    device: DeviceId,
    paired_pointer: Option<DeviceId>,
    from: FocusWindow,
    to: FocusWindow,
    root: WindowId,
    mode: CrossingMode,
    out: &mut Vec<Event>,
) {
    presence.focus.remove(&device);
    if from != to {
        trace!(?device, ?from, ?to, "focus change");
        let pointer_win = paired_pointer.and_then(|pointer| presence.pointer(pointer));
        let ctx = FocusCtx {
            device,
            mode,
            pointer_win,
            paired_pointer,
        };
        match (from, to) {
            (
                FocusWindow::None | FocusWindow::PointerRoot,
                FocusWindow::None | FocusWindow::PointerRoot,
            ) => focus_root_switch(data, presence, &ctx, from, to, root, out),
            (FocusWindow::Window(a), FocusWindow::None | FocusWindow::PointerRoot) => {
                focus_to_root(data, presence, &ctx, a, to, root, out)
            }
            (FocusWindow::None | FocusWindow::PointerRoot, FocusWindow::Window(b)) => {
                focus_from_root(data, presence, &ctx, from, b, root, out)
            }
            (FocusWindow::Window(a), FocusWindow::Window(b)) => {
                if is_ancestor(data, a, b) {
                    focus_to_descendant(data, presence, &ctx, a, b, out);
                } else if is_ancestor(data, b, a) {
                    focus_to_ancestor(data, presence, &ctx, a, b, out);
                } else if let Some(common) = common_ancestor(data, a, b) {
                    focus_nonlinear(data, presence, &ctx, a, b, common, out);
                }
            }
        }
    }
    presence.focus.insert(device, to);
}

struct FocusCtx {
    device: DeviceId,
    mode: CrossingMode,
    pointer_win: Option<WindowId>,
    paired_pointer: Option<DeviceId>,
}

impl FocusCtx {
    fn event(&self, focused: bool, detail: CrossingDetail, window: WindowId) -> Event {
        Event::Focus(FocusEvent {
            device: self.device,
            focused,
            mode: self.mode,
            detail,
            window,
        })
    }
}

fn focus_in_between<D: DispatchHandler>(
    data: &mut D,
    presence: &Presence,
    ctx: &FocusCtx,
    ancestor: WindowId,
    below: WindowId,
    detail: CrossingDetail,
    out: &mut Vec<Event>,
) {
    let Some(parent) = data.parent(below) else {
        return;
    };
    if parent == ancestor {
        return;
    }
    focus_in_between(data, presence, ctx, ancestor, parent, detail, out);
    if !presence.has_focus(parent) && presence.first_focus_child(data, parent).is_none() {
        out.push(ctx.event(true, detail, parent));
    }
}

// `ancestor` of `None` walks all the way past the root.
fn focus_out_between<D: DispatchHandler>(
    data: &mut D,
    presence: &Presence,
    ctx: &FocusCtx,
    below: WindowId,
    ancestor: Option<WindowId>,
    detail: CrossingDetail,
    out: &mut Vec<Event>,
) {
    let mut current = data.parent(below);
    while let Some(window) = current {
        if Some(window) == ancestor {
            return;
        }
        if presence.has_focus(window) || presence.first_focus_child(data, window).is_some() {
            return;
        }
        out.push(ctx.event(false, detail, window));
        current = data.parent(window);
    }
}

// FocusOut(NotifyPointer) from the pointer window up to `boundary`,
// exclusive unless `inclusive`. Skipped when the pointer is outside the
// boundary's subtree or entangled with `exclude`.
fn focus_out_pointer_run<D: DispatchHandler>(
    data: &mut D,
    ctx: &FocusCtx,
    boundary: WindowId,
    exclude: Option<WindowId>,
    inclusive: bool,
    out: &mut Vec<Event>,
) {
    let Some(pointer_win) = ctx.pointer_win else {
        return;
    };
    if !is_ancestor(data, boundary, pointer_win) && !(pointer_win == boundary && inclusive) {
        return;
    }
    if let Some(exclude) = exclude {
        if is_ancestor(data, exclude, pointer_win) || is_ancestor(data, pointer_win, exclude) {
            return;
        }
    }
    let stop_at = if inclusive {
        data.parent(boundary)
    } else {
        Some(boundary)
    };
    let mut current = Some(pointer_win);
    while let Some(window) = current {
        if Some(window) == stop_at {
            return;
        }
        out.push(ctx.event(false, CrossingDetail::Pointer, window));
        current = data.parent(window);
    }
}

// FocusIn(NotifyPointer) from below `boundary` down to the pointer window,
// top-down.
fn focus_in_pointer_run<D: DispatchHandler>(
    data: &mut D,
    ctx: &FocusCtx,
    boundary: WindowId,
    exclude: Option<WindowId>,
    inclusive: bool,
    out: &mut Vec<Event>,
) {
    let Some(pointer_win) = ctx.pointer_win else {
        return;
    };
    if !is_ancestor(data, boundary, pointer_win) && !(pointer_win == boundary && inclusive) {
        return;
    }
    if let Some(exclude) = exclude {
        if is_ancestor(data, exclude, pointer_win) || is_ancestor(data, pointer_win, exclude) {
            return;
        }
    }
    let mut run = Vec::new();
    let mut current = Some(pointer_win);
    while let Some(window) = current {
        run.push(window);
        if window == boundary {
            break;
        }
        current = data.parent(window);
    }
    if !inclusive && run.last() == Some(&boundary) {
        run.pop();
    }
    for window in run.into_iter().rev() {
        out.push(ctx.event(true, CrossingDetail::Pointer, window));
    }
}

fn focus_to_descendant<D: DispatchHandler>(
    data: &mut D,
    presence: &Presence,
    ctx: &FocusCtx,
    from: WindowId,
    to: WindowId,
    out: &mut Vec<Event>,
) {
    if !presence.has_focus(from) {
        focus_out_pointer_run(data, ctx, from, Some(to), false, out);
        out.push(ctx.event(false, CrossingDetail::Inferior, from));
    }
    focus_in_between(data, presence, ctx, from, to, CrossingDetail::Virtual, out);
    if !presence.has_focus(to) {
        match presence.first_focus_child(data, to) {
            Some(child) => {
                out.push(ctx.event(true, CrossingDetail::Inferior, to));
                focus_in_pointer_run(data, ctx, to, Some(child), false, out);
            }
            None => out.push(ctx.event(true, CrossingDetail::Ancestor, to)),
        }
    }
}

fn focus_to_ancestor<D: DispatchHandler>(
    data: &mut D,
    presence: &Presence,
    ctx: &FocusCtx,
    from: WindowId,
    to: WindowId,
    out: &mut Vec<Event>,
) {
    if !presence.has_focus(from) {
        match presence.first_focus_child(data, from) {
            Some(child) => {
                focus_out_pointer_run(data, ctx, from, Some(child), false, out);
                out.push(ctx.event(false, CrossingDetail::Inferior, from));
            }
            None => out.push(ctx.event(false, CrossingDetail::Ancestor, from)),
        }
    }
    focus_out_between(
        data,
        presence,
        ctx,
        from,
        Some(to),
        CrossingDetail::Virtual,
        out,
    );
    if !presence.has_focus(to) {
        out.push(ctx.event(true, CrossingDetail::Inferior, to));
        focus_in_pointer_run(data, ctx, to, Some(from), false, out);
    }
}

fn focus_nonlinear<D: DispatchHandler>(
    data: &mut D,
    presence: &Presence,
    ctx: &FocusCtx,
    from: WindowId,
    to: WindowId,
    common: WindowId,
    out: &mut Vec<Event>,
) {
    if !presence.has_focus(from) {
        match presence.first_focus_child(data, from) {
            Some(child) => {
                focus_out_pointer_run(data, ctx, from, Some(child), false, out);
                out.push(ctx.event(false, CrossingDetail::Inferior, from));
            }
            None => {
                focus_out_pointer_run(data, ctx, from, None, false, out);
                out.push(ctx.event(false, CrossingDetail::Nonlinear, from));
            }
        }
    }
    focus_out_between(
        data,
        presence,
        ctx,
        from,
        Some(common),
        CrossingDetail::NonlinearVirtual,
        out,
    );
    focus_in_between(
        data,
        presence,
        ctx,
        common,
        to,
        CrossingDetail::NonlinearVirtual,
        out,
    );
    if !presence.has_focus(to) {
        match presence.first_focus_child(data, to) {
            Some(child) => {
                out.push(ctx.event(true, CrossingDetail::Inferior, to));
                focus_in_pointer_run(data, ctx, to, Some(child), false, out);
            }
            None => {
                out.push(ctx.event(true, CrossingDetail::Nonlinear, to));
                focus_in_pointer_run(data, ctx, to, None, false, out);
            }
        }
    }
}

fn root_detail(target: FocusWindow) -> CrossingDetail {
    match target {
        FocusWindow::PointerRoot => CrossingDetail::PointerRoot,
        _ => CrossingDetail::DetailNone,
    }
}

fn focus_root_switch<D: DispatchHandler>(
    data: &mut D,
    presence: &Presence,
    ctx: &FocusCtx,
    from: FocusWindow,
    to: FocusWindow,
    root: WindowId,
    out: &mut Vec<Event>,
) {
    if presence.has_other_pointer(root, ctx.paired_pointer)
        || presence.first_focus_child(data, root).is_some()
    {
        return;
    }
    if from == FocusWindow::PointerRoot && to != FocusWindow::PointerRoot {
        if let Some(pointer_win) = ctx.pointer_win {
            if is_ancestor(data, root, pointer_win) {
                focus_out_pointer_run(data, ctx, root, None, true, out);
            }
        }
    }
    out.push(ctx.event(false, root_detail(from), root));
    out.push(ctx.event(true, root_detail(to), root));
    if to == FocusWindow::PointerRoot {
        focus_in_pointer_run(data, ctx, root, None, true, out);
    }
}

fn focus_to_root<D: DispatchHandler>(
    data: &mut D,
    presence: &Presence,
    ctx: &FocusCtx,
    from: WindowId,
    to: FocusWindow,
    root: WindowId,
    out: &mut Vec<Event>,
) {
    if !presence.has_focus(from) {
        match presence.first_focus_child(data, from) {
            Some(child) => {
                focus_out_pointer_run(data, ctx, from, Some(child), false, out);
                out.push(ctx.event(false, CrossingDetail::Inferior, from));
            }
            None => {
                focus_out_pointer_run(data, ctx, from, None, false, out);
                out.push(ctx.event(false, CrossingDetail::Nonlinear, from));
            }
        }
    }
    focus_out_between(
        data,
        presence,
        ctx,
        from,
        None,
        CrossingDetail::NonlinearVirtual,
        out,
    );
    if !presence.has_focus(root) && presence.first_focus_child(data, root).is_none() {
        out.push(ctx.event(true, root_detail(to), root));
        if to == FocusWindow::PointerRoot {
            focus_in_pointer_run(data, ctx, root, None, true, out);
        }
    }
}

fn focus_from_root<D: DispatchHandler>(
    data: &mut D,
    presence: &Presence,
    ctx: &FocusCtx,
    from: FocusWindow,
    to: WindowId,
    root: WindowId,
    out: &mut Vec<Event>,
) {
    if !presence.has_focus(root) && presence.first_focus_child(data, root).is_none() {
        if from == FocusWindow::PointerRoot && ctx.pointer_win.is_some() {
            focus_out_pointer_run(data, ctx, root, None, true, out);
        }
        out.push(ctx.event(false, root_detail(from), root));
    }
    if to != root {
        out.push(ctx.event(true, CrossingDetail::NonlinearVirtual, root));
        focus_in_between(
            data,
            presence,
            ctx,
            root,
            to,
            CrossingDetail::NonlinearVirtual,
            out,
        );
    }
    if !presence.has_focus(to) {
        match presence.first_focus_child(data, to) {
            Some(child) => {
                out.push(ctx.event(true, CrossingDetail::Inferior, to));
                focus_in_pointer_run(data, ctx, to, Some(child), false, out);
            }
            None => {
                out.push(ctx.event(true, CrossingDetail::Nonlinear, to));
                focus_in_pointer_run(data, ctx, to, None, false, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::test_support::TestTree;

    fn crossings(out: &[Event]) -> Vec<(bool, CrossingDetail, WindowId)> {
        out.iter()
            .map(|event| match event {
                Event::Crossing(ev) => (ev.entered, ev.detail, ev.window),
                other => panic!("unexpected event {other:?}"),
            })
            .collect()
    }

    #[test]
    fn descent_emits_inferior_then_ancestor() {
        let mut tree = TestTree::new();
        let root = tree.root();
        let child = tree.add_window(root);
        let grandchild = tree.add_window(child);
        let mut presence = Presence::default();
        presence.pointer.insert(DeviceId(1), root);

        let mut out = Vec::new();
        pointer_crossing(
            &mut tree,
            &mut presence,
            DeviceId(1),
            false,
            root,
            grandchild,
            CrossingMode::Normal,
            &mut out,
        );
        assert_eq!(
            crossings(&out),
            vec![
                (false, CrossingDetail::Inferior, root),
                (true, CrossingDetail::Virtual, child),
                (true, CrossingDetail::Ancestor, grandchild),
            ]
        );
        assert_eq!(presence.pointer(DeviceId(1)), Some(grandchild));
    }

    #[test]
    fn nonlinear_walks_through_the_common_ancestor() {
        let mut tree = TestTree::new();
        let root = tree.root();
        let left = tree.add_window(root);
        let right = tree.add_window(root);
        let deep = tree.add_window(right);
        let mut presence = Presence::default();
        presence.pointer.insert(DeviceId(1), left);

        let mut out = Vec::new();
        pointer_crossing(
            &mut tree,
            &mut presence,
            DeviceId(1),
            false,
            left,
            deep,
            CrossingMode::Normal,
            &mut out,
        );
        assert_eq!(
            crossings(&out),
            vec![
                (false, CrossingDetail::Nonlinear, left),
                (true, CrossingDetail::NonlinearVirtual, right),
                (true, CrossingDetail::Nonlinear, deep),
            ]
        );
    }

    #[test]
    fn second_device_suppresses_crossing() {
        let mut tree = TestTree::new();
        let root = tree.root();
        let shared = tree.add_window(root);
        let inner = tree.add_window(shared);
        let mut presence = Presence::default();
        presence.pointer.insert(DeviceId(1), inner);
        presence.pointer.insert(DeviceId(2), inner);

        // device 1 moves out of `shared` and back in; device 2 never left,
        // so `shared` and `inner` observe nothing about device 1's trip
        let mut out = Vec::new();
        pointer_crossing(
            &mut tree,
            &mut presence,
            DeviceId(1),
            false,
            inner,
            root,
            CrossingMode::Normal,
            &mut out,
        );
        assert!(
            !out.iter().any(|ev| ev.window() == shared || ev.window() == inner),
            "still-occupied windows must stay quiet: {out:?}"
        );

        out.clear();
        pointer_crossing(
            &mut tree,
            &mut presence,
            DeviceId(1),
            false,
            root,
            inner,
            CrossingMode::Normal,
            &mut out,
        );
        assert!(!out.iter().any(|ev| ev.window() == shared || ev.window() == inner));

        // once device 1 is gone for good, device 2's departure is real
        out.clear();
        pointer_crossing(
            &mut tree,
            &mut presence,
            DeviceId(1),
            false,
            inner,
            root,
            CrossingMode::Normal,
            &mut out,
        );
        out.clear();
        pointer_crossing(
            &mut tree,
            &mut presence,
            DeviceId(2),
            false,
            inner,
            root,
            CrossingMode::Normal,
            &mut out,
        );
        assert!(out
            .iter()
            .any(|ev| ev.window() == shared && matches!(ev, Event::Crossing(c) if !c.entered)));
    }

    #[test]
    fn surviving_descendant_rewrites_leave_to_inferior() {
        let mut tree = TestTree::new();
        let root = tree.root();
        let outer = tree.add_window(root);
        let inner = tree.add_window(outer);
        let mut presence = Presence::default();
        presence.pointer.insert(DeviceId(1), outer);
        presence.pointer.insert(DeviceId(2), inner);

        let mut out = Vec::new();
        pointer_crossing(
            &mut tree,
            &mut presence,
            DeviceId(1),
            false,
            outer,
            root,
            CrossingMode::Normal,
            &mut out,
        );
        // device 2 survives below `outer`, so its departure reads as a
        // move to an inferior; the root still sees the arrival, also with
        // inferior detail since device 2 remains below it
        assert_eq!(
            crossings(&out),
            vec![
                (false, CrossingDetail::Inferior, outer),
                (true, CrossingDetail::Inferior, root),
            ]
        );
    }

    #[test]
    fn focus_between_windows_uses_the_same_taxonomy() {
        let mut tree = TestTree::new();
        let root = tree.root();
        let a = tree.add_window(root);
        let b = tree.add_window(root);
        let mut presence = Presence::default();
        presence.focus.insert(DeviceId(2), FocusWindow::Window(a));

        let mut out = Vec::new();
        focus_change(
            &mut tree,
            &mut presence,
            DeviceId(2),
            None,
            FocusWindow::Window(a),
            FocusWindow::Window(b),
            root,
            CrossingMode::Normal,
            &mut out,
        );
        let details: Vec<_> = out
            .iter()
            .map(|event| match event {
                Event::Focus(ev) => (ev.focused, ev.detail, ev.window),
                other => panic!("unexpected event {other:?}"),
            })
            .collect();
        assert_eq!(
            details,
            vec![
                (false, CrossingDetail::Nonlinear, a),
                (true, CrossingDetail::Nonlinear, b),
            ]
        );
        assert_eq!(presence.focus(DeviceId(2)), Some(FocusWindow::Window(b)));
    }

    #[test]
    fn focus_to_pointer_root_notifies_pointer_spine() {
        let mut tree = TestTree::new();
        let root = tree.root();
        let app = tree.add_window(root);
        let mut presence = Presence::default();
        presence.pointer.insert(DeviceId(1), app);
        presence.focus.insert(DeviceId(2), FocusWindow::None);

        let mut out = Vec::new();
        focus_change(
            &mut tree,
            &mut presence,
            DeviceId(2),
            Some(DeviceId(1)),
            FocusWindow::None,
            FocusWindow::PointerRoot,
            root,
            CrossingMode::Normal,
            &mut out,
        );
        // the switch lands on the root, then a NotifyPointer run walks
        // down to the paired pointer's window
        let tail: Vec<_> = out
            .iter()
            .filter_map(|event| match event {
                Event::Focus(ev) if ev.detail == CrossingDetail::Pointer => {
                    Some((ev.focused, ev.window))
                }
                _ => None,
            })
            .collect();
        assert_eq!(tail, vec![(true, root), (true, app)]);
    }
}
