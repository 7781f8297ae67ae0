//! Key-event filter chain
//!
//! Higher layers, an input method most prominently, can intercept raw key
//! events addressed to a window before ordinary delivery runs. Filters are
//! consulted in registration order; the first one that consumes the event
//! ends both the chain and the delivery.

use tracing::trace;

use super::event::DeviceEvent;
use super::{DispatchHandler, WindowId};

/// Handle to a registered key filter, used to unregister it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct FilterId(u64);

/// Verdict of one filter invocation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FilterResult {
    /// The filter swallowed the event; delivery stops
    Consumed,
    /// The event continues to the next filter and then to delivery
    Forward,
}

type KeyFilter<D> = Box<dyn FnMut(&mut D, &DeviceEvent) -> FilterResult + Send>;

struct Registration<D> {
    id: FilterId,
    window: WindowId,
    filter: KeyFilter<D>,
}

/// Ordered chain of key filters, keyed by target window.
pub struct KeyFilterChain<D> {
    filters: Vec<Registration<D>>,
    next_id: u64,
}

impl<D> Default for KeyFilterChain<D> {
    fn default() -> Self {
        KeyFilterChain {
            filters: Vec::new(),
            next_id: 0,
        }
    }
}

impl<D> std::fmt::Debug for KeyFilterChain<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyFilterChain")
            .field("len", &self.filters.len())
            .finish()
    }
}

impl<D: DispatchHandler> KeyFilterChain<D> {
    /// Register a filter for key events addressed to `window`.
    pub fn register<F>(&mut self, window: WindowId, filter: F) -> FilterId
    where
        F: FnMut(&mut D, &DeviceEvent) -> FilterResult + Send + 'static,
    {
        self.next_id += 1;
        let id = FilterId(self.next_id);
        self.filters.push(Registration {
            id,
            window,
            filter: Box::new(filter),
        });
        id
    }

    /// Remove a previously registered filter.
    pub fn unregister(&mut self, id: FilterId) {
        self.filters.retain(|registration| registration.id != id);
    }

    /// Drop all filters targeting `window`.
    pub fn remove_window(&mut self, window: WindowId) {
        self.filters.retain(|registration| registration.window != window);
    }

    /// Run the chain for a key event whose delivery would start at any of
    /// `windows`. Returns `true` when a filter consumed the event.
    pub fn run(&mut self, data: &mut D, windows: &[WindowId], event: &DeviceEvent) -> bool {
        for registration in &mut self.filters {
            if !windows.contains(&registration.window) {
                continue;
            }
            if (registration.filter)(data, event) == FilterResult::Consumed {
                trace!(id = ?registration.id, window = ?registration.window, "key event consumed by filter");
                return true;
            }
        }
        false
    }

    /// Whether no filter is registered.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}
