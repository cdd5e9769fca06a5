//! Change notification for grid layout and cell edits.
//!
//! Subscribers register a callback and receive a [`Subscription`] token.
//! Lifetime contract: a callback is owned by the feed and is removed when its
//! token is dropped, so a callback never runs after its subscriber released
//! the token. A token dropped from inside a running notification takes effect
//! once that notification returns, and a callback registered from inside a
//! running notification starts receiving changes from the next one.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{trace, warn};

use crate::map::point_types::GridCoord;

/// A structural change to the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridChange {
    /// The grid was allocated, resized, re-topologized or deallocated.
    Layout {
        /// New row count (`0` when deallocated).
        rows: usize,
        /// New column count (`0` when deallocated).
        cols: usize,
    },
    /// The content of one cell changed.
    Cell {
        /// The edited cell.
        coord: GridCoord,
        /// Whether the cell switched between blocking and free.
        blocking_changed: bool,
    },
}

type Callback = Box<dyn FnMut(&GridChange)>;

struct Slot {
    id: u64,
    callback: Callback,
}

#[derive(Default)]
struct FeedShared {
    slots: RefCell<Vec<Slot>>,
    /// Registered while `slots` was borrowed by a notification.
    joining: RefCell<Vec<Slot>>,
    retired: RefCell<Vec<u64>>,
    next_id: Cell<u64>,
}

impl FeedShared {
    fn purge(&self, slots: &mut Vec<Slot>) {
        slots.append(&mut self.joining.borrow_mut());
        let mut retired = self.retired.borrow_mut();
        if !retired.is_empty() {
            slots.retain(|slot| !retired.contains(&slot.id));
            retired.clear();
        }
    }
}

/// Publisher side of the grid change notification channel.
#[derive(Default)]
pub struct ChangeFeed {
    shared: Rc<FeedShared>,
}

impl ChangeFeed {
    /// Creates a feed without subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback`; it runs synchronously on every `notify` until the
    /// returned token is dropped.
    #[must_use = "dropping the subscription unregisters the callback immediately"]
    pub fn subscribe(&self, callback: impl FnMut(&GridChange) + 'static) -> Subscription {
        let id = self.shared.next_id.get();
        self.shared.next_id.set(id + 1);

        let slot = Slot { id, callback: Box::new(callback) };
        match self.shared.slots.try_borrow_mut() {
            Ok(mut slots) => slots.push(slot),
            Err(_) => {
                // Only reachable from inside a callback.
                trace!(id, "Subscribing during a notification; joining after it");
                self.shared.joining.borrow_mut().push(slot);
            }
        }

        Subscription { id, feed: Rc::downgrade(&self.shared) }
    }

    /// Delivers `change` to every live subscriber in registration order.
    pub fn notify(&self, change: GridChange) {
        let Ok(mut slots) = self.shared.slots.try_borrow_mut() else {
            warn!(?change, "Re-entrant grid notification ignored");
            return;
        };

        self.shared.purge(&mut slots);
        trace!(?change, subscribers = slots.len(), "Notifying grid subscribers");
        for slot in slots.iter_mut() {
            (slot.callback)(&change);
        }
        self.shared.purge(&mut slots);
    }

    /// Number of registered callbacks.
    pub fn subscriber_count(&self) -> usize {
        let retired = self.shared.retired.borrow().len();
        let joining = self.shared.joining.borrow().len();
        (self.shared.slots.borrow().len() + joining).saturating_sub(retired)
    }
}

impl fmt::Debug for ChangeFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeFeed")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Token keeping a feed callback registered. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    feed: Weak<FeedShared>,
}

impl Subscription {
    /// Whether the feed this token belongs to still exists.
    pub fn is_connected(&self) -> bool {
        self.feed.strong_count() > 0
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(shared) = self.feed.upgrade() else {
            return;
        };
        match shared.slots.try_borrow_mut() {
            Ok(mut slots) => slots.retain(|slot| slot.id != self.id),
            Err(_) => {
                let mut joining = shared.joining.borrow_mut();
                let before = joining.len();
                joining.retain(|slot| slot.id != self.id);
                if joining.len() == before {
                    shared.retired.borrow_mut().push(self.id);
                }
            }
        }
    }
}
