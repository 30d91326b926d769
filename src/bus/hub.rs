// Fan-out hub
// Synchronous single-threaded delivery backing the landmark stream and the event bus

use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

type Listener<T> = Box<dyn FnMut(&T)>;

struct HubInner<T> {
    next_id: u64,
    listeners: Vec<(u64, Listener<T>)>,
    /// Ids removed while their listener was checked out for delivery
    cancelled: HashSet<u64>,
    /// Listeners are checked out for delivery
    delivering: bool,
    /// `clear` was called while listeners were checked out
    cleared: bool,
    /// Items published from inside a listener, delivered once the current item finishes
    pending: VecDeque<T>,
}

impl<T> HubInner<T> {
    /// Detach a listener; the caller drops it once the borrow is released
    fn remove(&mut self, id: u64) -> Option<Listener<T>> {
        match self.listeners.iter().position(|(lid, _)| *lid == id) {
            Some(index) => Some(self.listeners.remove(index).1),
            None => {
                if self.delivering {
                    self.cancelled.insert(id);
                }
                None
            }
        }
    }
}

/// Fan-out hub with subscribe/unsubscribe semantics
pub struct Hub<T> {
    name: &'static str,
    inner: Rc<RefCell<HubInner<T>>>,
}

impl<T: Clone + 'static> Hub<T> {
    /// Create an empty hub; `name` only shows up in logs
    pub fn new(name: &'static str) -> Self {
        Hub {
            name,
            inner: Rc::new(RefCell::new(HubInner {
                next_id: 0,
                listeners: Vec::new(),
                cancelled: HashSet::new(),
                delivering: false,
                cleared: false,
                pending: VecDeque::new(),
            })),
        }
    }

    /// Register a listener; it receives every item published until the
    /// returned subscription is cancelled or dropped
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: FnMut(&T) + 'static,
    {
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.listeners.push((id, Box::new(listener)));
            id
        };

        let weak: Weak<RefCell<HubInner<T>>> = Rc::downgrade(&self.inner);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    let removed = inner.borrow_mut().remove(id);
                    drop(removed);
                }
            })),
        }
    }

    /// Deliver an item to every current listener
    /// Listeners may subscribe, unsubscribe or publish from inside the callback;
    /// a nested publish is queued and delivered in order after the current item
    pub fn publish(&self, item: &T) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.delivering {
                inner.pending.push_back(item.clone());
                return;
            }
        }

        self.deliver(item);
        loop {
            let next = self.inner.borrow_mut().pending.pop_front();
            match next {
                Some(queued) => self.deliver(&queued),
                None => break,
            }
        }
    }

    fn deliver(&self, item: &T) {
        let mut active = {
            let mut inner = self.inner.borrow_mut();
            inner.delivering = true;
            std::mem::take(&mut inner.listeners)
        };

        for (id, listener) in active.iter_mut() {
            let id = *id;
            {
                let inner = self.inner.borrow();
                if inner.cleared || inner.cancelled.contains(&id) {
                    continue;
                }
            }

            let result = panic::catch_unwind(AssertUnwindSafe(|| listener(item)));
            if result.is_err() {
                log::error!("Listener {} on {} panicked; continuing delivery", id, self.name);
            }
        }

        let removed: Vec<(u64, Listener<T>)> = {
            let mut inner = self.inner.borrow_mut();
            let cleared = inner.cleared;
            let (mut kept, removed): (Vec<_>, Vec<_>) = active
                .into_iter()
                .partition(|(id, _)| !cleared && !inner.cancelled.contains(id));
            // Keep registration order: survivors first, then anything added mid-delivery
            kept.append(&mut inner.listeners);
            inner.listeners = kept;
            inner.delivering = false;
            inner.cleared = false;
            inner.cancelled.clear();
            removed
        };
        // Listener captures may own subscriptions to this hub
        drop(removed);
    }

    /// Drop every listener and any queued items; outstanding subscriptions become no-ops
    pub fn clear(&self) {
        let (removed, dropped) = {
            let mut inner = self.inner.borrow_mut();
            if inner.delivering {
                inner.cleared = true;
            }
            (std::mem::take(&mut inner.listeners), std::mem::take(&mut inner.pending))
        };
        drop(removed);
        drop(dropped);
    }

    /// Number of live listeners
    pub fn listener_count(&self) -> usize {
        self.inner.borrow().listeners.len()
    }
}

impl<T> Clone for Hub<T> {
    fn clone(&self) -> Self {
        Hub {
            name: self.name,
            inner: Rc::clone(&self.inner),
        }
    }
}

/// Handle to a registered listener
/// Dropping it unsubscribes, so a listener never outlives its owner
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    /// Explicitly unsubscribe
    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
