//! Synchronous publish/subscribe used for change notifications.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Handle returned by [`Signal::connect`].
pub type ListenerId = u64;

type Listener<T> = Rc<dyn Fn(&T)>;

/// A list of listeners called in registration order.
///
/// Listeners may connect, disconnect or mutate the emitting model while
/// being called; each emission works on a snapshot of the listener list.
pub struct Signal<T> {
    listeners: RefCell<BTreeMap<ListenerId, Listener<T>>>,
    next_id: Cell<ListenerId>,
}

impl<T> Signal<T> {
    pub fn new() -> Self {
        Self {
            listeners: RefCell::new(BTreeMap::new()),
            next_id: Cell::new(1),
        }
    }

    /// Register a listener and return its id.
    pub fn connect(&self, listener: impl Fn(&T) + 'static) -> ListenerId {
        let id = self.next_id.get();
        self.next_id.set(id.saturating_add(1));
        self.listeners.borrow_mut().insert(id, Rc::new(listener));
        id
    }

    /// Remove a listener. Returns `false` if the id was unknown.
    pub fn disconnect(&self, id: ListenerId) -> bool {
        self.listeners.borrow_mut().remove(&id).is_some()
    }

    /// Number of connected listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub(crate) fn emit(&self, value: &T) {
        let snapshot: Vec<Listener<T>> = self.listeners.borrow().values().cloned().collect();
        for listener in snapshot {
            listener(value);
        }
    }

    pub(crate) fn clear(&self) {
        self.listeners.borrow_mut().clear();
    }
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
