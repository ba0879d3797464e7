//! Change notification bus.
//!
//! Two narrow capabilities, composed rather than inherited:
//!
//! - [`ChangeBus`]: the publishing side. Entities and lists each own one.
//! - [`Listener`]: the receiving side, a registered callback.
//!
//! Dispatch is synchronous and single-threaded. `notify()` calls every
//! listener in subscription order and passes no payload; listeners re-read
//! whatever state they care about. The bus never knows what a callback does.
//!
//! Listeners should only read state and schedule redraws. Mutating the
//! publisher from inside its own callback is not supported.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// A registered change callback
///
/// Cloning a `Listener` yields the same listener: subscription identity is
/// the identity of the wrapped callback, so subscribing a clone is a no-op.
#[derive(Clone)]
pub struct Listener {
    callback: Rc<dyn Fn()>,
}

impl Listener {
    /// Wrap a callback
    ///
    /// # Example
    ///
    /// ```
    /// use depot::notify::{ChangeBus, Listener};
    /// use std::cell::Cell;
    /// use std::rc::Rc;
    ///
    /// let redraws = Rc::new(Cell::new(0));
    /// let counter = Rc::clone(&redraws);
    /// let listener = Listener::new(move || counter.set(counter.get() + 1));
    ///
    /// let bus = ChangeBus::new();
    /// bus.subscribe(&listener);
    /// bus.notify();
    /// assert_eq!(redraws.get(), 1);
    /// ```
    pub fn new(callback: impl Fn() + 'static) -> Self {
        Self {
            callback: Rc::new(callback),
        }
    }

    /// Whether two handles refer to the same registered callback
    pub fn same(&self, other: &Listener) -> bool {
        Rc::ptr_eq(&self.callback, &other.callback)
    }

    fn fire(&self) {
        (self.callback)()
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("callback", &Rc::as_ptr(&self.callback).cast::<()>())
            .finish()
    }
}

/// Ordered set of listeners
#[derive(Default)]
pub struct ChangeBus {
    listeners: RefCell<Vec<Listener>>,
}

impl ChangeBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Returns `false` if it was already registered.
    pub fn subscribe(&self, listener: &Listener) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        if listeners.iter().any(|l| l.same(listener)) {
            return false;
        }
        listeners.push(listener.clone());
        true
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, listener: &Listener) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|l| !l.same(listener));
        listeners.len() != before
    }

    pub fn is_subscribed(&self, listener: &Listener) -> bool {
        self.listeners.borrow().iter().any(|l| l.same(listener))
    }

    /// Call every listener in subscription order
    pub fn notify(&self) {
        // Snapshot so a callback that (un)subscribes does not hit a live borrow.
        let listeners = self.listeners.borrow().clone();
        for listener in &listeners {
            listener.fire();
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.borrow().is_empty()
    }
}

impl fmt::Debug for ChangeBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeBus")
            .field("listeners", &self.len())
            .finish()
    }
}
