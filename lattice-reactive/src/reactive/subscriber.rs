//! Push Notifications
//!
//! The push side of the engine. Every signal owns a [`Notifier`], a list of
//! observers that receive the signal's value whenever it changes. Subscribing
//! hands back a [`Subscription`]; dropping it (or calling
//! [`Subscription::unsubscribe`]) detaches the observer.
//!
//! Observers are invoked synchronously on the caller's stack. The observer
//! list is snapshotted before delivery so callbacks may freely subscribe or
//! unsubscribe while a notification is in flight.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;

/// Unique identifier for an observer within one notifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Callback invoked with a signal's value on every change.
pub type Observer<T> = Rc<dyn Fn(&T)>;

/// The observer list of a single signal.
pub(crate) struct Notifier<T> {
    observers: RefCell<Vec<(ObserverId, Observer<T>)>>,
    next_id: Cell<u64>,
}

impl<T> Notifier<T> {
    pub(crate) fn new() -> Self {
        Self {
            observers: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        }
    }

    /// Attach an observer. It will not be called until the next `notify`.
    pub(crate) fn add(&self, observer: Observer<T>) -> ObserverId {
        let id = ObserverId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.observers.borrow_mut().push((id, observer));
        id
    }

    /// Detach an observer. Returns whether it was attached.
    pub(crate) fn remove(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.borrow_mut();
        let before = observers.len();
        observers.retain(|(observer_id, _)| *observer_id != id);
        observers.len() != before
    }

    /// Detach every observer.
    pub(crate) fn clear(&self) {
        let observers = std::mem::take(&mut *self.observers.borrow_mut());
        drop(observers);
    }

    pub(crate) fn len(&self) -> usize {
        self.observers.borrow().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.observers.borrow().is_empty()
    }

    /// Deliver `value` to every observer attached right now.
    pub(crate) fn notify(&self, value: &T) {
        let snapshot: SmallVec<[Observer<T>; 4]> = self
            .observers
            .borrow()
            .iter()
            .map(|(_, observer)| Rc::clone(observer))
            .collect();

        for observer in snapshot {
            observer(value);
        }
    }
}

/// Handle to an attached observer.
///
/// Dropping the handle detaches the observer.
#[must_use = "dropping a Subscription immediately unsubscribes"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    /// Wrap a release callback. Hand-written [`Source`](super::Source)
    /// implementations use this to hand out their own subscriptions.
    pub fn new<F>(release: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Detach the observer now.
    pub fn unsubscribe(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}
