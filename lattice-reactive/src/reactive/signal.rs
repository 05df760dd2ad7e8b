//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and a
//! version, and notifies its observers when the value changes.
//!
//! # How Signals Work
//!
//! 1. When a signal is read while a memo or effect is recording, the read is
//!    registered as a dependency of that computation.
//!
//! 2. `set()` compares the new value with the current one using the signal's
//!    equality function. Equal values are ignored entirely: no version bump,
//!    no notification.
//!
//! 3. A real change bumps the version and pushes the new value to observers,
//!    either immediately or at the end of the enclosing [`atomic`] batch.
//!
//! [`atomic`]: super::atomic
//!
//! # Memory Layout
//!
//! Each signal handle is a single `Rc` to shared state:
//! - A unique ID (8 bytes)
//! - The value and its version
//! - The equality function
//! - The observer list (grows with number of dependents)

use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::rc::{Rc, Weak};

use tracing::trace;

use super::context::track;
use super::error::Result;
use super::runtime::{Deliver, Runtime};
use super::source::{Readable, SignalId, Source};
use super::subscriber::{Notifier, Observer, Subscription};
use super::version::Version;

/// Equality used to decide whether a write is a change.
pub type Equality<T> = Box<dyn Fn(&T, &T) -> bool>;

/// A mutable reactive value of type `T`.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
///
/// // Read the value
/// let value = count.get();
///
/// // Update the value (notifies observers)
/// count.set(5);
/// ```
pub struct Signal<T: 'static> {
    inner: Rc<SignalInner<T>>,
}

pub(crate) struct SignalInner<T: 'static> {
    id: SignalId,
    this: Weak<SignalInner<T>>,
    value: RefCell<T>,
    version: Cell<Version>,
    equal: Equality<T>,
    notifier: Notifier<T>,
}

impl<T> Signal<T>
where
    T: Clone + PartialEq + 'static,
{
    /// Create a new signal with the given initial value.
    ///
    /// Writes equal to the current value (by `PartialEq`) are ignored.
    pub fn new(value: T) -> Self {
        Self::with_equality(value, |a, b| a == b)
    }
}

impl<T> Signal<T>
where
    T: Clone + 'static,
{
    /// Create a new signal that uses `equal` to detect changes.
    pub fn with_equality<F>(value: T, equal: F) -> Self
    where
        F: Fn(&T, &T) -> bool + 'static,
    {
        let inner = Rc::new_cyclic(|this| SignalInner {
            id: SignalId::new(),
            this: this.clone(),
            value: RefCell::new(value),
            version: Cell::new(Version::INITIAL),
            equal: Box::new(equal),
            notifier: Notifier::new(),
        });
        Self { inner }
    }

    /// Start counting versions from `version` instead of zero.
    #[must_use]
    pub fn at_version(self, version: Version) -> Self {
        self.inner.version.set(version);
        self
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> SignalId {
        self.inner.id
    }

    /// Get the current value.
    ///
    /// If called while a memo or effect is recording, this also registers
    /// the signal as one of its dependencies.
    pub fn get(&self) -> T {
        track(&self.inner);
        self.get_untracked()
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Borrow the current value without cloning it. The read is tracked.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        track(&self.inner);
        f(&*self.inner.value.borrow())
    }

    /// Set a new value and notify observers if it differs from the current
    /// one.
    pub fn set(&self, value: T) {
        let unchanged = (self.inner.equal)(&*self.inner.value.borrow(), &value);
        if unchanged {
            return;
        }

        *self.inner.value.borrow_mut() = value;
        let version = self.inner.version.get().next();
        self.inner.version.set(version);
        trace!(signal = %self.inner.id, %version, "signal changed");

        self.inner.request_notify();
    }

    /// Update the value using a function of the current value.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let next = f(&*self.inner.value.borrow());
        self.set(next);
    }

    /// The current version.
    pub fn version(&self) -> Version {
        self.inner.version.get()
    }

    /// Attach an observer.
    ///
    /// The observer is called with the current value right away, then with
    /// every new value until the subscription is dropped.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&T) + 'static,
    {
        self.inner.subscribe(Rc::new(observer))
    }

    /// Get the number of observers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.notifier.len()
    }

    pub(crate) fn inner(&self) -> &Rc<SignalInner<T>> {
        &self.inner
    }
}

impl<T> SignalInner<T>
where
    T: Clone + 'static,
{
    fn request_notify(&self) {
        if self.notifier.is_empty() {
            return;
        }
        let this: Weak<dyn Deliver> = self.this.clone();
        Runtime::notify(self.id, this);
    }

    fn subscribe(&self, observer: Observer<T>) -> Subscription {
        let id = self.notifier.add(Rc::clone(&observer));

        let current = self.value.borrow().clone();
        observer(&current);

        let this = self.this.clone();
        Subscription::new(move || {
            if let Some(inner) = this.upgrade() {
                inner.notifier.remove(id);
            }
        })
    }
}

impl<T> Deliver for SignalInner<T>
where
    T: Clone + 'static,
{
    fn deliver(&self) {
        let current = self.value.borrow().clone();
        self.notifier.notify(&current);
    }
}

impl<T> Source for SignalInner<T>
where
    T: Clone + 'static,
{
    fn id(&self) -> SignalId {
        self.id
    }

    fn version(&self) -> Version {
        self.version.get()
    }

    fn is_valid(&self) -> bool {
        true
    }

    fn validate(&self) -> Result<()> {
        Ok(())
    }

    fn is_watched(&self) -> bool {
        !self.notifier.is_empty()
    }

    fn watch(&self, on_change: Rc<dyn Fn()>) -> Result<Subscription> {
        Ok(self.subscribe(Rc::new(move |_: &T| on_change())))
    }
}

impl<T> Source for Signal<T>
where
    T: Clone + 'static,
{
    fn id(&self) -> SignalId {
        self.inner.id
    }

    fn version(&self) -> Version {
        self.inner.version.get()
    }

    fn is_valid(&self) -> bool {
        true
    }

    fn validate(&self) -> Result<()> {
        Ok(())
    }

    fn is_watched(&self) -> bool {
        self.inner.is_watched()
    }

    fn watch(&self, on_change: Rc<dyn Fn()>) -> Result<Subscription> {
        self.inner.watch(on_change)
    }
}

impl<T> Readable<T> for Signal<T>
where
    T: Clone + 'static,
{
    fn try_get(&self) -> Result<T> {
        Ok(self.get())
    }

    fn observe(&self, observer: Observer<T>) -> Result<Subscription> {
        Ok(self.inner.subscribe(observer))
    }
}

impl<T: 'static> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &self.get_untracked())
            .field("version", &self.version())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_get_and_set() {
        let signal = Signal::new(0);
        assert_eq!(signal.get(), 0);

        signal.set(42);
        assert_eq!(signal.get(), 42);
    }

    #[test]
    fn signal_update() {
        let signal = Signal::new(10);
        signal.update(|v| v + 5);
        assert_eq!(signal.get(), 15);
    }

    #[test]
    fn version_counts_real_changes_only() {
        let signal = Signal::new(0);
        assert_eq!(signal.version(), Version::INITIAL);

        signal.set(1);
        signal.set(1);
        signal.set(2);
        signal.set(3);
        signal.set(3);

        assert_eq!(signal.version(), Version::new(3));
    }

    #[test]
    fn version_wraps_to_min() {
        let signal = Signal::new(0).at_version(Version::new(i64::MAX));
        signal.set(1);
        assert_eq!(signal.version(), Version::new(i64::MIN));
    }

    #[test]
    fn custom_equality_controls_changes() {
        // Case-insensitive strings.
        let signal = Signal::with_equality("hello".to_string(), |a: &String, b: &String| {
            a.eq_ignore_ascii_case(b)
        });

        signal.set("HELLO".to_string());
        assert_eq!(signal.get(), "hello");
        assert_eq!(signal.version(), Version::INITIAL);

        signal.set("world".to_string());
        assert_eq!(signal.get(), "world");
        assert_eq!(signal.version(), Version::new(1));
    }

    #[test]
    fn subscribe_replays_then_notifies() {
        let signal = Signal::new(0);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();

        let _subscription = signal.subscribe(move |value| seen_clone.borrow_mut().push(*value));
        assert_eq!(*seen.borrow(), [0]);

        signal.set(1);
        signal.set(1);
        signal.set(2);
        assert_eq!(*seen.borrow(), [0, 1, 2]);
    }

    #[test]
    fn signal_unsubscribe() {
        let signal = Signal::new(0);
        let call_count = Rc::new(Cell::new(0));
        let call_count_clone = call_count.clone();

        let subscription = signal.subscribe(move |_| {
            call_count_clone.set(call_count_clone.get() + 1);
        });
        assert_eq!(signal.subscriber_count(), 1);

        signal.set(1);
        assert_eq!(call_count.get(), 2);

        subscription.unsubscribe();
        signal.set(2);
        assert_eq!(call_count.get(), 2);
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn signal_clone_shares_state() {
        let signal1 = Signal::new(0);
        let signal2 = signal1.clone();

        signal1.set(42);
        assert_eq!(signal2.get(), 42);

        signal2.set(100);
        assert_eq!(signal1.get(), 100);
        assert_eq!(signal1.id(), signal2.id());
    }

    #[test]
    fn signal_ids_are_unique() {
        let s1 = Signal::new(0);
        let s2 = Signal::new(0);
        let s3 = Signal::new(0);

        assert_ne!(s1.id(), s2.id());
        assert_ne!(s2.id(), s3.id());
        assert_ne!(s1.id(), s3.id());
    }

    #[test]
    fn root_signals_are_always_valid() {
        let signal = Signal::new(5);
        signal.set(6);

        assert!(Source::is_valid(&signal));
        assert!(Source::validate(&signal).is_ok());
        assert!(!Source::is_watched(&signal));
    }
}
