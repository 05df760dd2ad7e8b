//! Memo Implementation
//!
//! A Memo is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Memos Work
//!
//! 1. Nothing runs at construction. On first access (or first subscription)
//!    the memo runs its computation inside a record pass, caching the result
//!    and the set of signals it read.
//!
//! 2. On later accesses, the memo validates its dependencies depth-first. If
//!    no dependency moved, the cached value is returned as is.
//!
//! 3. If a dependency moved, the memo recomputes. A result equal to the
//!    cached one keeps the old version, so memos downstream do not recompute
//!    either.
//!
//! 4. While something is subscribed, the memo is *watched*: it subscribes to
//!    its dependencies and recomputes as soon as one of them changes, pushing
//!    the new value to its own observers.
//!
//! # Why This Matters
//!
//! The lazy path avoids unnecessary recomputation:
//!
//! - A signal changes
//! - 10 memos depend on it
//! - Only the memos actually accessed will recompute
//! - Memos that are never read do no work at all
//!
//! The eager path is what lets effects run as soon as their inputs change.

use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use super::context::track;
use super::dependency::DependencySet;
use super::error::{ReactiveError, Result};
use super::runtime::{Deliver, Runtime};
use super::scope::{Destroy, Scope};
use super::signal::Equality;
use super::source::{Readable, SignalId, Source};
use super::subscriber::{Notifier, Observer, ObserverId, Subscription};
use super::version::Version;

/// Lifecycle of a memo's cached value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoState {
    /// Never computed.
    Uncomputed,

    /// The cached value was up to date at the last validation.
    Clean,

    /// A dependency changed and the last recomputation did not complete.
    Dirty,

    /// Destroyed. Every read fails from now on.
    Destroyed,
}

type Compute<T> = Box<dyn Fn() -> Result<T>>;

/// A cached derived value that recomputes only when dependencies change.
///
/// # Type Parameters
///
/// - `T`: The type of the computed value. Reads return clones.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(2);
/// let doubled = {
///     let count = count.clone();
///     Memo::new(move || count.get() * 2)
/// };
///
/// assert_eq!(doubled.get()?, 4);
/// count.set(5);
/// assert_eq!(doubled.get()?, 10);
/// ```
pub struct Memo<T: 'static> {
    inner: Rc<MemoInner<T>>,
}

pub(crate) struct MemoInner<T: 'static> {
    id: SignalId,
    this: Weak<MemoInner<T>>,
    compute: Compute<T>,
    equal: Equality<T>,
    value: RefCell<Option<T>>,
    version: Cell<Version>,
    state: Cell<MemoState>,
    /// Version last pushed to observers.
    delivered: Cell<Option<Version>>,
    deps: Rc<DependencySet>,
    notifier: Notifier<T>,
}

impl<T> Memo<T>
where
    T: Clone + PartialEq + 'static,
{
    /// Create a new memo from an infallible computation.
    ///
    /// The computation is not run immediately. It runs on first access.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self::with_equality(move || Ok(compute()), |a, b| a == b)
    }

    /// Create a new memo from a computation that may fail.
    ///
    /// Use this when the computation reads other memos with `?`.
    pub fn try_new<F>(compute: F) -> Self
    where
        F: Fn() -> Result<T> + 'static,
    {
        Self::with_equality(compute, |a, b| a == b)
    }
}

impl<T> Memo<T>
where
    T: Clone + 'static,
{
    /// Create a new memo that uses `equal` to decide whether a recomputed
    /// value is a change.
    pub fn with_equality<F, E>(compute: F, equal: E) -> Self
    where
        F: Fn() -> Result<T> + 'static,
        E: Fn(&T, &T) -> bool + 'static,
    {
        let id = SignalId::new();
        let inner = Rc::new_cyclic(|this: &Weak<MemoInner<T>>| {
            let owner: Weak<dyn Source> = this.clone();
            MemoInner {
                id,
                this: this.clone(),
                compute: Box::new(compute),
                equal: Box::new(equal),
                value: RefCell::new(None),
                version: Cell::new(Version::INITIAL),
                state: Cell::new(MemoState::Uncomputed),
                delivered: Cell::new(None),
                deps: DependencySet::new(id, owner),
                notifier: Notifier::new(),
            }
        });

        let destroyable: Rc<dyn Destroy> = inner.clone();
        Scope::register_current(destroyable);

        Self { inner }
    }

    /// Get the memo's unique ID.
    pub fn id(&self) -> SignalId {
        self.inner.id
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// This is the main entry point for reading a memo's value. Fails if the
    /// memo was destroyed, if it is read from its own computation (directly
    /// or through other memos), or if the computation fails.
    pub fn get(&self) -> Result<T> {
        self.inner.refresh()?;
        track(&self.inner);
        self.inner.cached()
    }

    /// Get the current value without registering a dependency.
    pub fn get_untracked(&self) -> Result<T> {
        self.inner.refresh()?;
        self.inner.cached()
    }

    /// The current version.
    pub fn version(&self) -> Version {
        self.inner.version.get()
    }

    /// Get the current lifecycle state.
    pub fn state(&self) -> MemoState {
        self.inner.state.get()
    }

    /// Check if the memo has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    /// Whether the memo is in push mode.
    pub fn is_watched(&self) -> bool {
        self.inner.deps.is_watched()
    }

    /// Number of signals read by the last successful computation.
    pub fn dependency_count(&self) -> usize {
        self.inner.deps.len()
    }

    /// Get the number of observers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.notifier.len()
    }

    /// Attach an observer, switching the memo to push mode.
    ///
    /// The observer is called with the current value right away, computing
    /// it if needed, then with every new value.
    pub fn subscribe<F>(&self, observer: F) -> Result<Subscription>
    where
        F: Fn(&T) + 'static,
    {
        self.inner.subscribe(Rc::new(observer))
    }

    /// Destroy the memo.
    ///
    /// Its dependencies are released and every later read fails with
    /// [`ReactiveError::Destroyed`]. This cannot be undone.
    pub fn destroy(&self) {
        self.inner.shutdown();
    }

    /// Whether the memo has been destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.inner.state.get() == MemoState::Destroyed
    }
}

impl<T> MemoInner<T>
where
    T: Clone + 'static,
{
    /// Make sure the cached value is current.
    fn refresh(&self) -> Result<()> {
        match self.state.get() {
            MemoState::Destroyed => Err(ReactiveError::Destroyed(self.id)),
            _ if self.deps.is_recording() => {
                debug!(signal = %self.id, "memo read while computing itself");
                Err(ReactiveError::CircularDependency(self.id))
            }
            MemoState::Uncomputed | MemoState::Dirty => self.recompute(),
            MemoState::Clean => {
                if self.deps.validate()? {
                    self.state.set(MemoState::Dirty);
                    self.recompute()
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Run the computation and commit its result.
    ///
    /// The previous value and version stay untouched when the computation
    /// fails.
    fn recompute(&self) -> Result<()> {
        let next = match self.deps.record(|| (self.compute)()) {
            Ok(next) => next,
            Err(err) => {
                if self.state.get() == MemoState::Clean {
                    self.state.set(MemoState::Dirty);
                }
                return Err(err);
            }
        };

        if self.state.get() == MemoState::Destroyed {
            // Destroyed by its own computation.
            self.deps.teardown();
            return Ok(());
        }
        self.state.set(MemoState::Clean);

        let changed = match self.value.borrow().as_ref() {
            Some(previous) => !(self.equal)(previous, &next),
            None => true,
        };
        if !changed {
            trace!(signal = %self.id, "memo recomputed to an equal value");
            return Ok(());
        }

        *self.value.borrow_mut() = Some(next);
        let version = self.version.get().next();
        self.version.set(version);
        trace!(signal = %self.id, %version, "memo changed");

        self.request_notify();
        Ok(())
    }

    fn cached(&self) -> Result<T> {
        // Only empty after a teardown that happened during the read.
        self.value
            .borrow()
            .clone()
            .ok_or(ReactiveError::Destroyed(self.id))
    }

    fn request_notify(&self) {
        if self.notifier.is_empty() {
            return;
        }
        let this: Weak<dyn Deliver> = self.this.clone();
        Runtime::notify(self.id, this);
    }

    fn subscribe(&self, observer: Observer<T>) -> Result<Subscription> {
        if self.deps.is_watched() {
            self.refresh()?;
        } else {
            self.deps.watch()?;
        }
        let current = self.cached()?;

        let id = self.notifier.add(Rc::clone(&observer));
        observer(&current);

        let this = self.this.clone();
        Ok(Subscription::new(move || {
            if let Some(inner) = this.upgrade() {
                inner.release(id);
            }
        }))
    }

    /// The last observer leaving switches the memo back to pull mode.
    fn release(&self, id: ObserverId) {
        if self.notifier.remove(id) && self.notifier.is_empty() {
            self.deps.unwatch();
        }
    }

    fn shutdown(&self) {
        if self.state.replace(MemoState::Destroyed) == MemoState::Destroyed {
            return;
        }
        self.deps.teardown();
        self.notifier.clear();
        let value = self.value.borrow_mut().take();
        drop(value);
        debug!(signal = %self.id, "memo destroyed");
    }
}

impl<T> Deliver for MemoInner<T>
where
    T: Clone + 'static,
{
    /// A memo read inside a batch queues itself and may be pushed again by
    /// its inputs at flush time. Each version is delivered once.
    fn deliver(&self) {
        let version = self.version.get();
        if self.delivered.get() == Some(version) {
            return;
        }
        let current = self.value.borrow().clone();
        if let Some(current) = current {
            self.delivered.set(Some(version));
            self.notifier.notify(&current);
        }
    }
}

impl<T> Destroy for MemoInner<T>
where
    T: Clone + 'static,
{
    fn destroy(&self) {
        self.shutdown();
    }
}

impl<T> Source for MemoInner<T>
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
        self.state.get() == MemoState::Clean && self.deps.is_valid()
    }

    fn validate(&self) -> Result<()> {
        self.refresh()
    }

    fn is_watched(&self) -> bool {
        self.deps.is_watched()
    }

    fn watch(&self, on_change: Rc<dyn Fn()>) -> Result<Subscription> {
        self.subscribe(Rc::new(move |_: &T| on_change()))
    }
}

impl<T> Source for Memo<T>
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
        self.inner.is_valid()
    }

    fn validate(&self) -> Result<()> {
        self.inner.refresh()
    }

    fn is_watched(&self) -> bool {
        self.inner.deps.is_watched()
    }

    fn watch(&self, on_change: Rc<dyn Fn()>) -> Result<Subscription> {
        self.inner.watch(on_change)
    }
}

impl<T> Readable<T> for Memo<T>
where
    T: Clone + 'static,
{
    fn try_get(&self) -> Result<T> {
        self.get()
    }

    fn observe(&self, observer: Observer<T>) -> Result<Subscription> {
        self.inner.subscribe(observer)
    }
}

impl<T: 'static> Clone for Memo<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Memo<T>
where
    T: Clone + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memo")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("value", &*self.inner.value.borrow())
            .field("version", &self.version())
            .field("dependency_count", &self.dependency_count())
            .finish()
    }
}

impl<T: 'static> Drop for MemoInner<T> {
    fn drop(&mut self) {
        if self.deps.is_watched() {
            debug!(signal = %self.id, "watched memo dropped, releasing dependencies");
        }
        self.deps.teardown();
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Signal;

    fn counted<T: Clone + PartialEq + 'static>(
        compute: impl Fn() -> T + 'static,
    ) -> (Memo<T>, Rc<Cell<i32>>) {
        let call_count = Rc::new(Cell::new(0));
        let call_count_clone = call_count.clone();
        let memo = Memo::new(move || {
            call_count_clone.set(call_count_clone.get() + 1);
            compute()
        });
        (memo, call_count)
    }

    #[test]
    fn memo_computes_on_first_access() {
        let (memo, call_count) = counted(|| 42);

        // Not computed yet
        assert!(!memo.has_value());
        assert_eq!(memo.state(), MemoState::Uncomputed);
        assert_eq!(call_count.get(), 0);

        // First access triggers computation
        assert_eq!(memo.get().unwrap(), 42);
        assert_eq!(call_count.get(), 1);
        assert!(memo.has_value());
        assert_eq!(memo.state(), MemoState::Clean);
    }

    #[test]
    fn memo_caches_value_when_clean() {
        let (memo, call_count) = counted(|| 42);

        assert_eq!(memo.get().unwrap(), 42);
        assert_eq!(memo.get().unwrap(), 42);
        assert_eq!(memo.get().unwrap(), 42);
        assert_eq!(call_count.get(), 1);
    }

    #[test]
    fn memo_recomputes_when_dependency_changes() {
        let signal = Signal::new(1);
        let (memo, call_count) = {
            let signal = signal.clone();
            counted(move || signal.get() * 2)
        };

        assert_eq!(memo.get().unwrap(), 2);
        let version = memo.version();

        signal.set(1);
        assert_eq!(memo.get().unwrap(), 2);
        assert_eq!(call_count.get(), 1);
        assert_eq!(memo.version(), version);

        signal.set(5);
        assert_eq!(memo.get().unwrap(), 10);
        assert_eq!(call_count.get(), 2);
        assert_eq!(memo.version(), version.next());
    }

    #[test]
    fn equal_results_keep_the_version() {
        let signal = Signal::new(2);
        let parity = {
            let signal = signal.clone();
            Memo::new(move || signal.get() % 2)
        };

        assert_eq!(parity.get().unwrap(), 0);
        let version = parity.version();

        signal.set(4);
        assert_eq!(parity.get().unwrap(), 0);
        assert_eq!(parity.version(), version);
    }

    #[test]
    fn reading_itself_is_circular() {
        let slot: Rc<RefCell<Option<Memo<i32>>>> = Rc::new(RefCell::new(None));
        let slot_clone = slot.clone();
        let memo = Memo::try_new(move || {
            let this = slot_clone.borrow().clone();
            match this {
                Some(this) => this.get(),
                None => Ok(0),
            }
        });
        *slot.borrow_mut() = Some(memo.clone());

        let err = memo.get().unwrap_err();
        assert!(err.is_circular());
        assert_eq!(memo.state(), MemoState::Uncomputed);

        // Break the Rc cycle through the slot.
        slot.borrow_mut().take();
    }

    #[test]
    fn failed_computation_keeps_previous_value() {
        let signal = Signal::new(1);
        let memo = {
            let signal = signal.clone();
            Memo::try_new(move || match signal.get() {
                n if n < 0 => Err(ReactiveError::msg("negative")),
                n => Ok(n * 10),
            })
        };

        assert_eq!(memo.get().unwrap(), 10);
        let version = memo.version();

        signal.set(-1);
        assert!(matches!(memo.get(), Err(ReactiveError::Compute(_))));
        assert_eq!(memo.version(), version);
        assert_eq!(memo.state(), MemoState::Dirty);
        // The error is raised again until the input is fixed.
        assert!(memo.get().is_err());

        signal.set(3);
        assert_eq!(memo.get().unwrap(), 30);
        assert_eq!(memo.version(), version.next());
    }

    #[test]
    fn destroyed_memo_rejects_reads() {
        let signal = Signal::new(1);
        let (memo, call_count) = {
            let signal = signal.clone();
            counted(move || signal.get())
        };

        memo.get().unwrap();
        memo.destroy();

        assert!(memo.is_destroyed());
        assert!(matches!(memo.get(), Err(ReactiveError::Destroyed(id)) if id == memo.id()));

        signal.set(2);
        assert!(memo.get().is_err());
        assert_eq!(call_count.get(), 1);
    }

    #[test]
    fn subscribing_switches_to_push_mode() {
        let signal = Signal::new(1);
        let (memo, call_count) = {
            let signal = signal.clone();
            counted(move || signal.get() + 1)
        };

        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        let subscription = memo
            .subscribe(move |value| seen_clone.borrow_mut().push(*value))
            .unwrap();

        assert!(memo.is_watched());
        assert_eq!(*seen.borrow(), [2]);

        signal.set(2);
        assert_eq!(*seen.borrow(), [2, 3]);
        assert_eq!(call_count.get(), 2);

        drop(subscription);
        assert!(!memo.is_watched());
        assert_eq!(signal.subscriber_count(), 0);

        signal.set(3);
        assert_eq!(call_count.get(), 2);
        assert_eq!(memo.get().unwrap(), 4);
        assert_eq!(call_count.get(), 3);
    }

    #[test]
    fn memo_clone_shares_state() {
        let memo1 = Memo::new(|| 42);
        assert_eq!(memo1.get().unwrap(), 42);

        let memo2 = memo1.clone();

        assert_eq!(memo1.id(), memo2.id());
        assert!(memo2.has_value());
        assert_eq!(memo2.get().unwrap(), 42);

        memo1.destroy();
        assert!(memo2.is_destroyed());
    }
}
