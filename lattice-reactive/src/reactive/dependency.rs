//! Dependency Tracking
//!
//! A [`Dependency`] is one edge from a memo to a source it read, remembering
//! the source's version at the time of the read. A [`DependencySet`] is the
//! collection of edges owned by one memo.
//!
//! # Recording
//!
//! `DependencySet::record` runs a closure with the set installed as the
//! active recorder. Every signal read inside the closure reports itself back
//! through [`track`](super::track):
//!
//! - reads of known sources refresh the existing edge in place,
//! - reads of new sources create edges,
//! - edges not read during the pass are dropped when the pass completes.
//!
//! A set that is asked to record while it is already recording fails with
//! [`ReactiveError::CircularDependency`]. This is the engine's cycle
//! detection.
//!
//! # Watched and Unwatched
//!
//! An unwatched set is validated lazily: the owner asks `validate()` on read,
//! which walks the edges depth-first and reports whether any source moved.
//!
//! A watched set additionally subscribes to every edge's source. When a
//! source notifies, the owner is revalidated right away and, if its value
//! changed, notifies its own observers. The subscription callbacks only hold
//! weak references back to the set, so upstream sources never keep
//! downstream memos alive.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use super::context::{untracked, ReactiveContext};
use super::error::{ReactiveError, Result};
use super::source::{SignalId, Source};
use super::subscriber::Subscription;
use super::version::Version;

/// One tracked edge to a source that was read.
pub struct Dependency {
    /// Non-owning reference to the source.
    target: Weak<dyn Source>,
    target_id: SignalId,
    last_seen: Cell<Version>,
    /// Record pass that last touched this edge.
    pass: Cell<u64>,
    subscription: RefCell<Option<Subscription>>,
}

impl Dependency {
    pub(crate) fn new(target: Weak<dyn Source>, target_id: SignalId, version: Version) -> Self {
        Self {
            target,
            target_id,
            last_seen: Cell::new(version),
            pass: Cell::new(0),
            subscription: RefCell::new(None),
        }
    }

    /// ID of the source this edge points at.
    pub fn target_id(&self) -> SignalId {
        self.target_id
    }

    /// The source's version when it was last read or validated.
    pub fn last_seen(&self) -> Version {
        self.last_seen.get()
    }

    /// Whether this edge currently holds a push subscription.
    pub fn is_watched(&self) -> bool {
        self.subscription.borrow().is_some()
    }

    /// Subscribe to the source, calling `on_change` whenever it notifies.
    ///
    /// A source that has already been dropped can never notify, so watching
    /// it leaves the edge unwatched.
    pub fn watch(&self, on_change: Rc<dyn Fn()>) -> Result<()> {
        if self.is_watched() {
            return Err(ReactiveError::AlreadyWatched(self.target_id));
        }
        let Some(target) = self.target.upgrade() else {
            return Ok(());
        };

        let subscription = target.watch(on_change)?;
        let previous = self.subscription.borrow_mut().replace(subscription);
        if previous.is_some() {
            warn!(target = %self.target_id, "dependency was watched while subscribing");
        }
        Ok(())
    }

    /// Release the push subscription.
    pub fn unwatch(&self) -> Result<()> {
        let subscription = self.subscription.borrow_mut().take();
        match subscription {
            Some(subscription) => {
                subscription.unsubscribe();
                Ok(())
            }
            None => Err(ReactiveError::NotWatched(self.target_id)),
        }
    }

    /// Bring the source up to date and report whether it changed since the
    /// edge last saw it.
    ///
    /// A dropped source counts as changed: the owner has to recompute to
    /// find out what it reads now.
    pub fn validate(&self) -> Result<bool> {
        let Some(target) = self.target.upgrade() else {
            return Ok(true);
        };

        target.validate()?;
        let version = target.version();
        if version == self.last_seen.get() {
            return Ok(false);
        }
        self.last_seen.set(version);
        Ok(true)
    }

    /// Cheap check: the source has not moved and needs no recomputation.
    pub fn is_valid(&self) -> bool {
        self.target
            .upgrade()
            .is_some_and(|target| target.version() == self.last_seen.get() && target.is_valid())
    }

    fn touch(&self, version: Version, pass: u64) {
        self.last_seen.set(version);
        self.pass.set(pass);
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependency")
            .field("target", &self.target_id)
            .field("last_seen", &self.last_seen.get())
            .field("watched", &self.is_watched())
            .finish()
    }
}

type Snapshot = SmallVec<[Rc<Dependency>; 8]>;

/// The edges owned by one memo.
pub struct DependencySet {
    owner_id: SignalId,
    owner: Weak<dyn Source>,
    edges: RefCell<IndexMap<SignalId, Rc<Dependency>>>,
    recording: Cell<bool>,
    watched: Cell<bool>,
    /// Depth of in-flight validations and subscription changes. Push
    /// callbacks arriving meanwhile are ignored; the work in progress
    /// already observes the new versions.
    busy: Cell<usize>,
    pass: Cell<u64>,
    this: Weak<DependencySet>,
}

impl DependencySet {
    /// Create an empty set for the memo `owner`.
    pub fn new(owner_id: SignalId, owner: Weak<dyn Source>) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            owner_id,
            owner,
            edges: RefCell::new(IndexMap::new()),
            recording: Cell::new(false),
            watched: Cell::new(false),
            busy: Cell::new(0),
            pass: Cell::new(0),
            this: this.clone(),
        })
    }

    /// ID of the memo owning this set.
    pub fn owner_id(&self) -> SignalId {
        self.owner_id
    }

    /// Number of edges.
    pub fn len(&self) -> usize {
        self.edges.borrow().len()
    }

    /// Whether the set has no edges.
    pub fn is_empty(&self) -> bool {
        self.edges.borrow().is_empty()
    }

    /// IDs of the sources read during the last successful pass, in first-read
    /// order.
    pub fn sources(&self) -> Vec<SignalId> {
        self.edges.borrow().keys().copied().collect()
    }

    /// Whether a `record` pass is on the stack.
    pub fn is_recording(&self) -> bool {
        self.recording.get()
    }

    /// Whether edges are push-subscribed.
    pub fn is_watched(&self) -> bool {
        self.watched.get()
    }

    /// Run `f` with this set recording every signal it reads.
    pub fn record<R>(&self, f: impl FnOnce() -> Result<R>) -> Result<R> {
        if self.recording.get() {
            debug!(signal = %self.owner_id, "circular dependency detected");
            return Err(ReactiveError::CircularDependency(self.owner_id));
        }

        let pass = self.pass.get().wrapping_add(1);
        self.pass.set(pass);

        let result = {
            let _recording = FlagGuard::raise(&self.recording);
            let _ctx = ReactiveContext::enter(self.this.upgrade());
            f()
        };
        let value = result?;

        self.prune(pass)?;
        Ok(value)
    }

    /// Called through [`track`](super::track) for every read while recording.
    pub(crate) fn record_read(&self, target: Weak<dyn Source>, id: SignalId, version: Version) {
        let pass = self.pass.get();
        let mut edges = self.edges.borrow_mut();
        match edges.get(&id) {
            Some(edge) => edge.touch(version, pass),
            None => {
                let edge = Dependency::new(target, id, version);
                edge.touch(version, pass);
                edges.insert(id, Rc::new(edge));
            }
        }
    }

    /// Drop edges not read during `pass`, and subscribe new edges when
    /// watched.
    fn prune(&self, pass: u64) -> Result<()> {
        let mut removed = Snapshot::new();
        self.edges.borrow_mut().retain(|_, edge| {
            let keep = edge.pass.get() == pass;
            if !keep {
                removed.push(Rc::clone(edge));
            }
            keep
        });

        if !removed.is_empty() {
            trace!(signal = %self.owner_id, removed = removed.len(), "pruned stale dependencies");
        }
        for edge in removed {
            if edge.is_watched() {
                edge.unwatch()?;
            }
        }

        if self.watched.get() {
            let _busy = self.enter_busy();
            self.watch_edges()?;
        }
        Ok(())
    }

    /// Switch to push mode.
    ///
    /// The owner is read once first so that its edges exist, then every edge
    /// is subscribed.
    pub fn watch(&self) -> Result<()> {
        if self.watched.get() {
            return Ok(());
        }
        if let Some(owner) = self.owner.upgrade() {
            owner.validate()?;
        }

        self.watched.set(true);
        let _busy = self.enter_busy();
        if let Err(err) = self.watch_edges() {
            self.watched.set(false);
            self.unwatch_edges();
            return Err(err);
        }
        trace!(signal = %self.owner_id, edges = self.len(), "dependencies watched");
        Ok(())
    }

    /// Switch back to pull mode.
    pub fn unwatch(&self) {
        if !self.watched.replace(false) {
            return;
        }
        self.unwatch_edges();
        trace!(signal = %self.owner_id, "dependencies unwatched");
    }

    /// Unsubscribe and drop every edge. Used when the owner is destroyed.
    pub fn teardown(&self) {
        self.watched.set(false);
        self.unwatch_edges();
        let edges = std::mem::take(&mut *self.edges.borrow_mut());
        drop(edges);
    }

    /// Whether every edge is still valid.
    pub fn is_valid(&self) -> bool {
        self.snapshot().iter().all(|edge| edge.is_valid())
    }

    /// Validate edges in order and report whether any source changed.
    ///
    /// Stops at the first change: the owner recomputes anyway, and sources it
    /// no longer reads must not be evaluated.
    pub fn validate(&self) -> Result<bool> {
        let _busy = self.enter_busy();
        for edge in self.snapshot() {
            if edge.validate()? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn watch_edges(&self) -> Result<()> {
        for edge in self.snapshot() {
            if !edge.is_watched() {
                edge.watch(self.change_callback())?;
            }
        }
        Ok(())
    }

    fn unwatch_edges(&self) {
        for edge in self.snapshot() {
            if edge.is_watched() {
                if let Err(err) = edge.unwatch() {
                    warn!(signal = %self.owner_id, error = %err, "failed to unwatch dependency");
                }
            }
        }
    }

    fn change_callback(&self) -> Rc<dyn Fn()> {
        let set = self.this.clone();
        Rc::new(move || {
            if let Some(set) = set.upgrade() {
                set.propagate();
            }
        })
    }

    /// A watched source changed: revalidate the owner, which recomputes and
    /// notifies downstream if needed.
    fn propagate(&self) {
        if self.recording.get() || self.busy.get() > 0 || !self.watched.get() {
            return;
        }
        let Some(owner) = self.owner.upgrade() else {
            return;
        };
        if let Err(err) = untracked(|| owner.validate()) {
            warn!(signal = %self.owner_id, error = %err, "recomputation after change failed");
        }
    }

    fn snapshot(&self) -> Snapshot {
        self.edges.borrow().values().cloned().collect()
    }

    fn enter_busy(&self) -> BusyGuard<'_> {
        self.busy.set(self.busy.get() + 1);
        BusyGuard(&self.busy)
    }
}

impl fmt::Debug for DependencySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencySet")
            .field("owner", &self.owner_id)
            .field("edges", &self.len())
            .field("recording", &self.recording.get())
            .field("watched", &self.watched.get())
            .finish()
    }
}

/// Sets a flag for the guard's lifetime.
struct FlagGuard<'a>(&'a Cell<bool>);

impl<'a> FlagGuard<'a> {
    fn raise(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

struct BusyGuard<'a>(&'a Cell<usize>);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

#[cfg(test)]
pub(crate) fn no_owner() -> Weak<dyn Source> {
    struct Detached;

    impl Source for Detached {
        fn id(&self) -> SignalId {
            SignalId::new()
        }
        fn version(&self) -> Version {
            Version::INITIAL
        }
        fn is_valid(&self) -> bool {
            true
        }
        fn validate(&self) -> Result<()> {
            Ok(())
        }
        fn is_watched(&self) -> bool {
            false
        }
        fn watch(&self, _on_change: Rc<dyn Fn()>) -> Result<Subscription> {
            Ok(Subscription::new(|| {}))
        }
    }

    Weak::<Detached>::new()
}
