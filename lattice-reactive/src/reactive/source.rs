//! The Signal Capability
//!
//! [`Source`] is the untyped contract the dependency engine works against:
//! identity, version, liveness, forced revalidation and change notification.
//! [`Readable`] adds typed access on top of it.
//!
//! `Signal` and `Memo` implement both traits. Hand-written
//! sources can take part in dependency recording too: implement [`Source`]
//! and call [`track`](super::track) from the read path.

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::error::Result;
use super::subscriber::{Observer, Subscription};
use super::version::Version;

/// Unique identifier for a signal.
///
/// Dependency sets key their edges by this ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignalId(u64);

impl SignalId {
    /// Generate a new unique signal ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SignalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Anything a memo can depend on.
pub trait Source {
    /// Identity used to deduplicate edges.
    fn id(&self) -> SignalId;

    /// The current version. Equal versions imply an unchanged value.
    fn version(&self) -> Version;

    /// Whether the current value is usable without recomputation.
    fn is_valid(&self) -> bool;

    /// Bring the value up to date, recomputing if needed.
    fn validate(&self) -> Result<()>;

    /// Whether anything is subscribed to this source's changes.
    fn is_watched(&self) -> bool;

    /// Call `on_change` every time this source notifies.
    ///
    /// Like every subscription, the callback is invoked once right away.
    fn watch(&self, on_change: Rc<dyn Fn()>) -> Result<Subscription>;
}

/// Typed read access to a [`Source`].
pub trait Readable<T>: Source {
    /// Read the current value, registering the read with the active
    /// dependency set.
    fn try_get(&self) -> Result<T>;

    /// Attach an observer. The current value is delivered immediately.
    fn observe(&self, observer: Observer<T>) -> Result<Subscription>;
}
