//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. The effect stays subscribed for its whole life, so it never falls back
//!    to lazy validation: when any dependency changes, it re-runs before the
//!    write that caused it returns (or when the enclosing `atomic` batch
//!    ends).
//!
//! 3. Each run records its dependencies afresh; signals no longer read stop
//!    triggering it.
//!
//! # Use Cases
//!
//! Effects are used to synchronize reactive state with the outside world:
//!
//! - Updating the DOM when state changes
//! - Logging state changes
//! - Making network requests
//! - Writing to files
//!
//! # Differences from Memo
//!
//! - Memos return a value; effects do not.
//! - Memos are lazy (compute on access); effects are eager (run when deps change).
//! - Memos cache results; effects just run their side effect.
//!
//! # Cleanup
//!
//! Effects can optionally return a [`Cleanup`]. It is called before the
//! effect re-runs and when the effect is destroyed. Signals read inside a
//! cleanup never become dependencies of the effect.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use super::context::untracked;
use super::error::{ReactiveError, Result};
use super::memo::Memo;
use super::scope::{Destroy, Scope};
use super::source::SignalId;
use super::subscriber::Subscription;

/// A callback run before an effect's next run or at its teardown.
pub struct Cleanup(Box<dyn FnOnce()>);

impl Cleanup {
    /// Wrap a cleanup callback.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        Self(Box::new(f))
    }

    fn run(self) {
        untracked(self.0);
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cleanup")
    }
}

/// What an effect function may return.
///
/// Implemented for `()`, [`Cleanup`], `Option<Cleanup>`, and `Result` of any
/// of these, so effects can use `?` on memo reads.
pub trait EffectOutput {
    /// Convert into the cleanup to store.
    fn into_cleanup(self) -> Result<Option<Cleanup>>;
}

impl EffectOutput for () {
    fn into_cleanup(self) -> Result<Option<Cleanup>> {
        Ok(None)
    }
}

impl EffectOutput for Cleanup {
    fn into_cleanup(self) -> Result<Option<Cleanup>> {
        Ok(Some(self))
    }
}

impl EffectOutput for Option<Cleanup> {
    fn into_cleanup(self) -> Result<Option<Cleanup>> {
        Ok(self)
    }
}

impl<O: EffectOutput> EffectOutput for Result<O> {
    fn into_cleanup(self) -> Result<Option<Cleanup>> {
        self?.into_cleanup()
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// Cloning an effect shares it. Dropping the last handle destroys it, unless
/// a [`Scope`] still holds it.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
///
/// let effect = Effect::new({
///     let count = count.clone();
///     move || println!("Count is: {}", count.get())
/// })?;
///
/// count.set(5);  // Prints: "Count is: 5"
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Rc<EffectInner>,
}

struct EffectInner {
    /// Counts completed runs. Watched for the effect's whole life.
    runs: Memo<u64>,
    /// Mirrors `runs` without refreshing it.
    completed: Rc<Cell<u64>>,
    cleanup: Rc<RefCell<Option<Cleanup>>>,
    subscription: RefCell<Option<Subscription>>,
    /// Shared with the run so a run that destroys its own effect can still
    /// release what it returns.
    destroyed: Rc<Cell<bool>>,
}

impl Effect {
    /// Create a new effect and run it once.
    ///
    /// Fails if the first run fails; nothing is left subscribed in that case.
    pub fn new<F, O>(run: F) -> Result<Self>
    where
        F: Fn() -> O + 'static,
        O: EffectOutput,
    {
        let cleanup: Rc<RefCell<Option<Cleanup>>> = Rc::new(RefCell::new(None));
        let completed = Rc::new(Cell::new(0u64));
        let destroyed = Rc::new(Cell::new(false));

        let runs = {
            let (cleanup, completed, destroyed) =
                (cleanup.clone(), completed.clone(), destroyed.clone());
            Memo::try_new(move || {
                run_cleanup(&cleanup);
                let next = run().into_cleanup()?;
                completed.set(completed.get() + 1);
                if destroyed.get() {
                    // Destroyed during this run: the final cleanup already ran.
                    if let Some(next) = next {
                        next.run();
                    }
                } else {
                    *cleanup.borrow_mut() = next;
                }
                Ok(completed.get())
            })
        };

        let subscription = runs.subscribe(|_| {})?;
        let inner = Rc::new(EffectInner {
            runs,
            completed,
            cleanup,
            subscription: RefCell::new(Some(subscription)),
            destroyed,
        });

        let destroyable: Rc<dyn Destroy> = inner.clone();
        Scope::register_current(destroyable);

        Ok(Self { inner })
    }

    /// Get the effect's unique ID.
    pub fn id(&self) -> SignalId {
        self.inner.runs.id()
    }

    /// Number of completed runs. Fails once the effect is destroyed.
    ///
    /// Never triggers a run, even inside an `atomic` batch with pending
    /// changes.
    pub fn run_count(&self) -> Result<u64> {
        if self.is_destroyed() {
            return Err(ReactiveError::Destroyed(self.id()));
        }
        Ok(self.inner.completed.get())
    }

    /// Number of signals read by the last run.
    pub fn dependency_count(&self) -> usize {
        self.inner.runs.dependency_count()
    }

    /// Destroy the effect.
    ///
    /// Runs the pending cleanup, unsubscribes from every dependency, and
    /// never runs again.
    pub fn destroy(&self) {
        self.inner.destroy();
    }

    /// Check if the effect has been destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.get()
    }
}

fn run_cleanup(slot: &RefCell<Option<Cleanup>>) {
    let cleanup = slot.borrow_mut().take();
    if let Some(cleanup) = cleanup {
        cleanup.run();
    }
}

impl Destroy for EffectInner {
    fn destroy(&self) {
        if self.destroyed.replace(true) {
            return;
        }
        run_cleanup(&self.cleanup);

        let subscription = self.subscription.borrow_mut().take();
        drop(subscription);

        self.runs.destroy();
        debug!(effect = %self.runs.id(), "effect destroyed");
    }
}

impl Drop for EffectInner {
    fn drop(&mut self) {
        Destroy::destroy(self);
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id())
            .field("run_count", &self.run_count().ok())
            .field("dependency_count", &self.dependency_count())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
