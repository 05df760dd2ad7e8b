//! Reactive Runtime
//!
//! The runtime coordinates the push phase of signal updates.
//!
//! # How It Works
//!
//! 1. When a signal's value changes, its version and value are updated
//!    synchronously.
//!
//! 2. The signal then asks the runtime to deliver the change to its
//!    observers.
//!
//! 3. Outside of [`atomic`], delivery happens immediately, on the caller's
//!    stack, before `set()` returns.
//!
//! 4. Inside [`atomic`], delivery is deferred. Each signal is queued at most
//!    once, in the order of its first change. When the outermost `atomic`
//!    returns, the queue is flushed and every queued signal delivers its
//!    latest value exactly once.
//!
//! Reads are never deferred: `get()` always revalidates, so code running
//! inside a batch sees every write made so far.
//!
//! # Thread Safety
//!
//! The engine is single-threaded. Batch state lives in thread-local storage,
//! so batches on different threads never interact.

use std::cell::RefCell;
use std::rc::Weak;

use indexmap::IndexMap;
use tracing::{trace, warn};

use super::source::SignalId;

/// A signal that can push its current value to its observers.
pub(crate) trait Deliver {
    fn deliver(&self);
}

#[derive(Default)]
struct Batch {
    depth: usize,
    pending: IndexMap<SignalId, Weak<dyn Deliver>>,
}

thread_local! {
    static BATCH: RefCell<Batch> = RefCell::new(Batch::default());
}

/// Entry points for the push phase.
pub struct Runtime;

impl Runtime {
    /// Whether an [`atomic`] batch is active on this thread.
    pub fn is_batching() -> bool {
        Self::batch_depth() > 0
    }

    /// Nesting depth of [`atomic`] calls on this thread.
    pub fn batch_depth() -> usize {
        BATCH.with(|batch| batch.borrow().depth)
    }

    /// Number of signals waiting for the current batch to end.
    pub fn pending_count() -> usize {
        BATCH.with(|batch| batch.borrow().pending.len())
    }

    /// Deliver a change of `signal` now, or queue it until the outermost
    /// batch ends.
    pub(crate) fn notify(signal: SignalId, target: Weak<dyn Deliver>) {
        let immediate = BATCH.with(|batch| {
            let mut batch = batch.borrow_mut();
            if batch.depth == 0 {
                return Some(target);
            }
            batch.pending.entry(signal).or_insert(target);
            None
        });

        if let Some(target) = immediate.and_then(|target| target.upgrade()) {
            target.deliver();
        }
    }

    fn enter() {
        BATCH.with(|batch| batch.borrow_mut().depth += 1);
    }

    /// Leave one batch level. Returns the queued signals when this was the
    /// outermost level.
    fn exit() -> Option<IndexMap<SignalId, Weak<dyn Deliver>>> {
        BATCH.with(|batch| {
            let mut batch = batch.borrow_mut();
            batch.depth = batch.depth.saturating_sub(1);
            (batch.depth == 0).then(|| std::mem::take(&mut batch.pending))
        })
    }

    fn flush(pending: IndexMap<SignalId, Weak<dyn Deliver>>) {
        if pending.is_empty() {
            return;
        }
        trace!(signals = pending.len(), "flushing batched notifications");
        for target in pending.into_values() {
            if let Some(target) = target.upgrade() {
                target.deliver();
            }
        }
    }
}

/// Decrements the batch depth even if the batched closure panics.
struct BatchGuard;

impl Drop for BatchGuard {
    fn drop(&mut self) {
        let Some(pending) = Runtime::exit() else {
            return;
        };
        if std::thread::panicking() {
            if !pending.is_empty() {
                warn!(signals = pending.len(), "dropping batched notifications after panic");
            }
            return;
        }
        Runtime::flush(pending);
    }
}

/// Run `f` with push notifications deferred until it returns.
///
/// Signal values still change immediately; only observers are held back.
/// Nested calls share the outermost batch, and only the outermost call
/// flushes. The batch is closed even when `f` panics or returns an error.
///
/// ```rust,ignore
/// let sum = Memo::new(move || a.get() + b.get());
/// let _sub = sum.subscribe(|v| println!("sum = {v}"))?;
///
/// atomic(|| {
///     a.set(1);
///     b.set(2);
/// });
/// // prints "sum = 3" once
/// ```
pub fn atomic<R>(f: impl FnOnce() -> R) -> R {
    Runtime::enter();
    let _guard = BatchGuard;
    f()
}
