//! Reactive Context
//!
//! The reactive context tracks which dependency set is currently recording.
//! This enables automatic dependency tracking: when a signal is read, it
//! reports itself to the recording set, which turns the read into an edge.
//!
//! # Implementation
//!
//! We use a thread-local stack. Entering a context pushes an entry and the
//! returned guard pops it, so the previous recorder is restored on every exit
//! path, including early `?` returns and panics. A `None` entry marks an
//! untracked region: reads inside it are not recorded by anyone.
//!
//! The engine is single-threaded; each thread has its own independent stack.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use super::dependency::DependencySet;
use super::source::{SignalId, Source};

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Option<Rc<DependencySet>>>> = const { RefCell::new(Vec::new()) };
}

/// Guard that pops the context when dropped.
pub(crate) struct ReactiveContext {
    recorder: Option<SignalId>,
}

impl ReactiveContext {
    /// Make `recorder` the active dependency set, or suspend tracking when
    /// `None`, until the guard is dropped.
    pub(crate) fn enter(recorder: Option<Rc<DependencySet>>) -> Self {
        let id = recorder.as_ref().map(|set| set.owner_id());
        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(recorder));
        Self { recorder: id }
    }

    /// The dependency set currently recording, if any.
    pub(crate) fn current() -> Option<Rc<DependencySet>> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().cloned().flatten())
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry.as_ref().map(|set| set.owner_id()),
                    self.recorder,
                    "ReactiveContext mismatch"
                );
            }
        });
    }
}

/// Whether reads right now are being recorded as dependencies.
pub fn is_tracking() -> bool {
    CONTEXT_STACK.with(|stack| matches!(stack.borrow().last(), Some(Some(_))))
}

/// Run `f` without recording any of its reads as dependencies.
///
/// ```rust,ignore
/// let total = Memo::new(move || a.get() + untracked(|| b.get()));
/// b.set(100); // `total` does not recompute
/// ```
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::enter(None);
    f()
}

/// Report a read of `source` to the recording dependency set, if any.
///
/// Built-in signals call this from `get()`. Hand-written [`Source`]
/// implementations call it from their own read path.
pub fn track<S>(source: &Rc<S>)
where
    S: Source + 'static,
{
    let Some(recorder) = ReactiveContext::current() else {
        return;
    };
    let target = Rc::downgrade(source);
    let target: Weak<dyn Source> = target;
    recorder.record_read(target, source.id(), source.version());
}
