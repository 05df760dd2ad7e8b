//! Lattice Reactive
//!
//! This crate provides the incremental computation runtime behind Lattice.
//! It implements:
//!
//! - Mutable signals with version counters
//! - Cached derived values (memos) that recompute only when inputs change
//! - Effects that re-run eagerly when their inputs change
//! - Atomic batches that coalesce notifications
//!
//! Reads are pulled: a memo validates its dependencies depth-first before
//! answering, so it never returns a stale or half-updated value. Writes are
//! pushed to whatever is observed, which is what keeps effects running.
//!
//! # Architecture
//!
//! Everything lives under [`reactive`]; the most used types are re-exported
//! at the crate root.
//!
//! The runtime is single-threaded. Values are shared with `Rc`, and the
//! tracking context and batch queue are thread-local.
//!
//! # Example
//!
//! ```rust,ignore
//! use lattice_reactive::{atomic, Effect, Memo, Signal};
//!
//! // Create a signal
//! let count = Signal::new(0);
//!
//! // Create a derived value
//! let doubled = {
//!     let count = count.clone();
//!     Memo::new(move || count.get() * 2)
//! };
//!
//! // Create an effect
//! let _effect = Effect::new({
//!     let count = count.clone();
//!     let doubled = doubled.clone();
//!     move || -> lattice_reactive::Result<()> {
//!         println!("Count: {}, Doubled: {}", count.get(), doubled.get()?);
//!         Ok(())
//!     }
//! })?;
//!
//! // Update the signal
//! count.set(5);
//! // Effect automatically runs, prints: "Count: 5, Doubled: 10"
//!
//! // Several writes, one run
//! atomic(|| {
//!     count.set(6);
//!     count.set(7);
//! });
//! ```

pub mod reactive;

pub use reactive::{
    atomic, untracked, Cleanup, Effect, Memo, ReactiveError, Readable, Result, Scope, Signal,
    Source, Subscription, Version,
};
