//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, memos, and effects,
//! plus the dependency tracking that connects them.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. Every real change bumps its
//! [`Version`]. When a signal is read within a tracking context (a memo or
//! effect computing), the read is recorded as a [`Dependency`] of that
//! computation.
//!
//! ## Memos
//!
//! A Memo is a derived value that caches its result. It re-evaluates only when
//! one of its dependencies changes. Memos are pulled: reading one validates its
//! dependencies depth-first and recomputes only what actually moved. A memo
//! with observers is also pushed: it recomputes as soon as an input changes.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its dependencies
//! change. Effects are used to synchronize reactive state with external systems,
//! such as updating the DOM or logging.
//!
//! ## Batches
//!
//! [`atomic`] groups writes so observers see only the final state, once.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking context to automatically
//! detect dependencies. When a signal is read, we check if there is an active
//! tracking context and, if so, register the dependency.
//!
//! This approach (sometimes called "automatic dependency tracking" or
//! "transparent reactivity") is used by SolidJS, Vue 3, and Leptos.

mod context;
mod dependency;
mod effect;
mod error;
mod memo;
mod runtime;
mod scope;
mod signal;
mod source;
mod subscriber;
mod version;

pub use context::{is_tracking, track, untracked};
pub use dependency::{Dependency, DependencySet};
pub use effect::{Cleanup, Effect, EffectOutput};
pub use error::{ReactiveError, Result};
pub use memo::{Memo, MemoState};
pub use runtime::{atomic, Runtime};
pub use scope::{Destroy, Scope};
pub use signal::{Equality, Signal};
pub use source::{Readable, SignalId, Source};
pub use subscriber::{Observer, ObserverId, Subscription};
pub use version::Version;
