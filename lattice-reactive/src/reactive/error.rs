//! Reactive Errors
//!
//! Everything that can go wrong inside the engine surfaces synchronously at
//! the call site as a [`ReactiveError`]. Nothing is retried internally.

use std::error::Error;
use std::fmt;
use std::rc::Rc;

use super::source::SignalId;

/// Errors produced while reading, recording or wiring signals.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ReactiveError {
    /// A memo or effect was read after `destroy()`.
    #[error("signal {0} has been destroyed")]
    Destroyed(SignalId),

    /// A dependency set started recording while it was already recording.
    ///
    /// This is how cycles (`a` reads `b` reads `a`) are detected.
    #[error("circular dependency detected while evaluating signal {0}")]
    CircularDependency(SignalId),

    /// `Dependency::watch` was called on an edge that is already watched.
    #[error("dependency on signal {0} is already watched")]
    AlreadyWatched(SignalId),

    /// `Dependency::unwatch` was called on an edge that is not watched.
    #[error("dependency on signal {0} is not watched")]
    NotWatched(SignalId),

    /// An error raised by a user compute function, passed through unchanged.
    #[error("{0}")]
    Compute(Rc<dyn Error>),
}

impl ReactiveError {
    /// Wrap an arbitrary error produced inside a compute function.
    pub fn compute<E>(error: E) -> Self
    where
        E: Error + 'static,
    {
        Self::Compute(Rc::new(error))
    }

    /// Build a compute error from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::compute(Message(message.into()))
    }

    /// Whether this is a cycle-detection error.
    pub fn is_circular(&self) -> bool {
        matches!(self, Self::CircularDependency(_))
    }
}

#[derive(Debug)]
struct Message(String);

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Error for Message {}

/// Result alias used throughout the reactive module.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_signal() {
        let id = SignalId::new();
        let err = ReactiveError::Destroyed(id);
        assert_eq!(err.to_string(), format!("signal {id} has been destroyed"));
        assert!(ReactiveError::CircularDependency(id).is_circular());
        assert!(!err.is_circular());
    }

    #[test]
    fn compute_errors_pass_through() {
        let err = ReactiveError::msg("bad input");
        assert_eq!(err.to_string(), "bad input");

        let cloned = err.clone();
        assert!(matches!(cloned, ReactiveError::Compute(_)));
    }
}
