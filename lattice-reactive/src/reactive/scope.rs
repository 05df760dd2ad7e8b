//! Teardown Scopes
//!
//! A [`Scope`] collects memos and effects created while it is ambient and
//! destroys them together. Use it to tie a group of reactive values to the
//! lifetime of some owner (a view, a request, a test).
//!
//! Scopes nest through a thread-local stack. Only the innermost ambient scope
//! receives registrations.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use tracing::debug;

/// Something a scope can tear down.
pub trait Destroy {
    /// Release everything held. Must be idempotent.
    fn destroy(&self);
}

thread_local! {
    static SCOPE_STACK: RefCell<Vec<Scope>> = const { RefCell::new(Vec::new()) };
}

/// A group of reactive values destroyed together.
#[derive(Clone, Default)]
pub struct Scope {
    inner: Rc<ScopeInner>,
}

#[derive(Default)]
struct ScopeInner {
    owned: RefCell<Vec<Rc<dyn Destroy>>>,
    destroyed: Cell<bool>,
}

impl Scope {
    /// Create an empty scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with this scope ambient. Memos and effects created inside
    /// register themselves with it.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> R {
        SCOPE_STACK.with(|stack| stack.borrow_mut().push(self.clone()));
        let _guard = PopGuard;
        f()
    }

    /// The innermost ambient scope, if any.
    pub fn current() -> Option<Scope> {
        SCOPE_STACK.with(|stack| stack.borrow().last().cloned())
    }

    /// Register `item` with the ambient scope, if one is active.
    ///
    /// Returns whether a scope took it.
    pub fn register_current(item: Rc<dyn Destroy>) -> bool {
        match Self::current() {
            Some(scope) => {
                scope.register(item);
                true
            }
            None => false,
        }
    }

    /// Take ownership of `item`. A scope that is already destroyed destroys
    /// it right away.
    pub fn register(&self, item: Rc<dyn Destroy>) {
        if self.inner.destroyed.get() {
            item.destroy();
            return;
        }
        self.inner.owned.borrow_mut().push(item);
    }

    /// Number of registered items.
    pub fn len(&self) -> usize {
        self.inner.owned.borrow().len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.inner.owned.borrow().is_empty()
    }

    /// Whether `destroy` has been called.
    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.get()
    }

    /// Destroy every registered item, newest first.
    pub fn destroy(&self) {
        if self.inner.destroyed.replace(true) {
            return;
        }
        let owned = std::mem::take(&mut *self.inner.owned.borrow_mut());
        debug!(items = owned.len(), "destroying scope");
        for item in owned.into_iter().rev() {
            item.destroy();
        }
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("items", &self.len())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

struct PopGuard;

impl Drop for PopGuard {
    fn drop(&mut self) {
        SCOPE_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Probe {
        name: &'static str,
        log: Rc<RefCell<Vec<&'static str>>>,
    }

    impl Destroy for Probe {
        fn destroy(&self) {
            self.log.borrow_mut().push(self.name);
        }
    }

    fn probe(name: &'static str, log: &Rc<RefCell<Vec<&'static str>>>) -> Rc<dyn Destroy> {
        Rc::new(Probe {
            name,
            log: log.clone(),
        })
    }

    #[test]
    fn registration_needs_an_ambient_scope() {
        let log = Rc::new(RefCell::new(Vec::new()));
        assert!(!Scope::register_current(probe("orphan", &log)));

        let scope = Scope::new();
        scope.run(|| {
            assert!(Scope::register_current(probe("a", &log)));
        });
        assert_eq!(scope.len(), 1);
        assert!(Scope::current().is_none());
    }

    #[test]
    fn destroy_runs_newest_first_once() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let scope = Scope::new();
        scope.register(probe("first", &log));
        scope.register(probe("second", &log));

        scope.destroy();
        scope.destroy();

        assert_eq!(*log.borrow(), ["second", "first"]);
        assert!(scope.is_empty());
    }

    #[test]
    fn inner_scope_takes_registrations() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let outer = Scope::new();
        let inner = Scope::new();

        outer.run(|| {
            inner.run(|| Scope::register_current(probe("inner", &log)));
            Scope::register_current(probe("outer", &log));
        });

        assert_eq!(inner.len(), 1);
        assert_eq!(outer.len(), 1);
    }

    #[test]
    fn late_registration_is_destroyed_immediately() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let scope = Scope::new();
        scope.destroy();

        scope.register(probe("late", &log));
        assert_eq!(*log.borrow(), ["late"]);
    }
}
