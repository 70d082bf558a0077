//! Per-thread record of factory locks held while user code runs.

use std::cell::RefCell;

use crate::error::{FactoryError, FactoryResult};

/// Factory lock a thread may hold while calling back into user code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Held {
    /// The instance registry: constructors and `constructing` observers.
    Registry,
    /// The identity table: `Describe` views during key derivation.
    Identities,
}

// Locks held by this thread, innermost last
thread_local! {
    static HELD: RefCell<Vec<(u64, Held)>> = const { RefCell::new(Vec::new()) };
}

/// Marks a lock of `factory` as held on this thread until dropped.
pub(crate) struct ConstructionGuard {
    factory: u64,
    held: Held,
}

impl ConstructionGuard {
    pub(crate) fn enter(factory: u64, held: Held) -> Self {
        HELD.with(|stack| stack.borrow_mut().push((factory, held)));
        Self { factory, held }
    }
}

impl Drop for ConstructionGuard {
    fn drop(&mut self) {
        HELD.with(|stack| {
            let popped = stack.borrow_mut().pop();
            debug_assert_eq!(popped, Some((self.factory, self.held)));
        });
    }
}

/// Fails when the current thread already holds `held` for `factory`.
///
/// Taking that lock again would deadlock.
pub(crate) fn ensure_not_held(factory: u64, held: Held, name: &'static str) -> FactoryResult<()> {
    let reentrant = HELD.with(|stack| stack.borrow().contains(&(factory, held)));
    if reentrant {
        return Err(FactoryError::Reentrant(name));
    }
    Ok(())
}
