//! Counted no-fault scope.
//!
//! While at least one [`NoFaultScope`] is alive on a thread, untrusted reads
//! performed on that thread must report failure as a value rather than
//! trapping. The scope nests: each `enter` increments a per-thread depth and
//! the matching drop decrements it, so every exit path (early return, `?`,
//! unwinding) is balanced without the caller doing anything.
//!
//! The guard is `!Send` and `!Sync`. It cannot migrate to another thread and
//! decrement the wrong counter.

use std::cell::Cell;
use std::marker::PhantomData;

thread_local! {
    static DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// RAII activation of the no-fault scope on the current thread.
#[must_use = "the scope is released as soon as the guard is dropped"]
pub struct NoFaultScope {
    // Pins the guard to the thread whose counter it incremented.
    _not_send: PhantomData<*const ()>,
}

impl NoFaultScope {
    /// Enter the scope, returning a guard that leaves it on drop.
    #[inline]
    pub fn enter() -> Self {
        DEPTH.with(|depth| depth.set(depth.get().saturating_add(1)));
        Self {
            _not_send: PhantomData,
        }
    }

    /// Depth on this thread while the guard is held.
    #[must_use]
    pub fn depth(&self) -> u32 {
        nofault_depth()
    }
}

impl Drop for NoFaultScope {
    #[inline]
    fn drop(&mut self) {
        DEPTH.with(|depth| {
            let current = depth.get();
            debug_assert!(current > 0, "no-fault scope depth underflow");
            depth.set(current.saturating_sub(1));
        });
    }
}

/// Current no-fault nesting depth of the calling thread.
#[must_use]
pub fn nofault_depth() -> u32 {
    DEPTH.with(Cell::get)
}

/// True when the calling thread is inside at least one no-fault scope.
#[must_use]
pub fn in_nofault_scope() -> bool {
    nofault_depth() > 0
}
