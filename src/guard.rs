//! Non-blocking single-flight guard for the top-level pipeline entry points

use std::sync::atomic::{AtomicBool, Ordering};

/// Process-wide "at most one run at a time" flag.
///
/// Acquisition never waits: a second caller gets `None` and does nothing.
#[derive(Debug, Default)]
pub struct RunGuard {
    held: AtomicBool,
}

/// Held while a guarded run is in progress; releases the guard on drop.
#[derive(Debug)]
pub struct RunPermit<'a> {
    guard: &'a RunGuard,
}

impl RunGuard {
    pub const fn new() -> Self {
        Self { held: AtomicBool::new(false) }
    }

    pub fn try_acquire(&self) -> Option<RunPermit<'_>> {
        self.held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| RunPermit { guard: self })
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }

    /// Run `f` if no other run is active, otherwise return `None` immediately.
    pub fn run_exclusive<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let _permit = self.try_acquire()?;
        Some(f())
    }
}

impl Drop for RunPermit<'_> {
    fn drop(&mut self) {
        self.guard.held.store(false, Ordering::Release);
    }
}
