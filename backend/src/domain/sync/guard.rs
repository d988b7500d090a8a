//! Re-entrancy flag for sync runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared "a run is in progress" flag.
#[derive(Debug, Clone, Default)]
pub(crate) struct RunFlag(Arc<AtomicBool>);

impl RunFlag {
    /// Claim the flag, or `None` when another run holds it.
    pub(crate) fn try_acquire(&self) -> Option<RunGuard> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard(Arc::clone(&self.0)))
    }

    pub(crate) fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Releases the flag when dropped, including during unwinding.
#[derive(Debug)]
pub(crate) struct RunGuard(Arc<AtomicBool>);

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn second_acquire_fails_until_release() {
        let flag = RunFlag::default();
        let guard = flag.try_acquire().expect("first acquire");
        assert!(flag.is_set());
        assert!(flag.clone().try_acquire().is_none());

        drop(guard);
        assert!(!flag.is_set());
        assert!(flag.try_acquire().is_some());
    }
}
