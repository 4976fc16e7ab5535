use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Single-flight lock for address submissions
#[derive(Debug, Default)]
pub struct SubmissionGuard {
    locked: Arc<AtomicBool>,
}

/// Proof of holding the [`SubmissionGuard`]; the lock is released on drop
#[derive(Debug)]
pub struct SubmissionPermit {
    locked: Arc<AtomicBool>,
}

impl SubmissionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock, or `None` if a submission is already in flight
    pub fn try_acquire(&self) -> Option<SubmissionPermit> {
        self.locked
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SubmissionPermit {
                locked: self.locked.clone(),
            })
    }

    pub fn is_held(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }
}

impl Drop for SubmissionPermit {
    fn drop(&mut self) {
        self.locked.store(false, Ordering::Release);
    }
}
