//! Cancellation token flowing top-down from the orchestrator.
//!
//! Agent loops check it at their suspension boundaries; a timeout takes
//! the same path with `reason = "timeout"`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// A cancellation token checked by the runtime loops.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    reason: Mutex<Option<String>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation with a reason (`"user"`, `"timeout"`, …).
    pub fn cancel(&self, reason: impl Into<String>) {
        let mut stored = self.inner.reason.lock();
        if stored.is_none() {
            *stored = Some(reason.into());
        }
        self.inner.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// The first recorded cancellation reason.
    pub fn reason(&self) -> Option<String> {
        self.inner.reason.lock().clone()
    }
}
