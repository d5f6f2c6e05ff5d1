use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Abort signal raised when a long-running operation should give up.
/// Cheap to clone; every clone observes the same flag.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    raised: Arc<AtomicBool>,
    reason: Arc<Mutex<Option<String>>>,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal. The first reason given sticks.
    pub fn raise(&self, reason: impl Into<String>) {
        if let Ok(mut slot) = self.reason.lock() {
            slot.get_or_insert_with(|| reason.into());
        }
        self.raised.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    pub fn reason(&self) -> Option<String> {
        self.reason.lock().ok().and_then(|slot| slot.clone())
    }
}
