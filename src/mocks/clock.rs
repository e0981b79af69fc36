use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

/// Manually advanced clock shared between a test and the scheduler.
#[derive(Clone, Default)]
pub struct Clock {
    now: Arc<AtomicU64>,
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the clock by `elapsed`.
    pub fn advance(&self, elapsed: Duration) {
        self.now
            .fetch_add(elapsed.as_micros() as u64, Ordering::SeqCst);
    }
}

impl crate::Clock for Clock {
    fn now_micros(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
