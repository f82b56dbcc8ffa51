use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

/// Per-height rate limiter for matured-block re-requests.
#[derive(Debug)]
pub struct RequestThrottle {
    interval: Duration,
    last: HashMap<u32, Instant>,
}

impl RequestThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: HashMap::new(),
        }
    }

    /// Whether a request for `height` may go out at `now`; records the
    /// request when it may.
    pub fn allow(&mut self, height: u32, now: Instant) -> bool {
        match self.last.get(&height) {
            Some(at) if now.duration_since(*at) < self.interval => false,
            _ => {
                self.last.insert(height, now);
                true
            }
        }
    }

    /// Drops bookkeeping for heights the store has moved past.
    pub fn forget_below(&mut self, height: u32) {
        self.last.retain(|h, _| *h >= height);
    }
}
