use std::time::{Duration, Instant};

/// The one advancement timer of the engine.  It is just a deadline owned by
/// the `Playing` state: leaving that state drops it, so it cannot fire late.
#[derive(Debug)]
pub struct AdvanceTimer {
    interval: Duration,
    deadline: Instant,
}

impl AdvanceTimer {
    pub fn start(interval: Duration) -> Self {
        Self {
            interval,
            deadline: Instant::now() + interval,
        }
    }

    pub fn restart(&mut self) {
        self.deadline = Instant::now() + self.interval;
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}
