use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use crate::core::Clock;

/// Virtual clock: `sleep` advances time instantly and keeps a running total
/// of how long callers asked to sleep.
#[derive(Clone, Default)]
pub struct SimulatedClock {
    now: Rc<Cell<Duration>>,
    slept: Rc<Cell<Duration>>,
}

impl SimulatedClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, duration: Duration) {
        self.now.set(self.now.get() + duration);
    }

    pub fn total_slept(&self) -> Duration {
        self.slept.get()
    }

    pub fn reset_slept(&self) {
        self.slept.set(Duration::ZERO);
    }
}

impl Clock for SimulatedClock {
    fn now(&self) -> Duration {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.slept.set(self.slept.get() + duration);
        self.advance(duration);
    }
}
