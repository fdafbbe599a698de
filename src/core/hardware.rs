use std::thread;
use std::time::{Duration, Instant};

use crate::core::Polarity;
use crate::error::HardwareError;

/// A PWM output line as exposed by the peripheral layer.
pub trait PwmOutput {
    fn name(&self) -> &str;
    fn set_period(&mut self, period: Duration) -> Result<(), HardwareError>;
    fn set_pulse_width(&mut self, pulse: Duration) -> Result<(), HardwareError>;
    fn set_enabled(&mut self, enabled: bool) -> Result<(), HardwareError>;
    fn close(&mut self) -> Result<(), HardwareError>;
}

/// A GPIO input line. `is_high` reports the raw electrical level.
pub trait DigitalInput {
    fn name(&self) -> &str;
    fn is_high(&mut self) -> Result<bool, HardwareError>;
    fn close(&mut self) -> Result<(), HardwareError>;
}

/// Enumerates and opens ports on the host board.
pub trait PeripheralManager {
    fn pwm_list(&self) -> Vec<String>;
    fn gpio_list(&self) -> Vec<String>;
    fn open_pwm(&mut self, name: &str) -> Result<Box<dyn PwmOutput>, HardwareError>;
    /// Opens `name` as an input biased to the released level of `polarity`.
    fn open_input(
        &mut self,
        name: &str,
        polarity: Polarity,
    ) -> Result<Box<dyn DigitalInput>, HardwareError>;
}

/// Monotonic time source. `now` is measured from an arbitrary fixed origin.
pub trait Clock {
    fn now(&self) -> Duration;
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `Instant`; `sleep` blocks the calling thread.
pub struct SystemClock {
    origin: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        SystemClock::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}
