use std::fmt;
use std::time::Duration;

use log::{debug, warn};
use serde::Deserialize;

use crate::core::PwmOutput;
use crate::error::HardwareError;

/// Standard hobby servo frame: 50 Hz.
pub const DEFAULT_PERIOD: Duration = Duration::from_millis(20);
pub const DEFAULT_MIN_ANGLE: f64 = 0.0;
pub const DEFAULT_MAX_ANGLE: f64 = 180.0;
pub const DEFAULT_MIN_PULSE: Duration = Duration::from_millis(1);
pub const DEFAULT_MAX_PULSE: Duration = Duration::from_millis(2);

#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServoRole {
    Elastics,
    Trigger,
}

impl fmt::Display for ServoRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServoRole::Elastics => write!(f, "elastics"),
            ServoRole::Trigger => write!(f, "trigger"),
        }
    }
}

/// An opened servo. The commanded angle never leaves `[min_angle, max_angle]`;
/// out-of-range requests are rejected before a pulse is written.
///
/// The PWM line is closed by `close()` or, failing that, on drop.
pub struct ServoHandle {
    role: ServoRole,
    port: String,
    pwm: Option<Box<dyn PwmOutput>>,
    period: Duration,
    min_angle: f64,
    max_angle: f64,
    min_pulse: Duration,
    max_pulse: Duration,
    enabled: bool,
    angle: f64,
}

impl ServoHandle {
    pub fn open(role: ServoRole, mut pwm: Box<dyn PwmOutput>) -> Result<Self, HardwareError> {
        pwm.set_period(DEFAULT_PERIOD)?;

        Ok(ServoHandle {
            role,
            port: pwm.name().to_string(),
            pwm: Some(pwm),
            period: DEFAULT_PERIOD,
            min_angle: DEFAULT_MIN_ANGLE,
            max_angle: DEFAULT_MAX_ANGLE,
            min_pulse: DEFAULT_MIN_PULSE,
            max_pulse: DEFAULT_MAX_PULSE,
            enabled: false,
            angle: DEFAULT_MIN_ANGLE,
        })
    }

    pub fn set_angle_range(&mut self, min_angle: f64, max_angle: f64) -> Result<(), HardwareError> {
        if !(min_angle.is_finite() && max_angle.is_finite() && min_angle < max_angle) {
            return Err(HardwareError::InvalidRange {
                min: min_angle,
                max: max_angle,
            });
        }

        self.min_angle = min_angle;
        self.max_angle = max_angle;
        self.angle = self.angle.clamp(min_angle, max_angle);

        Ok(())
    }

    pub fn set_pulse_duration_range(
        &mut self,
        min_pulse: Duration,
        max_pulse: Duration,
    ) -> Result<(), HardwareError> {
        if min_pulse >= max_pulse {
            return Err(HardwareError::InvalidRange {
                min: min_pulse.as_secs_f64() * 1000.0,
                max: max_pulse.as_secs_f64() * 1000.0,
            });
        }
        if max_pulse > self.period {
            return Err(HardwareError::PulseTooLong {
                pulse: max_pulse,
                period: self.period,
            });
        }

        self.min_pulse = min_pulse;
        self.max_pulse = max_pulse;

        Ok(())
    }

    /// Enabling writes the pulse for the current angle before turning the
    /// output on, so the servo never sees a stale duty cycle.
    pub fn set_enabled(&mut self, enabled: bool) -> Result<(), HardwareError> {
        let pulse = self.pulse_for(self.angle);
        let pwm = self.pwm_mut()?;

        if enabled {
            pwm.set_pulse_width(pulse)?;
        }
        pwm.set_enabled(enabled)?;
        self.enabled = enabled;

        Ok(())
    }

    pub fn set_angle(&mut self, angle: f64) -> Result<(), HardwareError> {
        self.check_angle(angle)?;

        if self.enabled {
            let pulse = self.pulse_for(angle);
            self.pwm_mut()?.set_pulse_width(pulse)?;
        } else if self.pwm.is_none() {
            return Err(HardwareError::Closed(self.port.clone()));
        }
        self.angle = angle;

        debug!("{} servo ({}) -> {}°", self.role, self.port, angle);
        Ok(())
    }

    pub fn move_to_max(&mut self) -> Result<(), HardwareError> {
        self.set_angle(self.max_angle)
    }

    pub fn move_to_min(&mut self) -> Result<(), HardwareError> {
        self.set_angle(self.min_angle)
    }

    /// Flips between the two ends of the range and returns the new angle.
    pub fn toggle(&mut self) -> Result<f64, HardwareError> {
        let target = if self.angle < self.max_angle {
            self.max_angle
        } else {
            self.min_angle
        };

        self.set_angle(target)?;
        Ok(target)
    }

    pub fn check_angle(&self, angle: f64) -> Result<(), HardwareError> {
        if angle.is_nan() || angle < self.min_angle || angle > self.max_angle {
            return Err(HardwareError::AngleOutOfRange {
                angle,
                min: self.min_angle,
                max: self.max_angle,
            });
        }
        Ok(())
    }

    /// Linear angle to pulse-width mapping over the configured ranges.
    pub fn pulse_for(&self, angle: f64) -> Duration {
        let fraction = ((angle - self.min_angle) / (self.max_angle - self.min_angle)).clamp(0.0, 1.0);
        let span = (self.max_pulse - self.min_pulse).as_nanos() as f64;

        self.min_pulse + Duration::from_nanos((span * fraction).round() as u64)
    }

    pub fn close(&mut self) -> Result<(), HardwareError> {
        let mut pwm = self
            .pwm
            .take()
            .ok_or_else(|| HardwareError::Closed(self.port.clone()))?;
        self.enabled = false;

        let disabled = pwm.set_enabled(false);
        pwm.close()?;
        disabled
    }

    pub fn is_open(&self) -> bool {
        self.pwm.is_some()
    }

    pub fn role(&self) -> ServoRole {
        self.role
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn angle(&self) -> f64 {
        self.angle
    }

    pub fn min_angle(&self) -> f64 {
        self.min_angle
    }

    pub fn max_angle(&self) -> f64 {
        self.max_angle
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn pwm_mut(&mut self) -> Result<&mut Box<dyn PwmOutput>, HardwareError> {
        match self.pwm.as_mut() {
            Some(pwm) => Ok(pwm),
            None => Err(HardwareError::Closed(self.port.clone())),
        }
    }
}

impl Drop for ServoHandle {
    fn drop(&mut self) {
        if self.pwm.is_some() {
            if let Err(e) = self.close() {
                warn!("{} servo ({}) failed to close on drop: {}", self.role, self.port, e);
            }
        }
    }
}

#[cfg(test)]
mod servo_tests {
    use super::*;
    use crate::simulation::{HardwareEvent, Journal, SimulatedPwm};

    fn open_servo(journal: &Journal) -> ServoHandle {
        let pwm = SimulatedPwm::new("PWM0", journal.clone());
        let mut servo = ServoHandle::open(ServoRole::Elastics, Box::new(pwm)).unwrap();
        servo.set_angle_range(0.0, 180.0).unwrap();
        servo
            .set_pulse_duration_range(Duration::from_micros(600), Duration::from_micros(2400))
            .unwrap();
        servo.set_enabled(true).unwrap();
        servo
    }

    #[test]
    fn toggle_twice_from_rest() {
        let journal = Journal::default();
        let mut servo = open_servo(&journal);

        let angles = vec![servo.toggle().unwrap(), servo.toggle().unwrap()];

        assert_eq!(angles, vec![180.0, 0.0], "toggle goes to max then back to min");
    }

    #[test]
    fn out_of_range_angle_never_reaches_pwm() {
        let journal = Journal::default();
        let mut servo = open_servo(&journal);
        let before = journal.events().len();

        for angle in [-0.5, 180.5, f64::NAN, 1000.0] {
            assert!(
                matches!(
                    servo.set_angle(angle),
                    Err(HardwareError::AngleOutOfRange { .. })
                ),
                "angle {} must be rejected",
                angle
            );
        }

        assert_eq!(journal.events().len(), before, "no pulse written");
        assert_eq!(servo.angle(), 0.0, "commanded angle unchanged");
    }

    #[test]
    fn pulse_is_linear_over_range() {
        let journal = Journal::default();
        let servo = open_servo(&journal);

        assert_eq!(servo.pulse_for(0.0), Duration::from_micros(600));
        assert_eq!(servo.pulse_for(180.0), Duration::from_micros(2400));
        assert_eq!(servo.pulse_for(90.0), Duration::from_micros(1500));
    }

    #[test]
    fn narrowing_range_clamps_current_angle() {
        let journal = Journal::default();
        let mut servo = open_servo(&journal);
        servo.set_angle(170.0).unwrap();

        servo.set_angle_range(0.0, 90.0).unwrap();

        assert_eq!(servo.angle(), 90.0);
        assert!(servo.set_angle(120.0).is_err(), "120 is outside the new range");
    }

    #[test]
    fn invalid_ranges_are_rejected() {
        let journal = Journal::default();
        let mut servo = open_servo(&journal);

        assert!(servo.set_angle_range(90.0, 90.0).is_err());
        assert!(servo.set_angle_range(10.0, 0.0).is_err());
        assert!(
            servo
                .set_pulse_duration_range(Duration::from_millis(2), Duration::from_millis(1))
                .is_err()
        );
        assert_eq!(
            servo.set_pulse_duration_range(Duration::from_millis(1), Duration::from_millis(25)),
            Err(HardwareError::PulseTooLong {
                pulse: Duration::from_millis(25),
                period: DEFAULT_PERIOD,
            })
        );
    }

    #[test]
    fn disabled_servo_remembers_angle_without_pulsing() {
        let journal = Journal::default();
        let pwm = SimulatedPwm::new("PWM1", journal.clone());
        let mut servo = ServoHandle::open(ServoRole::Trigger, Box::new(pwm)).unwrap();

        servo.set_angle(45.0).unwrap();
        assert!(
            !journal
                .events()
                .iter()
                .any(|e| matches!(e, HardwareEvent::Pulse { .. })),
            "nothing written while disabled"
        );

        servo.set_enabled(true).unwrap();
        assert_eq!(
            journal.pulses_on("PWM1"),
            vec![servo.pulse_for(45.0)],
            "enabling writes the remembered angle"
        );
    }

    #[test]
    fn close_releases_line_once() {
        let journal = Journal::default();
        let mut servo = open_servo(&journal);

        assert_eq!(servo.close(), Ok(()));
        assert!(!servo.is_open());
        assert_eq!(servo.close(), Err(HardwareError::Closed("PWM0".to_string())));
        assert!(servo.set_angle(10.0).is_err(), "closed servo rejects commands");
        assert_eq!(journal.closed_ports(), vec!["PWM0".to_string()]);
    }

    #[test]
    fn drop_closes_open_line() {
        let journal = Journal::default();
        {
            let _servo = open_servo(&journal);
        }

        assert_eq!(journal.closed_ports(), vec!["PWM0".to_string()]);
    }
}
