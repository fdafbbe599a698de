//! Raspberry Pi backend on top of `rppal`.
//!
//! Ports follow the board table: `PWM0`/`PWM1` are the two hardware PWM
//! channels (BCM 18 and 19 with the default overlay) and `BCMn` is GPIO n,
//! opened as an input with the internal pull-up, or the pull-down for
//! buttons wired pressed-when-high.

use std::time::Duration;

use rppal::gpio::{Gpio, InputPin};
use rppal::pwm::{Channel, Pwm};

use crate::core::{DigitalInput, PeripheralManager, Polarity, PwmOutput};
use crate::error::HardwareError;

fn unavailable(port: &str, reason: impl ToString) -> HardwareError {
    HardwareError::Unavailable {
        port: port.to_string(),
        reason: reason.to_string(),
    }
}

fn io(port: &str, reason: impl ToString) -> HardwareError {
    HardwareError::Io {
        port: port.to_string(),
        reason: reason.to_string(),
    }
}

pub struct RpiPwm {
    name: String,
    pwm: Option<Pwm>,
}

impl RpiPwm {
    fn pwm(&self) -> Result<&Pwm, HardwareError> {
        self.pwm
            .as_ref()
            .ok_or_else(|| HardwareError::Closed(self.name.clone()))
    }
}

impl PwmOutput for RpiPwm {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_period(&mut self, period: Duration) -> Result<(), HardwareError> {
        self.pwm()?
            .set_period(period)
            .map_err(|e| io(&self.name, e))
    }

    fn set_pulse_width(&mut self, pulse: Duration) -> Result<(), HardwareError> {
        self.pwm()?
            .set_pulse_width(pulse)
            .map_err(|e| io(&self.name, e))
    }

    fn set_enabled(&mut self, enabled: bool) -> Result<(), HardwareError> {
        let pwm = self.pwm()?;
        let result = if enabled { pwm.enable() } else { pwm.disable() };
        result.map_err(|e| io(&self.name, e))
    }

    fn close(&mut self) -> Result<(), HardwareError> {
        let pwm = self
            .pwm
            .take()
            .ok_or_else(|| HardwareError::Closed(self.name.clone()))?;
        let result = pwm.disable().map_err(|e| io(&self.name, e));
        drop(pwm);
        result
    }
}

pub struct RpiInput {
    name: String,
    pin: Option<InputPin>,
}

impl DigitalInput for RpiInput {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_high(&mut self) -> Result<bool, HardwareError> {
        self.pin
            .as_ref()
            .map(|pin| pin.is_high())
            .ok_or_else(|| HardwareError::Closed(self.name.clone()))
    }

    fn close(&mut self) -> Result<(), HardwareError> {
        self.pin
            .take()
            .map(drop)
            .ok_or_else(|| HardwareError::Closed(self.name.clone()))
    }
}

#[derive(Default)]
pub struct RpiPeripheralManager {
    gpio: Option<Gpio>,
}

impl RpiPeripheralManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn gpio(&mut self, port: &str) -> Result<&Gpio, HardwareError> {
        if self.gpio.is_none() {
            self.gpio = Some(Gpio::new().map_err(|e| unavailable(port, e))?);
        }
        self.gpio
            .as_ref()
            .ok_or_else(|| unavailable(port, "gpio not initialized"))
    }
}

fn channel(name: &str) -> Option<Channel> {
    match name {
        "PWM0" => Some(Channel::Pwm0),
        "PWM1" => Some(Channel::Pwm1),
        _ => None,
    }
}

fn bcm_pin(name: &str) -> Option<u8> {
    name.strip_prefix("BCM")?.parse().ok()
}

impl PeripheralManager for RpiPeripheralManager {
    fn pwm_list(&self) -> Vec<String> {
        vec!["PWM0".to_string(), "PWM1".to_string()]
    }

    fn gpio_list(&self) -> Vec<String> {
        (2..=27).map(|n| format!("BCM{}", n)).collect()
    }

    fn open_pwm(&mut self, name: &str) -> Result<Box<dyn PwmOutput>, HardwareError> {
        let channel = channel(name).ok_or_else(|| unavailable(name, "no such pwm channel"))?;
        let pwm = Pwm::new(channel).map_err(|e| unavailable(name, e))?;

        Ok(Box::new(RpiPwm {
            name: name.to_string(),
            pwm: Some(pwm),
        }))
    }

    fn open_input(
        &mut self,
        name: &str,
        polarity: Polarity,
    ) -> Result<Box<dyn DigitalInput>, HardwareError> {
        let number = bcm_pin(name).ok_or_else(|| unavailable(name, "not a BCM pin name"))?;
        let pin = self
            .gpio(name)?
            .get(number)
            .map_err(|e| unavailable(name, e))?;
        let pin = match polarity {
            Polarity::PressedWhenLow => pin.into_input_pullup(),
            Polarity::PressedWhenHigh => pin.into_input_pulldown(),
        };

        Ok(Box::new(RpiInput {
            name: name.to_string(),
            pin: Some(pin),
        }))
    }
}

#[cfg(test)]
mod rpi_tests {
    use super::*;

    #[test]
    fn port_names() {
        assert_eq!(bcm_pin("BCM21"), Some(21));
        assert_eq!(bcm_pin("GPIO21"), None);
        assert!(matches!(channel("PWM1"), Some(Channel::Pwm1)));
        assert!(channel("PWM7").is_none());
    }
}
