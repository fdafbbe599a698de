use std::fmt;
use std::time::Duration;

use log::{debug, warn};
use serde::Deserialize;

use crate::core::{DigitalInput, ServoRole};
use crate::error::HardwareError;

/// A changed level must hold this long to count as an edge.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Polarity {
    /// Pulled up, switch shorts to ground.
    #[default]
    PressedWhenLow,
    PressedWhenHigh,
}

impl Polarity {
    pub fn is_pressed(&self, high: bool) -> bool {
        match self {
            Polarity::PressedWhenLow => !high,
            Polarity::PressedWhenHigh => high,
        }
    }

    /// Electrical level of a pressed button.
    pub fn pressed_level(&self) -> bool {
        matches!(self, Polarity::PressedWhenHigh)
    }
}

#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ButtonRole {
    Trigger,
    Elastics,
}

impl fmt::Display for ButtonRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ButtonRole::Trigger => write!(f, "trigger"),
            ButtonRole::Elastics => write!(f, "elastics"),
        }
    }
}

#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug)]
pub enum ButtonEvent {
    Pressed,
    Released,
}

/// What a press edge on a registered button does.
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug)]
pub enum ButtonAction {
    Fire,
    Toggle(ServoRole),
}

/// An opened push-button with debounced edge detection.
pub struct ButtonHandle {
    role: ButtonRole,
    port: String,
    input: Option<Box<dyn DigitalInput>>,
    polarity: Polarity,
    debounce: Duration,
    pressed: bool,
    pending: Option<(bool, Duration)>,
    action: Option<ButtonAction>,
}

impl ButtonHandle {
    /// Samples the line once so a button held during startup does not
    /// produce a press edge.
    pub fn open(
        role: ButtonRole,
        mut input: Box<dyn DigitalInput>,
        polarity: Polarity,
        debounce: Duration,
    ) -> Result<Self, HardwareError> {
        let pressed = polarity.is_pressed(input.is_high()?);

        Ok(ButtonHandle {
            role,
            port: input.name().to_string(),
            input: Some(input),
            polarity,
            debounce,
            pressed,
            pending: None,
            action: None,
        })
    }

    pub fn register(&mut self, action: ButtonAction) {
        self.action = Some(action);
    }

    pub fn unregister(&mut self) -> Option<ButtonAction> {
        self.action.take()
    }

    /// Reads the line and returns an edge once a changed level has been
    /// stable for the debounce delay.
    pub fn poll(&mut self, now: Duration) -> Result<Option<ButtonEvent>, HardwareError> {
        let high = match self.input.as_mut() {
            Some(input) => input.is_high()?,
            None => return Err(HardwareError::Closed(self.port.clone())),
        };
        let pressed = self.polarity.is_pressed(high);

        if pressed == self.pressed {
            self.pending = None;
            return Ok(None);
        }

        let since = match self.pending {
            Some((level, since)) if level == pressed => since,
            _ => {
                self.pending = Some((pressed, now));
                now
            }
        };

        if now.saturating_sub(since) < self.debounce {
            return Ok(None);
        }

        self.pressed = pressed;
        self.pending = None;

        let event = if pressed {
            ButtonEvent::Pressed
        } else {
            ButtonEvent::Released
        };
        debug!("{} button ({}) {:?}", self.role, self.port, event);

        Ok(Some(event))
    }

    pub fn close(&mut self) -> Result<(), HardwareError> {
        self.action = None;
        let mut input = self
            .input
            .take()
            .ok_or_else(|| HardwareError::Closed(self.port.clone()))?;

        input.close()
    }

    pub fn is_open(&self) -> bool {
        self.input.is_some()
    }

    pub fn role(&self) -> ButtonRole {
        self.role
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn action(&self) -> Option<ButtonAction> {
        self.action
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed
    }
}

impl Drop for ButtonHandle {
    fn drop(&mut self) {
        if self.input.is_some() {
            if let Err(e) = self.close() {
                warn!("{} button ({}) failed to close on drop: {}", self.role, self.port, e);
            }
        }
    }
}
