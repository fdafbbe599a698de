//! Runtime configuration.
//!
//! Every field has a default matching the stock catapult wiring, so an empty
//! (or absent) config file yields the sequenced two-servo build on the
//! simulated board. Values are read from TOML:
//!
//! ```toml
//! board = "rpi3"
//! variant = "sequenced"
//! reentry = "queue"
//!
//! [trigger]
//! max_angle = 90.0
//!
//! [timing]
//! after_release_ms = 2500
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use log::LevelFilter;
use serde::Deserialize;

use crate::core::{
    Board, ButtonAction, ButtonRole, DEFAULT_DEBOUNCE, DEFAULT_PERIOD, FiringTimings, Polarity,
    PortRole, ServoRole,
};
use crate::error::ConfigError;

/// Which of the catapult builds is wired up.
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Variant {
    /// Elastics + trigger servos, one button fires the full sequence.
    #[default]
    Sequenced,
    /// Elastics + trigger servos, one toggle button per servo.
    Independent,
    /// Elastics servo only, toggled by a single button.
    SingleServo,
}

/// What to do with a fire request that arrives while a sequence runs.
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReentryPolicy {
    #[default]
    Reject,
    /// Keep at most one deferred fire.
    Queue,
}

/// Resolved angle and pulse limits of one servo.
#[derive(PartialEq, Clone, Copy, Debug)]
pub struct ServoProfile {
    pub min_angle: f64,
    pub max_angle: f64,
    pub min_pulse: Duration,
    pub max_pulse: Duration,
}

pub const ELASTICS_PROFILE: ServoProfile = ServoProfile {
    min_angle: 0.0,
    max_angle: 180.0,
    min_pulse: Duration::from_micros(600),
    max_pulse: Duration::from_micros(2400),
};

pub const TRIGGER_PROFILE: ServoProfile = ServoProfile {
    min_angle: 0.0,
    max_angle: 90.0,
    min_pulse: Duration::from_millis(1),
    max_pulse: Duration::from_millis(2),
};

/// Per-servo overrides. Unset fields fall back to the role's profile.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServoSettings {
    pub port: Option<String>,
    pub min_angle: Option<f64>,
    pub max_angle: Option<f64>,
    pub min_pulse_ms: Option<f64>,
    pub max_pulse_ms: Option<f64>,
}

impl ServoSettings {
    pub fn profile(&self, role: ServoRole) -> Result<ServoProfile, ConfigError> {
        let base = match role {
            ServoRole::Elastics => ELASTICS_PROFILE,
            ServoRole::Trigger => TRIGGER_PROFILE,
        };

        Ok(ServoProfile {
            min_angle: self.min_angle.unwrap_or(base.min_angle),
            max_angle: self.max_angle.unwrap_or(base.max_angle),
            min_pulse: match self.min_pulse_ms {
                Some(ms) => millis(ms, "min_pulse_ms")?,
                None => base.min_pulse,
            },
            max_pulse: match self.max_pulse_ms {
                Some(ms) => millis(ms, "max_pulse_ms")?,
                None => base.max_pulse,
            },
        })
    }
}

/// Two roles of the same kind must never share a port.
fn check_distinct(kind: &str, ports: impl Iterator<Item = String>) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for port in ports {
        if !seen.insert(port.clone()) {
            return Err(ConfigError::Invalid(format!(
                "{} port {} is assigned to more than one role",
                kind, port
            )));
        }
    }
    Ok(())
}

fn millis(ms: f64, field: &str) -> Result<Duration, ConfigError> {
    if !ms.is_finite() || ms < 0.0 {
        return Err(ConfigError::Invalid(format!("{} must be a positive number", field)));
    }
    Ok(Duration::from_nanos((ms * 1_000_000.0).round() as u64))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ButtonSettings {
    pub port: Option<String>,
    pub polarity: Polarity,
    pub debounce_ms: u64,
}

impl Default for ButtonSettings {
    fn default() -> Self {
        Self {
            port: None,
            polarity: Polarity::PressedWhenLow,
            debounce_ms: DEFAULT_DEBOUNCE.as_millis() as u64,
        }
    }
}

impl ButtonSettings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimingConfig {
    pub after_close_ms: u64,
    pub after_stretch_ms: u64,
    pub after_open_ms: u64,
    pub after_release_ms: u64,
    pub rest_after_close_ms: u64,
    pub rest_after_release_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            after_close_ms: 1000,
            after_stretch_ms: 1000,
            after_open_ms: 1000,
            after_release_ms: 2000,
            rest_after_close_ms: 1000,
            rest_after_release_ms: 2000,
        }
    }
}

impl TimingConfig {
    pub fn timings(&self) -> FiringTimings {
        FiringTimings {
            after_close: Duration::from_millis(self.after_close_ms),
            after_stretch: Duration::from_millis(self.after_stretch_ms),
            after_open: Duration::from_millis(self.after_open_ms),
            after_release: Duration::from_millis(self.after_release_ms),
            rest_after_close: Duration::from_millis(self.rest_after_close_ms),
            rest_after_release: Duration::from_millis(self.rest_after_release_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CatapultConfig {
    pub board: Board,
    pub variant: Variant,
    pub reentry: ReentryPolicy,
    pub poll_interval_ms: u64,
    pub log_level: String,
    pub log_file: Option<String>,
    pub log_target: String,
    pub timing: TimingConfig,
    pub elastics: ServoSettings,
    pub trigger: ServoSettings,
    pub trigger_button: ButtonSettings,
    pub elastics_button: ButtonSettings,
}

impl Default for CatapultConfig {
    fn default() -> Self {
        Self {
            board: Board::Simulated,
            variant: Variant::Sequenced,
            reentry: ReentryPolicy::Reject,
            poll_interval_ms: 20,
            log_level: "debug".to_string(),
            log_file: Some("catapult.log".to_string()),
            log_target: "catapult".to_string(),
            timing: TimingConfig::default(),
            elastics: ServoSettings::default(),
            trigger: ServoSettings::default(),
            trigger_button: ButtonSettings::default(),
            elastics_button: ButtonSettings::default(),
        }
    }
}

impl CatapultConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: CatapultConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }

        self.level_filter()?;

        for role in self.servo_roles() {
            let profile = self.servo_settings(role).profile(role)?;

            if !(profile.min_angle.is_finite()
                && profile.max_angle.is_finite()
                && profile.min_angle < profile.max_angle)
            {
                return Err(ConfigError::Invalid(format!(
                    "{} servo angle range [{}, {}] is empty",
                    role, profile.min_angle, profile.max_angle
                )));
            }
            if profile.min_pulse >= profile.max_pulse {
                return Err(ConfigError::Invalid(format!(
                    "{} servo pulse range {:?}..{:?} is empty",
                    role, profile.min_pulse, profile.max_pulse
                )));
            }
            if profile.max_pulse > DEFAULT_PERIOD {
                return Err(ConfigError::Invalid(format!(
                    "{} servo pulse {:?} exceeds the {:?} period",
                    role, profile.max_pulse, DEFAULT_PERIOD
                )));
            }
        }

        let servo_ports = self.servo_roles().into_iter().map(|role| self.servo_port(role));
        check_distinct("servo", servo_ports)?;
        let button_ports = self.bindings().into_iter().map(|(role, _)| self.button_port(role));
        check_distinct("button", button_ports)?;

        Ok(())
    }

    pub fn level_filter(&self) -> Result<LevelFilter, ConfigError> {
        self.log_level
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("unknown log level {:?}", self.log_level)))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn servo_roles(&self) -> Vec<ServoRole> {
        match self.variant {
            Variant::Sequenced | Variant::Independent => {
                vec![ServoRole::Elastics, ServoRole::Trigger]
            }
            Variant::SingleServo => vec![ServoRole::Elastics],
        }
    }

    /// Buttons to open and the action each press edge runs.
    pub fn bindings(&self) -> Vec<(ButtonRole, ButtonAction)> {
        match self.variant {
            Variant::Sequenced => vec![(ButtonRole::Trigger, ButtonAction::Fire)],
            Variant::Independent => vec![
                (
                    ButtonRole::Elastics,
                    ButtonAction::Toggle(ServoRole::Elastics),
                ),
                (ButtonRole::Trigger, ButtonAction::Toggle(ServoRole::Trigger)),
            ],
            Variant::SingleServo => vec![(
                ButtonRole::Trigger,
                ButtonAction::Toggle(ServoRole::Elastics),
            )],
        }
    }

    pub fn servo_settings(&self, role: ServoRole) -> &ServoSettings {
        match role {
            ServoRole::Elastics => &self.elastics,
            ServoRole::Trigger => &self.trigger,
        }
    }

    pub fn button_settings(&self, role: ButtonRole) -> &ButtonSettings {
        match role {
            ButtonRole::Trigger => &self.trigger_button,
            ButtonRole::Elastics => &self.elastics_button,
        }
    }

    /// Explicit port from the config, else the board's default pin.
    pub fn servo_port(&self, role: ServoRole) -> String {
        self.servo_settings(role)
            .port
            .clone()
            .unwrap_or_else(|| self.board.port(PortRole::Servo(role)).to_string())
    }

    pub fn button_port(&self, role: ButtonRole) -> String {
        self.button_settings(role)
            .port
            .clone()
            .unwrap_or_else(|| self.board.port(PortRole::Button(role)).to_string())
    }
}

#[cfg(test)]
mod config_tests {
    use super::*;

    #[test]
    fn empty_file_gives_stock_catapult() {
        let config = CatapultConfig::from_toml_str("").unwrap();

        assert_eq!(config.variant, Variant::Sequenced);
        assert_eq!(config.board, Board::Simulated);
        assert_eq!(
            config.elastics.profile(ServoRole::Elastics).unwrap(),
            ELASTICS_PROFILE
        );
        assert_eq!(
            config.trigger.profile(ServoRole::Trigger).unwrap(),
            TRIGGER_PROFILE
        );
        assert_eq!(
            config.timing.timings().after_release,
            Duration::from_millis(2000)
        );
        assert_eq!(config.bindings(), vec![(ButtonRole::Trigger, ButtonAction::Fire)]);
    }

    #[test]
    fn partial_servo_table_keeps_role_defaults() {
        let config = CatapultConfig::from_toml_str(
            r#"
            board = "rpi3"

            [elastics]
            port = "PWM1"

            [trigger]
            port = "PWM0"
            max_pulse_ms = 1.8
            "#,
        )
        .unwrap();
        let trigger = config.trigger.profile(ServoRole::Trigger).unwrap();

        assert_eq!(config.servo_port(ServoRole::Trigger), "PWM0");
        assert_eq!(config.servo_port(ServoRole::Elastics), "PWM1");
        assert_eq!(config.button_port(ButtonRole::Trigger), "BCM21");
        assert_eq!(trigger.max_angle, 90.0, "trigger keeps its own range");
        assert_eq!(trigger.max_pulse, Duration::from_micros(1800));
    }

    #[test]
    fn shared_ports_are_rejected() {
        let servos = CatapultConfig::from_toml_str("[trigger]\nport = \"PWM0\"");
        let buttons = CatapultConfig::from_toml_str(
            "variant = \"independent\"\n[elastics_button]\nport = \"GPIO21\"",
        );
        let unused = CatapultConfig::from_toml_str(
            "variant = \"single-servo\"\n[trigger]\nport = \"PWM0\"",
        );

        assert!(matches!(servos, Err(ConfigError::Invalid(_))), "both servos on PWM0");
        assert!(matches!(buttons, Err(ConfigError::Invalid(_))), "both buttons on GPIO21");
        assert!(unused.is_ok(), "trigger servo is not opened by this variant");
    }

    #[test]
    fn variants_bind_buttons() {
        let independent = CatapultConfig::from_toml_str(r#"variant = "independent""#).unwrap();
        let single = CatapultConfig::from_toml_str(r#"variant = "single-servo""#).unwrap();

        assert_eq!(independent.bindings().len(), 2);
        assert_eq!(single.servo_roles(), vec![ServoRole::Elastics]);
        assert_eq!(
            single.bindings(),
            vec![(
                ButtonRole::Trigger,
                ButtonAction::Toggle(ServoRole::Elastics)
            )]
        );
    }

    #[test]
    fn invalid_values_are_rejected() {
        for text in [
            r#"board = "beaglebone""#,
            r#"poll_interval_ms = 0"#,
            r#"log_level = "loud""#,
            "[elastics]\nmin_angle = 90.0\nmax_angle = 10.0",
            "[trigger]\nmax_pulse_ms = 25.0",
            "[trigger]\nmin_pulse_ms = -1.0",
            r#"unknown_key = 1"#,
        ] {
            assert!(
                CatapultConfig::from_toml_str(text).is_err(),
                "{:?} should be rejected",
                text
            );
        }
    }

    #[test]
    fn single_servo_ignores_trigger_limits() {
        let config = CatapultConfig::from_toml_str(
            "variant = \"single-servo\"\n[trigger]\nmin_angle = 50.0\nmax_angle = 10.0",
        );

        assert!(config.is_ok(), "trigger servo is not used by this variant");
    }
}
