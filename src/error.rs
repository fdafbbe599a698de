//! Error types shared by the hardware layer, the controller and config loading.

use std::time::Duration;

use thiserror::Error;

use crate::core::{FiringState, ServoRole};

/// Failure of a single hardware operation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HardwareError {
    #[error("port {port} is unavailable: {reason}")]
    Unavailable { port: String, reason: String },

    #[error("i/o error on {port}: {reason}")]
    Io { port: String, reason: String },

    #[error("angle {angle} is outside [{min}, {max}]")]
    AngleOutOfRange { angle: f64, min: f64, max: f64 },

    #[error("invalid range [{min}, {max}]")]
    InvalidRange { min: f64, max: f64 },

    #[error("pulse {pulse:?} exceeds the pwm period {period:?}")]
    PulseTooLong { pulse: Duration, period: Duration },

    #[error("port {0} is already closed")]
    Closed(String),
}

/// Reasons a firing sequence (or a toggle) did not complete.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FireError {
    #[error("controller is not started")]
    NotStarted,

    #[error("a firing sequence is already in progress")]
    Busy,

    #[error("no {0} servo is configured")]
    MissingServo(ServoRole),

    #[error("toggling the {role} servo failed: {source}")]
    Toggle {
        role: ServoRole,
        #[source]
        source: HardwareError,
    },

    #[error("step {step:?} failed: {source}")]
    Hardware {
        step: FiringState,
        #[source]
        source: HardwareError,
    },

    #[error("wait before leaving {step:?} was interrupted")]
    Interrupted { step: FiringState },
}

/// Every release failure collected by a single `stop()`.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{} handle(s) failed to close", .failures.len())]
pub struct ShutdownError {
    pub failures: Vec<HardwareError>,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BoardError {
    #[error("unknown board {0:?}")]
    UnknownBoard(String),
}

/// Errors surfaced by `start()`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StartError {
    #[error("controller is already started")]
    AlreadyStarted,

    #[error(transparent)]
    Hardware(#[from] HardwareError),

    #[error("initialization pass failed: {0}")]
    Initialization(#[from] FireError),
}
