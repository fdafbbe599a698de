use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::core::{ButtonRole, ServoRole};
use crate::error::BoardError;

/// Boards with a known pin layout for the catapult wiring.
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum Board {
    RaspberryPi3,
    Imx7dPico,
    EdisonArduino,
    #[default]
    Simulated,
}

/// Logical roles a port can play in the mechanism.
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug)]
pub enum PortRole {
    Servo(ServoRole),
    Button(ButtonRole),
}

impl Board {
    /// Board-specific port name for `role`.
    pub fn port(&self, role: PortRole) -> &'static str {
        use ButtonRole as B;
        use ServoRole as S;

        match (self, role) {
            (Board::RaspberryPi3, PortRole::Servo(S::Elastics)) => "PWM0",
            (Board::RaspberryPi3, PortRole::Servo(S::Trigger)) => "PWM1",
            (Board::RaspberryPi3, PortRole::Button(B::Trigger)) => "BCM21",
            (Board::RaspberryPi3, PortRole::Button(B::Elastics)) => "BCM20",

            (Board::Imx7dPico, PortRole::Servo(S::Elastics)) => "PWM1",
            (Board::Imx7dPico, PortRole::Servo(S::Trigger)) => "PWM2",
            (Board::Imx7dPico, PortRole::Button(B::Trigger)) => "GPIO6_IO14",
            (Board::Imx7dPico, PortRole::Button(B::Elastics)) => "GPIO6_IO15",

            (Board::EdisonArduino, PortRole::Servo(S::Elastics)) => "IO3",
            (Board::EdisonArduino, PortRole::Servo(S::Trigger)) => "IO5",
            (Board::EdisonArduino, PortRole::Button(B::Trigger)) => "IO12",
            (Board::EdisonArduino, PortRole::Button(B::Elastics)) => "IO13",

            (Board::Simulated, PortRole::Servo(S::Elastics)) => "PWM0",
            (Board::Simulated, PortRole::Servo(S::Trigger)) => "PWM1",
            (Board::Simulated, PortRole::Button(B::Trigger)) => "GPIO21",
            (Board::Simulated, PortRole::Button(B::Elastics)) => "GPIO20",
        }
    }
}

impl FromStr for Board {
    type Err = BoardError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.to_ascii_lowercase().as_str() {
            "rpi3" | "raspberry-pi-3" => Ok(Board::RaspberryPi3),
            "imx7d-pico" | "imx7d" => Ok(Board::Imx7dPico),
            "edison-arduino" | "edison" => Ok(Board::EdisonArduino),
            "simulated" | "sim" => Ok(Board::Simulated),
            _ => Err(BoardError::UnknownBoard(name.to_string())),
        }
    }
}

impl TryFrom<String> for Board {
    type Error = BoardError;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        name.parse()
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Board::RaspberryPi3 => write!(f, "rpi3"),
            Board::Imx7dPico => write!(f, "imx7d-pico"),
            Board::EdisonArduino => write!(f, "edison-arduino"),
            Board::Simulated => write!(f, "simulated"),
        }
    }
}

#[cfg(test)]
mod board_tests {
    use super::*;

    #[test]
    fn rpi3_ports() {
        let board: Board = "rpi3".parse().unwrap();

        assert_eq!(board.port(PortRole::Servo(ServoRole::Elastics)), "PWM0");
        assert_eq!(board.port(PortRole::Servo(ServoRole::Trigger)), "PWM1");
        assert_eq!(board.port(PortRole::Button(ButtonRole::Trigger)), "BCM21");
    }

    #[test]
    fn names_round_trip_through_display() {
        for board in [
            Board::RaspberryPi3,
            Board::Imx7dPico,
            Board::EdisonArduino,
            Board::Simulated,
        ] {
            assert_eq!(board.to_string().parse::<Board>(), Ok(board));
        }
    }

    #[test]
    fn unknown_board_is_rejected() {
        assert_eq!(
            "beaglebone".parse::<Board>(),
            Err(BoardError::UnknownBoard("beaglebone".to_string()))
        );
    }
}
