pub mod catapult_control;

pub use catapult_control::*;
