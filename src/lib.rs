pub mod config;
pub mod control;
pub mod core;
pub mod error;
#[cfg(feature = "rpi")]
pub mod rpi;
pub mod simulation;
pub mod ui;

// Re-export key items
pub use crate::core::*;
pub use config::*;
pub use control::*;
pub use error::*;
pub use simulation::*;
