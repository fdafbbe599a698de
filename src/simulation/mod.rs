pub mod clock;
pub mod simulated_hardware;

pub use clock::*;
pub use simulated_hardware::*;
