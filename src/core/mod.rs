pub mod board;
pub mod button;
pub mod hardware;
pub mod servo;
pub mod state;

pub use board::*;
pub use button::*;
pub use hardware::*;
pub use servo::*;
pub use state::*;
