mod session_command;
mod session_controller;
mod session_handle;
mod session_observer;
mod session_state;

pub use session_command::*;
pub use session_controller::*;
pub use session_handle::*;
pub use session_observer::*;
pub use session_state::*;
