mod identity;
mod room_session;

pub use identity::*;
pub use room_session::*;
