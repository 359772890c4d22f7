mod glare;
mod ice_buffer;
mod peer_negotiator;

pub use glare::*;
pub use ice_buffer::*;
pub use peer_negotiator::*;
