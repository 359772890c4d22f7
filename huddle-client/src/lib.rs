mod config;
mod controller;
mod error;
mod negotiation;
mod room;
mod signaling;
mod transport;

pub use config::*;
pub use controller::*;
pub use error::*;
pub use negotiation::*;
pub use room::*;
pub use signaling::*;
pub use transport::*;

pub use huddle_core::{IceCandidate, IceServerConfig, SessionDescription, SignalMessage};
