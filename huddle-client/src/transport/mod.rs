mod connection_wrapper;
mod media;
mod peer_connection;
mod transport_config;
mod transport_event;
mod webrtc_backend;

pub use connection_wrapper::*;
pub use media::*;
pub use peer_connection::*;
pub use transport_config::*;
pub use transport_event::*;
pub use webrtc_backend::*;
