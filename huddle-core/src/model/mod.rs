mod ice;
mod ice_server;
mod room;
mod session_description;
mod signaling;

pub use ice::IceCandidate;
pub use ice_server::IceServerConfig;
pub use room::RoomInfo;
pub use session_description::{SdpKind, SessionDescription};
pub use signaling::SignalMessage;
