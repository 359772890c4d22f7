pub use huddle_core::SignalMessage;

pub mod model {
    pub use huddle_core::model::*;
}

pub mod codec {
    pub use huddle_core::codec::*;
}

#[cfg(feature = "client")]
pub mod client {
    pub use huddle_client::*;
}
