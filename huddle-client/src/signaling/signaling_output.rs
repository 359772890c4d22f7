use huddle_core::SignalMessage;

/// Outbound signaling messages to the relay.
///
/// Never fails from the caller's point of view: a message that cannot be
/// delivered because the channel is not open is logged and dropped.
pub trait SignalingOutput: Send + Sync {
    fn send(&self, msg: SignalMessage);
}
