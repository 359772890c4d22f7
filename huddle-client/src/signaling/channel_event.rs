/// Events the relay connection produces for the session loop.
///
/// `generation` identifies the connection attempt that produced the event;
/// events from a connection the channel has already replaced are stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Message {
        generation: u64,
        text: String,
    },
    Closed {
        generation: u64,
        code: u16,
        reason: String,
    },
    ReconnectDue {
        attempt: u32,
    },
}
