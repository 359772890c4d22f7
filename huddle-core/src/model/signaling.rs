use crate::model::ice::IceCandidate;
use crate::model::room::RoomInfo;
use crate::model::session_description::SessionDescription;
use serde::{Deserialize, Serialize};

fn is_false(value: &bool) -> bool {
    !*value
}

/// Relay wire protocol. Every message is a JSON object discriminated by `type`.
///
/// Peer-to-peer messages (`offer`, `answer`, `ice_candidate`) carry the
/// sender's `username` and, optionally, the `target` they are meant for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalMessage {
    Join {
        room: String,
        username: String,
        #[serde(default, skip_serializing_if = "is_false")]
        create: bool,
    },
    Leave {
        room: String,
        username: String,
    },
    RoomInfo {
        data: RoomInfo,
    },
    Error {
        data: String,
    },
    StartCall {
        room: String,
        username: String,
    },
    Offer {
        sdp: SessionDescription,
        room: String,
        username: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<String>,
    },
    Answer {
        sdp: SessionDescription,
        room: String,
        username: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<String>,
    },
    IceCandidate {
        ice: IceCandidate,
        room: String,
        username: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<String>,
    },
    EndCall {
        room: String,
        username: String,
    },
}

impl SignalMessage {
    pub const KINDS: [&'static str; 9] = [
        "join",
        "leave",
        "room_info",
        "error",
        "start_call",
        "offer",
        "answer",
        "ice_candidate",
        "end_call",
    ];

    pub fn kind(&self) -> &'static str {
        match self {
            SignalMessage::Join { .. } => "join",
            SignalMessage::Leave { .. } => "leave",
            SignalMessage::RoomInfo { .. } => "room_info",
            SignalMessage::Error { .. } => "error",
            SignalMessage::StartCall { .. } => "start_call",
            SignalMessage::Offer { .. } => "offer",
            SignalMessage::Answer { .. } => "answer",
            SignalMessage::IceCandidate { .. } => "ice_candidate",
            SignalMessage::EndCall { .. } => "end_call",
        }
    }

    /// Room this message refers to, if it names one.
    pub fn room(&self) -> Option<&str> {
        match self {
            SignalMessage::Join { room, .. }
            | SignalMessage::Leave { room, .. }
            | SignalMessage::StartCall { room, .. }
            | SignalMessage::Offer { room, .. }
            | SignalMessage::Answer { room, .. }
            | SignalMessage::IceCandidate { room, .. }
            | SignalMessage::EndCall { room, .. } => Some(room),
            SignalMessage::RoomInfo { .. } | SignalMessage::Error { .. } => None,
        }
    }

    /// Username of the member that produced this message.
    pub fn sender(&self) -> Option<&str> {
        match self {
            SignalMessage::Join { username, .. }
            | SignalMessage::Leave { username, .. }
            | SignalMessage::StartCall { username, .. }
            | SignalMessage::Offer { username, .. }
            | SignalMessage::Answer { username, .. }
            | SignalMessage::IceCandidate { username, .. }
            | SignalMessage::EndCall { username, .. } => Some(username),
            SignalMessage::RoomInfo { .. } | SignalMessage::Error { .. } => None,
        }
    }

    pub fn target(&self) -> Option<&str> {
        match self {
            SignalMessage::Offer { target, .. }
            | SignalMessage::Answer { target, .. }
            | SignalMessage::IceCandidate { target, .. } => target.as_deref(),
            _ => None,
        }
    }
}
