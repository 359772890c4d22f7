use crate::model::SignalMessage;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("signaling message is not a JSON object")]
    NotAnObject,

    #[error("signaling message has neither `type` nor `action`")]
    MissingDiscriminant,

    #[error("unknown signaling message type `{0}`")]
    UnknownType(String),

    #[error("malformed `{kind}` message: {source}")]
    Malformed {
        kind: String,
        source: serde_json::Error,
    },
}

/// Parse one relay frame into a typed message.
///
/// Accepts the variants seen on the wire: `action` in place of `type`, `sdp`
/// as a bare string instead of a description object, and `room_info` with
/// `users` at the top level instead of under `data`.
pub fn decode(text: &str) -> Result<SignalMessage, CodecError> {
    let mut value: Value = serde_json::from_str(text)?;
    let obj = value.as_object_mut().ok_or(CodecError::NotAnObject)?;

    let kind = normalize_discriminant(obj)?;
    if !SignalMessage::KINDS.contains(&kind.as_str()) {
        return Err(CodecError::UnknownType(kind));
    }

    match kind.as_str() {
        "offer" | "answer" => normalize_sdp(obj, &kind),
        "room_info" => normalize_room_info(obj),
        _ => {}
    }

    serde_json::from_value(value).map_err(|source| CodecError::Malformed { kind, source })
}

/// Serialize a message in the canonical outbound shape.
pub fn encode(msg: &SignalMessage) -> Result<String, CodecError> {
    Ok(serde_json::to_string(msg)?)
}

fn normalize_discriminant(obj: &mut Map<String, Value>) -> Result<String, CodecError> {
    if let Some(Value::String(kind)) = obj.get("type") {
        return Ok(kind.clone());
    }

    match obj.remove("action") {
        Some(Value::String(kind)) => {
            obj.insert("type".to_owned(), Value::String(kind.clone()));
            Ok(kind)
        }
        _ => Err(CodecError::MissingDiscriminant),
    }
}

fn normalize_sdp(obj: &mut Map<String, Value>, kind: &str) {
    let Some(Value::String(sdp)) = obj.get("sdp") else {
        return;
    };

    let mut desc = Map::new();
    desc.insert("type".to_owned(), Value::String(kind.to_owned()));
    desc.insert("sdp".to_owned(), Value::String(sdp.clone()));
    obj.insert("sdp".to_owned(), Value::Object(desc));
}

fn normalize_room_info(obj: &mut Map<String, Value>) {
    if obj.contains_key("data") {
        return;
    }

    let users = obj.remove("users").unwrap_or(Value::Array(Vec::new()));
    let mut data = Map::new();
    data.insert("users".to_owned(), users);
    obj.insert("data".to_owned(), Value::Object(data));
}
