use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{ClientMessage, ServerMessage, MAX_MESSAGE_SIZE};

/// JSON framing for protocol events.
///
/// A frame is one JSON object `{"name": <event>, "data": <payload>}`.
/// Transports that carry the name and payload separately (socket.io style)
/// use [`EventCodec::to_parts`] and the `*_from_parts` constructors instead.
pub struct EventCodec;

impl EventCodec {
    /// Encode one event as a JSON frame.
    pub fn encode<M: Serialize>(msg: &M) -> ProtocolResult<Vec<u8>> {
        let frame =
            serde_json::to_vec(msg).map_err(|e| ProtocolError::Serialization(e.to_string()))?;
        if frame.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size: frame.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        Ok(frame)
    }

    /// Decode one JSON frame.
    pub fn decode<M: DeserializeOwned>(frame: &[u8]) -> ProtocolResult<M> {
        if frame.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size: frame.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        serde_json::from_slice(frame).map_err(|e| ProtocolError::Deserialization(e.to_string()))
    }

    /// Split an event into its name and payload (`Value::Null` when the
    /// event carries none).
    pub fn to_parts<M: Serialize>(msg: &M) -> ProtocolResult<(String, Value)> {
        let mut frame =
            serde_json::to_value(msg).map_err(|e| ProtocolError::Serialization(e.to_string()))?;
        let name = match frame.get("name").and_then(Value::as_str) {
            Some(name) => name.to_string(),
            None => {
                return Err(ProtocolError::Serialization(
                    "event has no name".to_string(),
                ))
            }
        };
        let data = frame
            .as_object_mut()
            .and_then(|obj| obj.remove("data"))
            .unwrap_or(Value::Null);
        Ok((name, data))
    }

    /// Rebuild a client event from its name and payload.
    pub fn client_from_parts(name: &str, data: Value) -> ProtocolResult<ClientMessage> {
        if !ClientMessage::is_known(name) {
            debug!(event = name, "unknown client event");
            return Err(ProtocolError::UnknownEvent(name.to_string()));
        }
        from_parts(name, data)
    }

    /// Rebuild a server event from its name and payload.
    pub fn server_from_parts(name: &str, data: Value) -> ProtocolResult<ServerMessage> {
        if !ServerMessage::is_known(name) {
            debug!(event = name, "unknown server event");
            return Err(ProtocolError::UnknownEvent(name.to_string()));
        }
        from_parts(name, data)
    }
}

fn from_parts<M: DeserializeOwned>(name: &str, data: Value) -> ProtocolResult<M> {
    let mut frame = serde_json::Map::new();
    frame.insert("name".into(), Value::String(name.to_string()));
    if !data.is_null() {
        frame.insert("data".into(), data);
    }
    serde_json::from_value(Value::Object(frame))
        .map_err(|e| ProtocolError::Deserialization(e.to_string()))
}
