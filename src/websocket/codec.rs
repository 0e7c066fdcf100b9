use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A decoded real-time message.
///
/// Every frame the server sends is a JSON object with a `type` field naming
/// the message category; all remaining top-level fields are carried through
/// untouched as the payload. The `kind` is the dispatch key used by the
/// subscription registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Envelope {
    /// Deserializes the payload fields into a concrete type, e.g. one of
    /// the structs in [`crate::types`].
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T> {
        let value = Value::Object(self.payload.clone());
        Ok(serde_json::from_value(value)?)
    }
}

/// Serializes an outbound message to the text frame format.
///
/// Errors are surfaced to the caller of `send`; the connection is not
/// affected by an encode failure.
pub fn encode<T: Serialize + ?Sized>(message: &T) -> Result<String> {
    Ok(serde_json::to_string(message)?)
}

/// Parses an inbound text frame into an [`Envelope`].
///
/// A frame missing a string `type` field is a decode error. Callers drop
/// the frame and keep reading; a malformed frame never closes the
/// connection.
pub fn decode(frame: &str) -> Result<Envelope> {
    Ok(serde_json::from_str(frame)?)
}
