//! Inbound frame decoding.
//!
//! Every frame on the stream is a UTF-8 JSON object carrying at least a
//! `type` discriminator. [`Event::parse`] is the only way to construct an
//! [`Event`], so a dispatched event always has a non-empty type. Frames that
//! fail to decode, are not objects, or lack the discriminator surface as
//! [`FrameError`]; they are reported, not dropped into a default bucket.

use serde_json::{Map, Value};
use thiserror::Error;

/// Why an inbound frame could not be turned into an [`Event`].
#[derive(Debug, Error)]
pub enum FrameError {
    /// The frame was not valid JSON.
    #[error("frame is not valid JSON")]
    Json(#[from] serde_json::Error),

    /// The frame decoded to something other than a JSON object.
    #[error("frame is not a JSON object")]
    NotAnObject,

    /// The frame object has no usable `type` discriminator.
    #[error("frame is missing a `type` discriminator")]
    MissingType,
}

/// One decoded inbound occurrence.
///
/// An opaque string-keyed record with a guaranteed non-empty `type`
/// discriminator. Payload fields beyond `type` are not validated.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    event_type: String,
    fields: Map<String, Value>,
}

impl Event {
    /// Decode a text frame into an event.
    ///
    /// # Errors
    ///
    /// [`FrameError::Json`] for undecodable text, [`FrameError::NotAnObject`]
    /// for non-object JSON, [`FrameError::MissingType`] when `type` is
    /// absent, empty, or not a string.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(text)?;
        let Value::Object(fields) = value else {
            return Err(FrameError::NotAnObject);
        };
        let event_type = fields
            .get("type")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or(FrameError::MissingType)?
            .to_owned();
        Ok(Self { event_type, fields })
    }

    /// The `type` discriminator. Never empty.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Look up a payload field by key (`type` included).
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// The full decoded record.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Consume the event, yielding the decoded record.
    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }
}
