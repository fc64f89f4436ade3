//! Outbound frame construction.
//!
//! Every message written to the stream carries a correlation `id` so the
//! remote side can match replies to requests. Ids are assigned by the
//! producer scheduler from a per-connection counter; [`OutboundMessage::new`]
//! guarantees the assigned id wins over any `id` key the record already had.

use serde_json::{Map, Value};

/// Connection-unique correlation identifier attached to outbound frames.
pub type CorrelationId = u64;

/// A structured record ready to be framed and written to the stream.
#[derive(Clone, Debug, PartialEq)]
pub struct OutboundMessage {
    id: CorrelationId,
    fields: Map<String, Value>,
}

impl OutboundMessage {
    /// Wrap a producer's record with its correlation id.
    ///
    /// A pre-existing `id` key in the record is discarded so the freshly
    /// assigned id cannot be shadowed.
    pub fn new(id: CorrelationId, mut fields: Map<String, Value>) -> Self {
        let _ = fields.remove("id");
        Self { id, fields }
    }

    /// The correlation id.
    pub fn id(&self) -> CorrelationId {
        self.id
    }

    /// Payload field lookup.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Serialize to the UTF-8 JSON text frame, `id` merged into the object.
    pub fn to_frame(&self) -> String {
        let mut object = Map::with_capacity(self.fields.len() + 1);
        let _ = object.insert("id".to_owned(), Value::from(self.id));
        object.extend(self.fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        Value::Object(object).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn frame_carries_id_and_fields() {
        let message = OutboundMessage::new(7, record(json!({"type":"ping"})));
        let decoded: Value = serde_json::from_str(&message.to_frame()).unwrap();
        assert_eq!(decoded["id"], 7);
        assert_eq!(decoded["type"], "ping");
    }

    #[test]
    fn assigned_id_wins_over_record_id() {
        let message = OutboundMessage::new(3, record(json!({"id": 999, "type":"typing"})));
        assert_eq!(message.id(), 3);
        let decoded: Value = serde_json::from_str(&message.to_frame()).unwrap();
        assert_eq!(decoded["id"], 3);
    }

    #[test]
    fn fields_survive_framing() {
        let message = OutboundMessage::new(
            1,
            record(json!({"type":"message","channel":"C1","text":"hello"})),
        );
        let decoded: Value = serde_json::from_str(&message.to_frame()).unwrap();
        assert_eq!(decoded["channel"], "C1");
        assert_eq!(decoded["text"], "hello");
        assert_eq!(message.get("channel").unwrap(), "C1");
    }
}
