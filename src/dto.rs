//! Wire DTOs and mapping to the domain model
//!
//! `MessageRow` is the backend's row shape, shared by the REST gateway and
//! the realtime change feed. Mapping into [`Message`] is the single place
//! wire defaults are applied.

use crate::models::{Message, MessageKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

// ============================================================================
// Message row (wire shape)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRow {
    pub id: String,
    pub room_id: String,
    pub sender_id: String,
    #[serde(default)]
    pub content: String,
    pub message_type: Option<String>,
    pub attachment_url: Option<String>,
    pub metadata: Option<Value>,
    pub is_read: Option<bool>,
    pub read_at: Option<String>,
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

impl MessageRow {
    /// Wire defaults: missing kind => text, missing metadata => empty map,
    /// missing read flag => false.
    pub fn into_message(self) -> Message {
        let kind = self
            .message_type
            .as_deref()
            .map(MessageKind::parse)
            .unwrap_or_default();

        Message {
            id: self.id,
            room_id: self.room_id,
            sender_id: self.sender_id,
            kind,
            content: self.content,
            attachment_url: self.attachment_url,
            metadata: self.metadata.map(coerce_metadata).unwrap_or_default(),
            is_read: self.is_read.unwrap_or(false),
            read_at: self.read_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Metadata values arrive as arbitrary JSON; the UI only ever shows them,
/// so everything is coerced to a display string.
fn coerce_metadata(value: Value) -> HashMap<String, String> {
    match value {
        Value::Object(map) => map
            .into_iter()
            .map(|(k, v)| {
                let s = match v {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                (k, s)
            })
            .collect(),
        _ => HashMap::new(),
    }
}

// ============================================================================
// Insert payload
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct NewMessage {
    pub room_id: String,
    pub sender_id: String,
    pub content: String,
    pub message_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
}

impl NewMessage {
    pub fn text(room_id: &str, sender_id: &str, content: &str) -> Self {
        Self {
            room_id: room_id.to_string(),
            sender_id: sender_id.to_string(),
            content: content.to_string(),
            message_type: MessageKind::Text.as_str().to_string(),
            attachment_url: None,
            metadata: None,
        }
    }

    pub fn image(room_id: &str, sender_id: &str, url: &str, caption: &str) -> Self {
        Self {
            room_id: room_id.to_string(),
            sender_id: sender_id.to_string(),
            content: caption.to_string(),
            message_type: MessageKind::Image.as_str().to_string(),
            attachment_url: Some(url.to_string()),
            metadata: None,
        }
    }

    pub fn audio(room_id: &str, sender_id: &str, url: &str, duration_ms: u64) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("duration_ms".to_string(), duration_ms.to_string());

        Self {
            room_id: room_id.to_string(),
            sender_id: sender_id.to_string(),
            content: String::new(),
            message_type: MessageKind::Audio.as_str().to_string(),
            attachment_url: Some(url.to_string()),
            metadata: Some(metadata),
        }
    }
}

// ============================================================================
// Realtime frame decoding
// ============================================================================

const REQUIRED_FIELDS: [&str; 7] = [
    "id",
    "room_id",
    "sender_id",
    "content",
    "message_type",
    "created_at",
    "updated_at",
];

/// Decode one realtime text frame into a message row.
///
/// Fail-open by contract: anything that is not a well-formed INSERT
/// notification with every required record field present yields `None`,
/// so one bad frame can never take down the pump loop.
pub fn decode_insert_frame(frame: &str) -> Option<MessageRow> {
    // Cheap marker check before paying for a full JSON parse
    if !frame.contains("\"INSERT\"") {
        return None;
    }

    let envelope: Value = serde_json::from_str(frame).ok()?;
    if envelope.get("event")?.as_str()? != "INSERT" {
        return None;
    }

    let record = envelope.get("payload")?.get("record")?;

    let mut fields = HashMap::new();
    for name in REQUIRED_FIELDS {
        fields.insert(name, record.get(name)?.as_str()?.to_string());
    }

    let attachment_url = record
        .get("attachment_url")
        .and_then(Value::as_str)
        .map(str::to_string);

    Some(MessageRow {
        id: fields.remove("id")?,
        room_id: fields.remove("room_id")?,
        sender_id: fields.remove("sender_id")?,
        content: fields.remove("content")?,
        message_type: fields.remove("message_type"),
        attachment_url,
        metadata: record.get("metadata").cloned(),
        is_read: record.get("is_read").and_then(Value::as_bool),
        read_at: record.get("read_at").and_then(Value::as_str).map(str::to_string),
        created_at: fields.remove("created_at")?,
        updated_at: fields.remove("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn insert_frame(record: Value) -> String {
        json!({
            "topic": "realtime:public:messages",
            "event": "INSERT",
            "payload": { "record": record }
        })
        .to_string()
    }

    fn full_record() -> Value {
        json!({
            "id": "msg-1",
            "room_id": "room-9",
            "sender_id": "buyer-1",
            "content": "is this still available?",
            "message_type": "text",
            "created_at": "2024-03-01T10:00:00+00:00",
            "updated_at": "2024-03-01T10:00:00+00:00"
        })
    }

    #[test]
    fn test_decode_valid_frame() {
        let row = decode_insert_frame(&insert_frame(full_record())).unwrap();

        assert_eq!(row.id, "msg-1");
        assert_eq!(row.room_id, "room-9");
        assert_eq!(row.sender_id, "buyer-1");
        assert_eq!(row.content, "is this still available?");
        assert_eq!(row.message_type.as_deref(), Some("text"));
        assert_eq!(row.created_at, "2024-03-01T10:00:00+00:00");
        assert!(row.attachment_url.is_none());
    }

    #[test]
    fn test_decode_optional_attachment() {
        let mut record = full_record();
        record["attachment_url"] = json!("https://cdn.example/img.jpg");
        record["message_type"] = json!("image");

        let row = decode_insert_frame(&insert_frame(record)).unwrap();
        assert_eq!(row.attachment_url.as_deref(), Some("https://cdn.example/img.jpg"));
    }

    #[test]
    fn test_decode_missing_required_field() {
        for field in ["id", "room_id", "sender_id", "content", "created_at"] {
            let mut record = full_record();
            record.as_object_mut().unwrap().remove(field);
            assert!(decode_insert_frame(&insert_frame(record)).is_none(), "{}", field);
        }
    }

    #[test]
    fn test_decode_rejects_non_insert_event() {
        let frame = json!({
            "topic": "realtime:public:messages",
            "event": "UPDATE",
            "payload": { "record": full_record() }
        })
        .to_string();
        assert!(decode_insert_frame(&frame).is_none());
    }

    #[test]
    fn test_decode_garbage_frames() {
        assert!(decode_insert_frame("not json at all").is_none());
        assert!(decode_insert_frame("{\"event\": \"INSERT\"").is_none());
        assert!(decode_insert_frame("{}").is_none());
        // Marker present but record is the wrong type
        assert!(decode_insert_frame("{\"event\":\"INSERT\",\"payload\":{\"record\":3}}").is_none());
    }

    #[test]
    fn test_mapping_defaults() {
        let row: MessageRow = serde_json::from_value(json!({
            "id": "m1",
            "room_id": "r1",
            "sender_id": "s1",
            "created_at": "2024-01-01T00:00:00+00:00"
        }))
        .unwrap();

        let msg = row.into_message();
        assert_eq!(msg.kind, MessageKind::Text);
        assert!(msg.metadata.is_empty());
        assert!(!msg.is_read);
        assert_eq!(msg.content, "");
        assert_eq!(msg.updated_at, "");
    }

    #[test]
    fn test_metadata_coerced_to_strings() {
        let mut record = full_record();
        record["metadata"] = json!({ "duration_ms": 4200, "label": "voice note" });

        let msg = decode_insert_frame(&insert_frame(record)).unwrap().into_message();
        assert_eq!(msg.metadata.get("duration_ms").map(String::as_str), Some("4200"));
        assert_eq!(msg.metadata.get("label").map(String::as_str), Some("voice note"));
    }

    #[test]
    fn test_new_message_audio_metadata() {
        let new = NewMessage::audio("r1", "s1", "https://signed", 1500);
        assert_eq!(new.message_type, "audio");
        assert_eq!(
            new.metadata.as_ref().and_then(|m| m.get("duration_ms")).map(String::as_str),
            Some("1500")
        );
    }
}
