//! Turns whatever the real-time channel hands us into a canonical [`Message`].
//!
//! Accepted shapes:
//! - a message object
//! - the same object JSON-encoded as a string
//! - an envelope `{conversation_id, message}` whose inner record may lack
//!   its own conversation reference
//!
//! Field spellings differ between server versions (`_id` vs `id`,
//! `conversation_id` vs `conversationId` vs a populated `conversation`
//! object), so the record is canonicalised before it is decoded. REST
//! conversation records get the same treatment through
//! [`normalize_conversation`].

use crate::domain::entities::{Conversation, Message};
use serde_json::{Map, Value};
use thiserror::Error;

const ID_KEYS: [&str; 2] = ["_id", "id"];
const CONVERSATION_KEYS: [&str; 3] = ["conversation_id", "conversationId", "conversation"];
/// Fields that may hold a populated user summary
const USER_KEYS: [&str; 7] = [
    "sender",
    "sender_id",
    "user",
    "user_id",
    "assigned_to",
    "assignee",
    "closed_by",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizationError {
    #[error("Payload is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("Payload is not an object")]
    NotAnObject,
    #[error("Message has neither an id nor a conversation reference")]
    MissingIdentity,
    #[error("Message could not be decoded: {0}")]
    Malformed(String),
}

/// Normalize a raw inbound payload
pub fn normalize(payload: Value) -> Result<Message, NormalizationError> {
    let value = decode_text(payload)?;
    let Value::Object(record) = value else {
        return Err(NormalizationError::NotAnObject);
    };

    let mut record = unwrap_envelope(record);
    canonicalize_key(&mut record, &ID_KEYS);
    canonicalize_key(&mut record, &CONVERSATION_KEYS);

    if !has_identity(&record) {
        return Err(NormalizationError::MissingIdentity);
    }
    canonicalize_users(&mut record);

    serde_json::from_value(Value::Object(record))
        .map_err(|e| NormalizationError::Malformed(e.to_string()))
}

/// Normalize a conversation record from a list or detail response
pub fn normalize_conversation(payload: Value) -> Result<Conversation, NormalizationError> {
    let Value::Object(mut record) = decode_text(payload)? else {
        return Err(NormalizationError::NotAnObject);
    };

    canonicalize_key(&mut record, &ID_KEYS);
    if !record.contains_key(ID_KEYS[0]) {
        return Err(NormalizationError::MissingIdentity);
    }
    canonicalize_users(&mut record);
    if let Some(Value::Object(last)) = record.get_mut("last_message") {
        canonicalize_users(last);
    }

    serde_json::from_value(Value::Object(record))
        .map_err(|e| NormalizationError::Malformed(e.to_string()))
}

/// Normalize a payload that arrived as raw text
pub fn normalize_str(text: &str) -> Result<Message, NormalizationError> {
    normalize(Value::String(text.to_string()))
}

fn decode_text(payload: Value) -> Result<Value, NormalizationError> {
    match payload {
        Value::String(text) => serde_json::from_str(&text)
            .map_err(|e| NormalizationError::InvalidJson(e.to_string())),
        other => Ok(other),
    }
}

/// Unwrap `{conversation_id, message}` envelopes, propagating the outer
/// conversation reference onto the inner record when it has none.
fn unwrap_envelope(mut record: Map<String, Value>) -> Map<String, Value> {
    let outer_conversation = reference_of(&record, &CONVERSATION_KEYS);
    if outer_conversation.is_none() || !record.contains_key("message") {
        return record;
    }

    let mut inner = match record.remove("message") {
        Some(Value::Object(inner)) => inner,
        Some(Value::String(text)) => match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(inner)) => inner,
            // Plain text in a `message` field is content, not an envelope
            _ => {
                record.insert("message".to_string(), Value::String(text));
                return record;
            }
        },
        Some(other) => {
            record.insert("message".to_string(), other);
            return record;
        }
        None => return record,
    };

    if reference_of(&inner, &CONVERSATION_KEYS).is_none() {
        if let Some(conversation_id) = outer_conversation {
            for key in CONVERSATION_KEYS {
                inner.remove(key);
            }
            inner.insert("conversation_id".to_string(), Value::String(conversation_id));
        }
    }

    inner
}

/// Collapse alias spellings of one field into the first canonical key,
/// flattening populated objects and numeric ids into plain strings.
fn canonicalize_key(record: &mut Map<String, Value>, keys: &[&str]) {
    let value = reference_of(record, keys);
    for key in keys {
        record.remove(*key);
    }
    if let Some(value) = value {
        record.insert(keys[0].to_string(), Value::String(value));
    }
}

/// Collapse `_id`/`id` on embedded user summaries
fn canonicalize_users(record: &mut Map<String, Value>) {
    for key in USER_KEYS {
        if let Some(Value::Object(user)) = record.get_mut(key) {
            canonicalize_key(user, &ID_KEYS);
        }
    }
}

fn reference_of(record: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| record.get(*key))
        .find_map(as_reference)
}

fn as_reference(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(obj) => ID_KEYS
            .iter()
            .filter_map(|key| obj.get(*key))
            .find_map(as_reference),
        _ => None,
    }
}

fn has_identity(record: &Map<String, Value>) -> bool {
    record.contains_key(ID_KEYS[0]) || record.contains_key(CONVERSATION_KEYS[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_object() {
        let msg = normalize(json!({"_id": "m1", "conversation_id": "c1", "content": "hello"})).unwrap();
        assert_eq!(msg.id.as_deref(), Some("m1"));
        assert_eq!(msg.conversation_id.as_deref(), Some("c1"));
        assert_eq!(msg.content, "hello");
    }

    #[test]
    fn test_json_string_payload() {
        let msg = normalize_str(r#"{"_id":"m2","conversation_id":"c1","content":"x"}"#).unwrap();
        assert_eq!(msg.id.as_deref(), Some("m2"));
    }

    #[test]
    fn test_invalid_json_rejected() {
        let err = normalize_str("{invalid json").unwrap_err();
        assert!(matches!(err, NormalizationError::InvalidJson(_)));
    }

    #[test]
    fn test_envelope_propagates_conversation_id() {
        let msg = normalize(json!({
            "conversation_id": "c9",
            "message": {"_id": "m3", "content": "wrapped"}
        }))
        .unwrap();
        assert_eq!(msg.conversation_id.as_deref(), Some("c9"));
        assert_eq!(msg.content, "wrapped");
    }

    #[test]
    fn test_envelope_keeps_inner_conversation_id() {
        let msg = normalize(json!({
            "conversation_id": "outer",
            "message": {"_id": "m4", "conversation_id": "inner"}
        }))
        .unwrap();
        assert_eq!(msg.conversation_id.as_deref(), Some("inner"));
    }

    #[test]
    fn test_text_message_field_is_not_an_envelope() {
        let msg = normalize(json!({"_id": "m6", "conversation_id": "c1", "message": "hi"})).unwrap();
        assert_eq!(msg.id.as_deref(), Some("m6"));
    }

    #[test]
    fn test_blank_identity_rejected() {
        let err = normalize(json!({"_id": "", "conversation_id": null, "content": "x"})).unwrap_err();
        assert_eq!(err, NormalizationError::MissingIdentity);
    }

    #[test]
    fn test_missing_identity_rejected() {
        let err = normalize(json!({"content": "orphan"})).unwrap_err();
        assert_eq!(err, NormalizationError::MissingIdentity);
    }

    #[test]
    fn test_non_object_rejected() {
        assert_eq!(normalize(json!(42)).unwrap_err(), NormalizationError::NotAnObject);
        assert_eq!(normalize(json!([1, 2])).unwrap_err(), NormalizationError::NotAnObject);
    }

    #[test]
    fn test_alias_spellings_collapse() {
        let msg = normalize(json!({
            "id": 17,
            "_id": "m5",
            "conversation": {"_id": "c3", "status": "active"},
            "content": "aliased"
        }))
        .unwrap();
        assert_eq!(msg.id.as_deref(), Some("m5"));
        assert_eq!(msg.conversation_id.as_deref(), Some("c3"));
    }

    #[test]
    fn test_conversation_only_is_accepted() {
        let msg = normalize(json!({"conversationId": "c4", "content": "no id yet"})).unwrap();
        assert_eq!(msg.id, None);
        assert_eq!(msg.conversation_id.as_deref(), Some("c4"));
    }

    #[test]
    fn test_embedded_sender_with_legacy_role() {
        let msg = normalize(json!({
            "_id": "m1",
            "conversation_id": "c1",
            "sender": {"_id": "p1", "id": "p1", "role": "user", "name": "Ama"},
            "content": "my results?"
        }))
        .unwrap();
        assert_eq!(msg.sender_id(), Some("p1"));
        assert_eq!(msg.sender.as_ref().map(|s| s.label()), Some("Ama"));
    }

    #[test]
    fn test_conversation_aliases_collapse() {
        let conversation = normalize_conversation(json!({
            "_id": "c1",
            "id": "c1",
            "status": "active",
            "assigned_to": {"_id": "s1", "id": "s1", "name": "Dr. One"},
            "last_message": {"content": "hi", "sender": {"id": "p1", "_id": "p1"}}
        }))
        .unwrap();
        assert_eq!(conversation.id, "c1");
        assert!(conversation.is_assigned_to("s1"));
        assert_eq!(
            conversation.last_message.and_then(|m| m.sender).map(|s| s.id().to_string()),
            Some("p1".to_string())
        );
    }

    #[test]
    fn test_conversation_without_id_rejected() {
        let err = normalize_conversation(json!({"status": "pending"})).unwrap_err();
        assert_eq!(err, NormalizationError::MissingIdentity);
    }
}
