//! Stored record shape and the validated decode step.
//!
//! Every record read from the backend goes through [`decode_record`]; anything that does not
//! match the shape below is rejected so it never reaches an engine.

use chat_core::{Deletion, Message, MessageDraft};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::backend::server_timestamp;
use crate::error::StreamError;

/// A message as stored under `messages/<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecord {
    pub author_id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub body: String,
    pub sent_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_by: Option<String>,
}

/// Parses one backend record into a [`Message`].
///
/// A record marked deleted must carry both `deletedAt` and `deletedBy`. Audit fields on a record
/// that is not marked deleted are ignored.
pub fn decode_record(id: &str, value: &Value) -> Result<Message, StreamError> {
    let malformed = |reason: String| StreamError::Decode {
        id: id.to_string(),
        reason,
    };

    let record: StoredRecord =
        serde_json::from_value(value.clone()).map_err(|e| malformed(e.to_string()))?;

    if record.author_id.trim().is_empty() {
        return Err(malformed("authorId is empty".to_string()));
    }
    if record.display_name.trim().is_empty() {
        return Err(malformed("displayName is empty".to_string()));
    }
    if record.body.trim().is_empty() {
        return Err(malformed("body is empty".to_string()));
    }

    let deletion = match (record.deleted, record.deleted_at, record.deleted_by) {
        (Some(true), Some(deleted_at), Some(deleted_by)) => Some(Deletion {
            deleted_at,
            deleted_by,
        }),
        (Some(true), _, _) => {
            return Err(malformed(
                "deleted record is missing deletedAt or deletedBy".to_string(),
            ))
        }
        _ => None,
    };

    Ok(Message {
        id: id.to_string(),
        author_id: record.author_id,
        display_name: record.display_name,
        avatar_url: record.avatar_url,
        body: record.body,
        sent_at: record.sent_at,
        deletion,
    })
}

/// Builds the value pushed for a new message. `sentAt` is left to the backend clock.
pub fn encode_draft(draft: &MessageDraft) -> Value {
    let mut record = Map::new();
    record.insert("authorId".to_string(), Value::from(draft.author_id.as_str()));
    record.insert(
        "displayName".to_string(),
        Value::from(draft.display_name.as_str()),
    );
    if let Some(avatar_url) = &draft.avatar_url {
        record.insert("avatarUrl".to_string(), Value::from(avatar_url.as_str()));
    }
    record.insert("body".to_string(), Value::from(draft.body.as_str()));
    record.insert("sentAt".to_string(), server_timestamp());
    record.insert("deleted".to_string(), Value::Bool(false));
    Value::Object(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_core::Identity;
    use serde_json::json;

    #[test]
    fn test_decode_live_record() {
        let value = json!({
            "authorId": "u1",
            "displayName": "Alice",
            "body": "hi",
            "sentAt": 1000,
            "deleted": false
        });
        let message = decode_record("m1", &value).unwrap();
        assert_eq!(message.id, "m1");
        assert_eq!(message.author_id, "u1");
        assert_eq!(message.sent_at, 1000);
        assert!(!message.is_deleted());
    }

    #[test]
    fn test_decode_deleted_record() {
        let value = json!({
            "authorId": "u1",
            "displayName": "Alice",
            "avatarUrl": "a.png",
            "body": "hi",
            "sentAt": 1000,
            "deleted": true,
            "deletedAt": 2000,
            "deletedBy": "Mod1"
        });
        let message = decode_record("m1", &value).unwrap();
        assert_eq!(message.deleted_at(), Some(2000));
        assert_eq!(message.deleted_by(), Some("Mod1"));
        assert_eq!(message.avatar_url.as_deref(), Some("a.png"));
    }

    #[test]
    fn test_decode_missing_deleted_flag_means_live() {
        let value = json!({
            "authorId": "u1",
            "displayName": "Alice",
            "body": "hi",
            "sentAt": 1000,
            "deletedBy": "stray"
        });
        assert!(!decode_record("m1", &value).unwrap().is_deleted());
    }

    #[test]
    fn test_decode_rejects_malformed() {
        let partial = json!({ "deleted": true, "deletedAt": 5, "deletedBy": "Mod1" });
        assert!(matches!(
            decode_record("m1", &partial),
            Err(StreamError::Decode { .. })
        ));

        let wrong_type = json!({
            "authorId": "u1",
            "displayName": "Alice",
            "body": 42,
            "sentAt": 1000
        });
        assert!(decode_record("m2", &wrong_type).is_err());

        let no_audit = json!({
            "authorId": "u1",
            "displayName": "Alice",
            "body": "hi",
            "sentAt": 1000,
            "deleted": true
        });
        assert!(decode_record("m3", &no_audit).is_err());

        assert!(decode_record("m4", &json!("just a string")).is_err());
    }

    #[test]
    fn test_decode_rejects_blank_display_name() {
        let value = json!({
            "authorId": "u1",
            "displayName": "  ",
            "body": "hi",
            "sentAt": 1000
        });
        match decode_record("m1", &value) {
            Err(StreamError::Decode { id, reason }) => {
                assert_eq!(id, "m1");
                assert!(reason.contains("displayName"));
            }
            other => panic!("expected decode error, got {:?}", other),
        }
    }

    #[test]
    fn test_encode_draft_uses_server_timestamp() {
        let draft = MessageDraft::new(" hi ", &Identity::new("u1", "Alice")).unwrap();
        let value = encode_draft(&draft);
        assert_eq!(value["body"], json!("hi"));
        assert_eq!(value["authorId"], json!("u1"));
        assert_eq!(value["sentAt"], server_timestamp());
        assert_eq!(value["deleted"], json!(false));
        assert!(value.get("avatarUrl").is_none());
    }
}
