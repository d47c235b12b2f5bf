//! Domain events carried on the stream and their persisted form
//!
//! A `ChatEvent` is encoded onto the stream as ordered field/value pairs and
//! decoded back by name. The canonical field order written by the producer is
//! `user_id, content, role`; decoding validates that every required field is
//! present instead of trusting positions.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Field name carrying the user identifier
pub const FIELD_USER_ID: &str = "user_id";
/// Field name carrying the message text
pub const FIELD_CONTENT: &str = "content";
/// Field name carrying the message role
pub const FIELD_ROLE: &str = "role";

/// Identifier of the user a message belongs to
///
/// Wrapper around the external identity system's id string. Must be
/// non-empty; no further structure is assumed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Create a UserId, rejecting empty strings
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(Error::Decode("user id must not be empty".to_string()));
        }
        Ok(Self(id))
    }

    /// The raw id string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who produced a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Message written by the end user
    User,
    /// Message produced by the assistant
    Assistant,
}

impl MessageRole {
    /// Wire representation of the role
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }

    /// Parse the wire representation
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(MessageRole::User),
            "assistant" => Some(MessageRole::Assistant),
            _ => None,
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One chat turn, as carried on the stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEvent {
    /// User the message belongs to
    pub user_id: UserId,
    /// Message text
    pub content: String,
    /// Who produced the message
    pub role: MessageRole,
}

impl ChatEvent {
    /// Construct an event
    pub fn new(user_id: UserId, content: impl Into<String>, role: MessageRole) -> Self {
        Self {
            user_id,
            content: content.into(),
            role,
        }
    }

    /// Encode the event as the canonical ordered field list
    ///
    /// Field order is `user_id, content, role`. Decoding does not depend on
    /// this order, but keeping it stable keeps the wire layout predictable.
    pub fn to_fields(&self) -> Vec<(String, String)> {
        vec![
            (FIELD_USER_ID.to_string(), self.user_id.as_str().to_string()),
            (FIELD_CONTENT.to_string(), self.content.clone()),
            (FIELD_ROLE.to_string(), self.role.as_str().to_string()),
        ]
    }

    /// Decode an event from entry fields, by name
    ///
    /// Every required field must be present and well-formed; a missing or
    /// malformed field yields `Error::Decode` naming the offender.
    pub fn from_fields(fields: &[(String, String)]) -> Result<Self> {
        let lookup = |name: &str| {
            fields
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.as_str())
                .ok_or_else(|| Error::Decode(format!("missing field {:?}", name)))
        };

        let user_id = UserId::new(lookup(FIELD_USER_ID)?)?;
        let content = lookup(FIELD_CONTENT)?.to_string();
        let role_str = lookup(FIELD_ROLE)?;
        let role = MessageRole::parse(role_str)
            .ok_or_else(|| Error::Decode(format!("unknown role {:?}", role_str)))?;

        Ok(Self {
            user_id,
            content,
            role,
        })
    }
}

/// Persisted form of a chat event
///
/// Owned exclusively by the persistence sink once written; never mutated
/// afterward. `created_at` is assigned by the store, not the producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Store-assigned record identifier
    pub id: Uuid,
    /// User the message belongs to
    pub user_id: UserId,
    /// Message text
    pub content: String,
    /// Who produced the message
    pub role: MessageRole,
    /// Store-assigned creation timestamp
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> ChatEvent {
        ChatEvent::new(
            UserId::new("u1").unwrap(),
            "hello",
            MessageRole::User,
        )
    }

    #[test]
    fn test_user_id_rejects_empty() {
        assert!(UserId::new("").is_err());
        assert!(UserId::new("u1").is_ok());
    }

    #[test]
    fn test_role_wire_forms() {
        assert_eq!(MessageRole::User.as_str(), "user");
        assert_eq!(MessageRole::Assistant.as_str(), "assistant");
        assert_eq!(MessageRole::parse("assistant"), Some(MessageRole::Assistant));
        assert_eq!(MessageRole::parse("system"), None);
    }

    #[test]
    fn test_to_fields_canonical_order() {
        let fields = event().to_fields();
        assert_eq!(
            fields,
            vec![
                ("user_id".to_string(), "u1".to_string()),
                ("content".to_string(), "hello".to_string()),
                ("role".to_string(), "user".to_string()),
            ]
        );
    }

    #[test]
    fn test_decode_roundtrip() {
        let ev = event();
        let decoded = ChatEvent::from_fields(&ev.to_fields()).unwrap();
        assert_eq!(decoded, ev);
    }

    #[test]
    fn test_decode_is_order_independent() {
        let mut fields = event().to_fields();
        fields.reverse();
        let decoded = ChatEvent::from_fields(&fields).unwrap();
        assert_eq!(decoded, event());
    }

    #[test]
    fn test_decode_missing_field() {
        let fields = vec![
            ("user_id".to_string(), "u1".to_string()),
            ("role".to_string(), "user".to_string()),
        ];
        let err = ChatEvent::from_fields(&fields).unwrap_err();
        assert!(err.to_string().contains("content"));
    }

    #[test]
    fn test_decode_bad_role() {
        let fields = vec![
            ("user_id".to_string(), "u1".to_string()),
            ("content".to_string(), "hi".to_string()),
            ("role".to_string(), "robot".to_string()),
        ];
        let err = ChatEvent::from_fields(&fields).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn test_role_serde_lowercase() {
        let json = serde_json::to_string(&MessageRole::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
    }

    #[test]
    fn test_record_serde_roundtrip() {
        let record = MessageRecord {
            id: Uuid::new_v4(),
            user_id: UserId::new("u1").unwrap(),
            content: "hello".to_string(),
            role: MessageRole::Assistant,
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&record).unwrap();
        let restored: MessageRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, restored);
    }
}
