use crate::domain::entities::user::UserRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier used for sender fields of synthetic lifecycle messages
pub const SYSTEM_SENDER: &str = "system";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    System,
    Image,
    File,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::System => "system",
            MessageType::Image => "image",
            MessageType::File => "file",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    #[serde(default, alias = "filename", alias = "name")]
    pub file_name: Option<String>,
    #[serde(default, alias = "file_size")]
    pub size: Option<u64>,
    #[serde(default, alias = "mimetype", alias = "mimeType")]
    pub mime_type: Option<String>,
}

/// Canonical chat message.
///
/// Identity fields are optional because inbound payloads are only required to
/// carry one of them; see the normalizer for the acceptance rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, rename = "_id", alias = "id")]
    pub id: Option<String>,
    #[serde(default, alias = "conversationId", alias = "conversation")]
    pub conversation_id: Option<String>,
    #[serde(default, alias = "sender_id")]
    pub sender: Option<UserRef>,
    #[serde(default)]
    pub content: String,
    #[serde(default, rename = "message_type", alias = "type")]
    pub message_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Create a synthetic lifecycle message (accept/close announcements).
    ///
    /// Local system messages get a `local-` prefixed id so they can never
    /// collide with server-assigned identifiers.
    pub fn new_system(conversation_id: &str, content: String) -> Self {
        let now = Utc::now();
        Self {
            id: Some(format!("local-{}", Uuid::new_v4())),
            conversation_id: Some(conversation_id.to_string()),
            sender: Some(UserRef::Id(SYSTEM_SENDER.to_string())),
            content,
            message_type: MessageType::System,
            attachment: None,
            is_read: true,
            read_at: None,
            is_deleted: false,
            reply_to: None,
            created_at: Some(now),
            updated_at: Some(now),
        }
    }

    /// Key used by the deduplication filter
    pub fn dedup_key(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }

    pub fn is_system(&self) -> bool {
        self.message_type == MessageType::System
    }

    /// Sender id, or `None` for system messages which carry no real identity
    pub fn sender_id(&self) -> Option<&str> {
        if self.is_system() {
            return None;
        }
        self.sender.as_ref().map(UserRef::id)
    }

    pub fn is_from(&self, user_id: &str) -> bool {
        self.sender_id() == Some(user_id)
    }

    /// Unique key for list rendering. Never use it for deduplication.
    pub fn display_key(&self) -> String {
        let stamp = self
            .created_at
            .map(|t| t.timestamp_millis())
            .unwrap_or_default();
        format!("{}-{}", self.id.as_deref().unwrap_or("pending"), stamp)
    }
}
