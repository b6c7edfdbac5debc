use crate::domain::entities::user::UserRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Pending,
    Active,
    Closed,
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationStatus::Pending => write!(f, "pending"),
            ConversationStatus::Active => write!(f, "active"),
            ConversationStatus::Closed => write!(f, "closed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationPriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

/// Denormalized summary of the newest message, kept for list rendering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastMessage {
    pub content: String,
    #[serde(default, alias = "sender_id", skip_serializing_if = "Option::is_none")]
    pub sender: Option<UserRef>,
    #[serde(default, alias = "created_at", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Unread counters per audience
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UnreadCount {
    #[serde(default)]
    pub user: u32,
    #[serde(default, alias = "admin", alias = "consultant")]
    pub staff: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    /// End-user side of the thread; may be an unresolved identifier
    #[serde(default, alias = "user_id", skip_serializing_if = "Option::is_none")]
    pub user: Option<UserRef>,
    #[serde(default, alias = "assignee")]
    pub assigned_to: Option<UserRef>,
    pub status: ConversationStatus,
    #[serde(default)]
    pub priority: ConversationPriority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<LastMessage>,
    #[serde(default)]
    pub unread_count: UnreadCount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_by: Option<UserRef>,
}

impl Conversation {
    /// A fresh pending conversation, as the intake flow creates it
    pub fn pending(id: impl Into<String>, user: Option<UserRef>) -> Self {
        Self {
            id: id.into(),
            user,
            assigned_to: None,
            status: ConversationStatus::Pending,
            priority: ConversationPriority::Normal,
            category: None,
            tags: Vec::new(),
            last_message: None,
            unread_count: UnreadCount::default(),
            created_at: Some(Utc::now()),
            updated_at: None,
            closed_at: None,
            closed_by: None,
        }
    }

    pub fn assignee_id(&self) -> Option<&str> {
        self.assigned_to.as_ref().map(UserRef::id)
    }

    pub fn is_assigned(&self) -> bool {
        self.assigned_to.is_some()
    }

    pub fn is_assigned_to(&self, user_id: &str) -> bool {
        self.assignee_id() == Some(user_id)
    }

    pub fn is_closed(&self) -> bool {
        self.status == ConversationStatus::Closed
    }

    pub fn participant_label(&self) -> &str {
        self.user.as_ref().map(UserRef::label).unwrap_or("anonymous")
    }
}

/// Pagination block returned with a message page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PaginationMetadata {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub total: u64,
    #[serde(default, alias = "pages")]
    pub total_pages: u32,
}

impl PaginationMetadata {
    pub fn has_more(&self) -> bool {
        self.page < self.total_pages
    }
}
