use serde_json::Value;
use std::fmt;

/// Connection state of the real-time channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Handshake or socket failure; the adapter may still be retrying
    Error(String),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Error(reason) => write!(f, "error: {}", reason),
        }
    }
}

/// Raw events produced by a transport adapter. Payloads are left untouched;
/// interpreting them is the normalizer's job.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    ConnectionChanged(ConnectionState),
    NewMessage(Value),
    ConversationUpdated(Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A user-facing notification (connection status, permission problems)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatNotice {
    pub level: NoticeLevel,
    pub text: String,
    pub conversation_id: Option<String>,
}

impl ChatNotice {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            text: text.into(),
            conversation_id: None,
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            text: text.into(),
            conversation_id: None,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            text: text.into(),
            conversation_id: None,
        }
    }

    pub fn for_conversation(mut self, conversation_id: &str) -> Self {
        self.conversation_id = Some(conversation_id.to_string());
        self
    }
}
