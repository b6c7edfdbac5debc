use crate::domain::entities::{Conversation, Message, PaginationMetadata};
use crate::domain::errors::ChatResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A conversation with one page of its messages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationDetail {
    pub conversation: Conversation,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub pagination: PaginationMetadata,
}

/// The chat REST surface of the clinic server
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn list_conversations(&self) -> ChatResult<Vec<Conversation>>;

    async fn get_conversation(
        &self,
        conversation_id: &str,
        page: u32,
        limit: u32,
    ) -> ChatResult<ConversationDetail>;

    async fn send_message(&self, conversation_id: &str, content: &str) -> ChatResult<Message>;

    async fn accept_conversation(&self, conversation_id: &str) -> ChatResult<()>;

    async fn close_conversation(&self, conversation_id: &str) -> ChatResult<()>;

    async fn post_system_message(&self, conversation_id: &str, content: &str)
        -> ChatResult<Message>;

    async fn mark_read(&self, conversation_id: &str) -> ChatResult<()>;
}
