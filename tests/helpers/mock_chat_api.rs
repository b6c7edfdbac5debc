#![allow(dead_code)]
use async_trait::async_trait;
use chrono::Utc;
use clinichat::domain::entities::{
    Conversation, ConversationStatus, Message, MessageType, PaginationMetadata, SessionContext,
    UserRef,
};
use clinichat::domain::ports::chat_api::{ChatApi, ConversationDetail};
use clinichat::{ChatError, ChatResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// One recorded REST call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    List,
    Get { id: String, page: u32 },
    Send { id: String, content: String },
    Accept(String),
    Close(String),
    SystemMessage { id: String, content: String },
    MarkRead(String),
}

type FailureFn = Arc<dyn Fn() -> ChatError + Send + Sync>;

#[derive(Default)]
struct ServerState {
    conversations: HashMap<String, Conversation>,
    /// Message pages keyed by (conversation, page)
    pages: HashMap<(String, u32), Vec<Message>>,
    calls: Vec<(String, ApiCall)>,
    failures: HashMap<&'static str, FailureFn>,
    next_id: u32,
}

/// In-memory stand-in for the chat server. Clones made with
/// [`MockChatApi::for_caller`] share state, so several coordinators can
/// race against the same conversations.
#[derive(Clone)]
pub struct MockChatApi {
    caller: SessionContext,
    server: Arc<Mutex<ServerState>>,
}

impl MockChatApi {
    pub fn new(caller: &SessionContext) -> Self {
        Self {
            caller: caller.clone(),
            server: Arc::new(Mutex::new(ServerState::default())),
        }
    }

    pub fn for_caller(&self, caller: &SessionContext) -> Self {
        Self {
            caller: caller.clone(),
            server: self.server.clone(),
        }
    }

    pub fn with_conversation(self, conversation: Conversation) -> Self {
        self.insert_conversation(conversation);
        self
    }

    pub fn insert_conversation(&self, conversation: Conversation) {
        self.server
            .lock()
            .unwrap()
            .conversations
            .insert(conversation.id.clone(), conversation);
    }

    pub fn set_page(&self, conversation_id: &str, page: u32, messages: Vec<Message>) {
        self.server
            .lock()
            .unwrap()
            .pages
            .insert((conversation_id.to_string(), page), messages);
    }

    pub fn server_conversation(&self, conversation_id: &str) -> Option<Conversation> {
        self.server
            .lock()
            .unwrap()
            .conversations
            .get(conversation_id)
            .cloned()
    }

    /// Make the named operation fail until cleared
    pub fn fail_on<F>(&self, operation: &'static str, make_error: F)
    where
        F: Fn() -> ChatError + Send + Sync + 'static,
    {
        self.server
            .lock()
            .unwrap()
            .failures
            .insert(operation, Arc::new(make_error));
    }

    /// Calls made by this caller
    pub fn calls(&self) -> Vec<ApiCall> {
        self.server
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|(caller, _)| *caller == self.caller.user_id)
            .map(|(_, call)| call.clone())
            .collect()
    }

    pub fn count_calls(&self, predicate: impl Fn(&ApiCall) -> bool) -> usize {
        self.calls().iter().filter(|c| predicate(*c)).count()
    }

    fn begin(&self, operation: &'static str, call: ApiCall) -> ChatResult<()> {
        let mut server = self.server.lock().unwrap();
        server.calls.push((self.caller.user_id.clone(), call));
        match server.failures.get(operation) {
            Some(make_error) => Err(make_error()),
            None => Ok(()),
        }
    }

    fn check_access(&self, conversation: &Conversation) -> ChatResult<()> {
        if self.caller.is_admin() {
            return Ok(());
        }
        match &conversation.assigned_to {
            Some(assignee) if !assignee.is(&self.caller.user_id) => Err(ChatError::Forbidden(
                format!("This conversation is assigned to {}", assignee.label()),
            )),
            _ => Ok(()),
        }
    }

    fn new_message(&self, conversation_id: &str, content: &str, kind: MessageType) -> Message {
        let id = {
            let mut server = self.server.lock().unwrap();
            server.next_id += 1;
            format!("srv-{}", server.next_id)
        };
        Message {
            id: Some(id),
            conversation_id: Some(conversation_id.to_string()),
            sender: Some(UserRef::Id(self.caller.user_id.clone())),
            content: content.to_string(),
            message_type: kind,
            attachment: None,
            is_read: false,
            read_at: None,
            is_deleted: false,
            reply_to: None,
            created_at: Some(Utc::now()),
            updated_at: None,
        }
    }

    fn lookup(&self, conversation_id: &str) -> ChatResult<Conversation> {
        self.server_conversation(conversation_id)
            .ok_or_else(|| ChatError::NotFound(format!("Conversation {}", conversation_id)))
    }
}

#[async_trait]
impl ChatApi for MockChatApi {
    async fn list_conversations(&self) -> ChatResult<Vec<Conversation>> {
        self.begin("list_conversations", ApiCall::List)?;
        Ok(self
            .server
            .lock()
            .unwrap()
            .conversations
            .values()
            .cloned()
            .collect())
    }

    async fn get_conversation(
        &self,
        conversation_id: &str,
        page: u32,
        limit: u32,
    ) -> ChatResult<ConversationDetail> {
        self.begin(
            "get_conversation",
            ApiCall::Get {
                id: conversation_id.to_string(),
                page,
            },
        )?;
        let conversation = self.lookup(conversation_id)?;
        let messages = self
            .server
            .lock()
            .unwrap()
            .pages
            .get(&(conversation_id.to_string(), page))
            .cloned()
            .unwrap_or_default();
        Ok(ConversationDetail {
            conversation,
            pagination: PaginationMetadata {
                page,
                limit,
                total: messages.len() as u64,
                total_pages: page,
            },
            messages,
        })
    }

    async fn send_message(&self, conversation_id: &str, content: &str) -> ChatResult<Message> {
        self.begin(
            "send_message",
            ApiCall::Send {
                id: conversation_id.to_string(),
                content: content.to_string(),
            },
        )?;
        let conversation = self.lookup(conversation_id)?;
        self.check_access(&conversation)?;
        if conversation.is_closed() {
            return Err(ChatError::ValidationError(
                "Conversation is closed".to_string(),
            ));
        }
        Ok(self.new_message(conversation_id, content, MessageType::Text))
    }

    async fn accept_conversation(&self, conversation_id: &str) -> ChatResult<()> {
        self.begin("accept_conversation", ApiCall::Accept(conversation_id.to_string()))?;
        let mut server = self.server.lock().unwrap();
        let conversation = server
            .conversations
            .get_mut(conversation_id)
            .ok_or_else(|| ChatError::NotFound(format!("Conversation {}", conversation_id)))?;
        if conversation.status != ConversationStatus::Pending || conversation.is_assigned() {
            return Err(ChatError::Conflict(
                "Conversation already accepted".to_string(),
            ));
        }
        conversation.status = ConversationStatus::Active;
        conversation.assigned_to = Some(UserRef::from(&self.caller));
        Ok(())
    }

    async fn close_conversation(&self, conversation_id: &str) -> ChatResult<()> {
        self.begin("close_conversation", ApiCall::Close(conversation_id.to_string()))?;
        let conversation = self.lookup(conversation_id)?;
        self.check_access(&conversation)?;
        let mut server = self.server.lock().unwrap();
        if let Some(conversation) = server.conversations.get_mut(conversation_id) {
            conversation.status = ConversationStatus::Closed;
            conversation.closed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn post_system_message(
        &self,
        conversation_id: &str,
        content: &str,
    ) -> ChatResult<Message> {
        self.begin(
            "post_system_message",
            ApiCall::SystemMessage {
                id: conversation_id.to_string(),
                content: content.to_string(),
            },
        )?;
        Ok(self.new_message(conversation_id, content, MessageType::System))
    }

    async fn mark_read(&self, conversation_id: &str) -> ChatResult<()> {
        self.begin("mark_read", ApiCall::MarkRead(conversation_id.to_string()))?;
        let mut server = self.server.lock().unwrap();
        if let Some(conversation) = server.conversations.get_mut(conversation_id) {
            conversation.unread_count.staff = 0;
        }
        Ok(())
    }
}
