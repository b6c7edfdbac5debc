#![allow(dead_code)]
use super::mock_chat_api::MockChatApi;
use chrono::{Duration, Utc};
use clinichat::domain::entities::{
    Conversation, ConversationStatus, Message, MessageType, Role, SessionContext, UserRef,
    UserSummary,
};
use clinichat::domain::events::ChatNotice;
use clinichat::domain::ports::runtime::TaskSpawner;
use clinichat::infrastructure::realtime::InMemoryTransport;
use clinichat::{ChatCoordinator, Subscription};
use futures::future::BoxFuture;
use std::sync::{Arc, Mutex};

pub fn consultant(id: &str, name: &str) -> SessionContext {
    SessionContext::new(id, Role::Consultant).with_name(name)
}

pub fn admin(id: &str) -> SessionContext {
    SessionContext::new(id, Role::Admin).with_name("Admin")
}

pub fn patient(id: &str) -> SessionContext {
    SessionContext::new(id, Role::Patient)
}

pub fn staff_ref(id: &str, name: &str) -> UserRef {
    UserRef::Summary(UserSummary {
        id: id.to_string(),
        name: Some(name.to_string()),
        email: None,
        role: Some(Role::Consultant),
    })
}

pub fn pending_conversation(id: &str) -> Conversation {
    Conversation::pending(id, Some(UserRef::Id("patient-1".to_string())))
}

pub fn active_conversation(id: &str, assignee: UserRef) -> Conversation {
    let mut conversation = pending_conversation(id);
    conversation.status = ConversationStatus::Active;
    conversation.assigned_to = Some(assignee);
    conversation
}

pub fn closed_conversation(id: &str, assignee: UserRef) -> Conversation {
    let mut conversation = active_conversation(id, assignee);
    conversation.status = ConversationStatus::Closed;
    conversation.closed_at = Some(Utc::now());
    conversation
}

/// A text message `minutes_ago` old
pub fn text_message(id: &str, conversation_id: &str, sender: &str, minutes_ago: i64) -> Message {
    Message {
        id: Some(id.to_string()),
        conversation_id: Some(conversation_id.to_string()),
        sender: Some(UserRef::Id(sender.to_string())),
        content: format!("message {}", id),
        message_type: MessageType::Text,
        attachment: None,
        is_read: false,
        read_at: None,
        is_deleted: false,
        reply_to: None,
        created_at: Some(Utc::now() - Duration::minutes(minutes_ago)),
        updated_at: None,
    }
}

/// Collects spawned futures so a test decides when background work runs
#[derive(Default)]
pub struct QueuedTaskSpawner {
    tasks: Mutex<Vec<BoxFuture<'static, ()>>>,
}

impl QueuedTaskSpawner {
    pub fn pending(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    pub async fn run_all(&self) {
        let tasks: Vec<_> = self.tasks.lock().unwrap().drain(..).collect();
        for task in tasks {
            task.await;
        }
    }
}

impl TaskSpawner for QueuedTaskSpawner {
    fn spawn(&self, future: BoxFuture<'static, ()>) {
        self.tasks.lock().unwrap().push(future);
    }
}

/// Records every value a subscription sees
pub struct Recorder<T> {
    seen: Arc<Mutex<Vec<T>>>,
    _subscription: Subscription,
}

impl<T: Clone> Recorder<T> {
    pub fn all(&self) -> Vec<T> {
        self.seen.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

pub fn record_messages(coordinator: &ChatCoordinator) -> Recorder<Message> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let subscription = coordinator.subscribe_messages(move |m| sink.lock().unwrap().push(m.clone()));
    Recorder {
        seen,
        _subscription: subscription,
    }
}

pub fn record_notices(coordinator: &ChatCoordinator) -> Recorder<ChatNotice> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let subscription = coordinator.subscribe_notices(move |n| sink.lock().unwrap().push(n.clone()));
    Recorder {
        seen,
        _subscription: subscription,
    }
}

pub fn record_conversations(coordinator: &ChatCoordinator) -> Recorder<Conversation> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let subscription =
        coordinator.subscribe_conversations(move |c| sink.lock().unwrap().push(c.clone()));
    Recorder {
        seen,
        _subscription: subscription,
    }
}

/// Everything a coordinator test needs, wired together
pub struct Harness {
    pub coordinator: ChatCoordinator,
    pub api: MockChatApi,
    pub transport: Arc<InMemoryTransport>,
    pub spawner: Arc<QueuedTaskSpawner>,
}

impl Harness {
    pub fn new(session: SessionContext, api: MockChatApi) -> Self {
        Self::with_transport(session, api, InMemoryTransport::connected())
    }

    pub fn with_transport(
        session: SessionContext,
        api: MockChatApi,
        transport: InMemoryTransport,
    ) -> Self {
        let transport = Arc::new(transport);
        let spawner = Arc::new(QueuedTaskSpawner::default());
        let coordinator = ChatCoordinator::new(
            session,
            Arc::new(api.clone()),
            transport.clone(),
            spawner.clone(),
        );
        Self {
            coordinator,
            api,
            transport,
            spawner,
        }
    }
}
