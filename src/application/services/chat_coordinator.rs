use crate::application::services::subscriptions::{SubscriberList, Subscription};
use crate::domain::entities::{
    Conversation, ConversationStatus, LastMessage, Message, SessionContext, UserRef,
};
use crate::domain::errors::{ChatError, ChatResult};
use crate::domain::events::{ChatNotice, ConnectionState, TransportEvent};
use crate::domain::ports::chat_api::{ChatApi, ConversationDetail};
use crate::domain::ports::realtime_transport::RealtimeTransport;
use crate::domain::ports::runtime::TaskSpawner;
use crate::domain::services::dedup_filter::DedupFilter;
use crate::domain::services::message_normalizer;
use crate::domain::services::permission_service::PermissionService;
use crate::domain::services::state_machine::{
    execute_transition, is_forward_or_same, ConversationAction, TransitionContext,
};
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

pub const DEFAULT_PAGE_SIZE: u32 = 50;

#[derive(Default)]
struct ChatState {
    conversations: HashMap<String, Conversation>,
    messages: HashMap<String, Vec<Message>>,
    dedup: DedupFilter,
    selected: Option<String>,
}

struct Inner {
    session: SessionContext,
    api: Arc<dyn ChatApi>,
    transport: Arc<dyn RealtimeTransport>,
    spawner: Arc<dyn TaskSpawner>,
    page_size: u32,
    state: Mutex<ChatState>,
    message_subscribers: SubscriberList<Message>,
    conversation_subscribers: SubscriberList<Conversation>,
    notice_subscribers: SubscriberList<ChatNotice>,
    connection_subscribers: SubscriberList<ConnectionState>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, ChatState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owns per-conversation chat state for one signed-in session and mediates
/// between the REST API, the real-time transport and UI subscribers.
#[derive(Clone)]
pub struct ChatCoordinator {
    inner: Arc<Inner>,
}

impl ChatCoordinator {
    pub fn new(
        session: SessionContext,
        api: Arc<dyn ChatApi>,
        transport: Arc<dyn RealtimeTransport>,
        spawner: Arc<dyn TaskSpawner>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                session,
                api,
                transport,
                spawner,
                page_size: DEFAULT_PAGE_SIZE,
                state: Mutex::new(ChatState::default()),
                message_subscribers: SubscriberList::new(),
                conversation_subscribers: SubscriberList::new(),
                notice_subscribers: SubscriberList::new(),
                connection_subscribers: SubscriberList::new(),
            }),
        }
    }

    /// Start consuming transport events in the background.
    ///
    /// The task only holds a weak reference, so it stops once the last
    /// coordinator handle and the transport are dropped.
    pub fn start(&self) -> JoinHandle<()> {
        let mut stream = self.inner.transport.subscribe();
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            info!("Chat coordinator listening for real-time events");
            while let Some(result) = stream.next().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                match result {
                    Ok(event) => ChatCoordinator { inner }.handle_transport_event(event),
                    Err(BroadcastStreamRecvError::Lagged(n)) => {
                        warn!("Chat coordinator lagged behind by {} real-time events", n);
                    }
                }
            }
            debug!("Real-time event stream ended, stopping chat coordinator");
        })
    }

    pub fn session(&self) -> &SessionContext {
        &self.inner.session
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.transport.state()
    }

    // ===== Subscriptions =====

    pub fn subscribe_messages<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.inner.message_subscribers.subscribe(callback)
    }

    pub fn subscribe_conversations<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Conversation) + Send + Sync + 'static,
    {
        self.inner.conversation_subscribers.subscribe(callback)
    }

    pub fn subscribe_notices<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ChatNotice) + Send + Sync + 'static,
    {
        self.inner.notice_subscribers.subscribe(callback)
    }

    pub fn subscribe_connection<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ConnectionState) + Send + Sync + 'static,
    {
        self.inner.connection_subscribers.subscribe(callback)
    }

    // ===== Local state =====

    pub fn conversation(&self, conversation_id: &str) -> Option<Conversation> {
        self.inner.state().conversations.get(conversation_id).cloned()
    }

    /// Conversations the caller may view, most recently active first
    pub fn conversations(&self) -> Vec<Conversation> {
        let mut visible: Vec<Conversation> = self
            .inner
            .state()
            .conversations
            .values()
            .filter(|c| PermissionService::can_view(c, &self.inner.session))
            .cloned()
            .collect();
        visible.sort_by(|a, b| last_activity(b).cmp(&last_activity(a)));
        visible
    }

    /// Messages of a conversation in arrival order
    pub fn messages(&self, conversation_id: &str) -> Vec<Message> {
        self.inner
            .state()
            .messages
            .get(conversation_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn selected(&self) -> Option<String> {
        self.inner.state().selected.clone()
    }

    /// Sum of the caller's unread counters over visible conversations
    pub fn unread_total(&self) -> u32 {
        let staff = self.inner.session.is_staff();
        self.conversations()
            .iter()
            .map(|c| {
                if staff {
                    c.unread_count.staff
                } else {
                    c.unread_count.user
                }
            })
            .sum()
    }

    pub fn can_send(&self, conversation_id: &str) -> bool {
        let conversation = self.conversation(conversation_id);
        PermissionService::can_send(conversation.as_ref(), &self.inner.session)
    }

    // ===== Rooms =====

    pub fn join_conversation(&self, conversation_id: &str) {
        if conversation_id.trim().is_empty() || !self.inner.transport.is_connected() {
            return;
        }
        self.inner.transport.join_room(conversation_id);
    }

    pub fn leave_conversation(&self, conversation_id: &str) {
        if conversation_id.trim().is_empty() || !self.inner.transport.is_connected() {
            return;
        }
        self.inner.transport.leave_room(conversation_id);
    }

    // ===== Operations =====

    /// Load the conversation list from the server and return the visible part
    #[tracing::instrument(skip(self))]
    pub async fn refresh_conversations(&self) -> ChatResult<Vec<Conversation>> {
        let conversations = self.inner.api.list_conversations().await?;
        {
            let mut state = self.inner.state();
            for conversation in conversations {
                state
                    .conversations
                    .insert(conversation.id.clone(), conversation);
            }
        }
        Ok(self.conversations())
    }

    /// Open a conversation: load it with its newest messages, join its room
    /// and mark it read. Permission failures clear the selection and publish
    /// an explanatory notice.
    #[tracing::instrument(skip(self))]
    pub async fn select_conversation(&self, conversation_id: &str) -> ChatResult<Conversation> {
        let detail = match self
            .inner
            .api
            .get_conversation(conversation_id, 1, self.inner.page_size)
            .await
        {
            Ok(detail) => detail,
            Err(e) => {
                if e.is_permission_denied() {
                    self.deselect();
                    self.handle_permission_denied(conversation_id, &denial_reason(&e));
                }
                return Err(e);
            }
        };

        if !PermissionService::can_view(&detail.conversation, &self.inner.session) {
            let reason = assigned_elsewhere_text(&detail.conversation);
            self.inner
                .state()
                .conversations
                .insert(detail.conversation.id.clone(), detail.conversation);
            self.deselect();
            self.handle_permission_denied(conversation_id, &reason);
            return Err(ChatError::Forbidden(reason));
        }

        let previous = {
            let mut state = self.inner.state();
            state.selected.replace(conversation_id.to_string())
        };
        if let Some(previous) = previous.filter(|p| p != conversation_id) {
            self.leave_conversation(&previous);
        }

        let conversation = self.store_detail(detail, true);
        self.join_conversation(conversation_id);

        let unread = if self.inner.session.is_staff() {
            conversation.unread_count.staff
        } else {
            conversation.unread_count.user
        };
        if unread > 0 {
            if let Err(e) = self.mark_read(conversation_id).await {
                warn!("Failed to mark conversation {} read: {}", conversation_id, e);
            }
        }

        Ok(self.conversation(conversation_id).unwrap_or(conversation))
    }

    /// Clear the selection and leave its room
    pub fn deselect(&self) {
        let previous = self.inner.state().selected.take();
        if let Some(previous) = previous {
            self.leave_conversation(&previous);
        }
    }

    /// Fetch an older page of messages and prepend the ones not seen yet.
    /// Returns the newly added messages.
    #[tracing::instrument(skip(self))]
    pub async fn load_older_messages(
        &self,
        conversation_id: &str,
        page: u32,
    ) -> ChatResult<Vec<Message>> {
        let detail = self
            .inner
            .api
            .get_conversation(conversation_id, page, self.inner.page_size)
            .await?;

        let mut state = self.inner.state();
        let ChatState {
            messages, dedup, ..
        } = &mut *state;
        let fresh: Vec<Message> = detail
            .messages
            .into_iter()
            .filter(|m| dedup.check_and_record(m))
            .collect();

        let log = messages.entry(conversation_id.to_string()).or_default();
        let newer = std::mem::replace(log, fresh.clone());
        log.extend(newer);
        Ok(fresh)
    }

    #[tracing::instrument(skip(self))]
    pub async fn mark_read(&self, conversation_id: &str) -> ChatResult<()> {
        self.inner.api.mark_read(conversation_id).await?;

        let updated = {
            let mut state = self.inner.state();
            let updated = state.conversations.get_mut(conversation_id).map(|c| {
                if self.inner.session.is_staff() {
                    c.unread_count.staff = 0;
                } else {
                    c.unread_count.user = 0;
                }
                c.clone()
            });
            if let Some(log) = state.messages.get_mut(conversation_id) {
                let now = Utc::now();
                for message in log.iter_mut().filter(|m| !m.is_read) {
                    message.is_read = true;
                    message.read_at = Some(now);
                }
            }
            updated
        };

        if let Some(conversation) = updated {
            self.inner.conversation_subscribers.notify(&conversation);
        }
        Ok(())
    }

    /// Send a message. Returns `false` without any network call when the
    /// content is blank, the conversation id is missing, or the local state
    /// already rules the send out; returns `false` on any request failure.
    #[tracing::instrument(skip(self, content))]
    pub async fn send_message(&self, conversation_id: &str, content: &str) -> bool {
        let content = content.trim();
        if conversation_id.trim().is_empty() {
            warn!("Cannot send message: no conversation selected");
            return false;
        }
        if content.is_empty() {
            warn!("Refusing to send an empty message");
            return false;
        }

        if let Some(conversation) = self.conversation(conversation_id) {
            if conversation.is_closed() {
                warn!("Cannot send to closed conversation {}", conversation_id);
                return false;
            }
            if !PermissionService::can_send(Some(&conversation), &self.inner.session) {
                warn!(
                    "Not allowed to send in conversation {} (assignee: {:?})",
                    conversation_id,
                    conversation.assignee_id()
                );
                if conversation.is_assigned() {
                    self.publish_notice(
                        ChatNotice::warning(assigned_elsewhere_text(&conversation))
                            .for_conversation(conversation_id),
                    );
                }
                return false;
            }
        }

        match self.inner.api.send_message(conversation_id, content).await {
            Ok(mut message) => {
                if message.conversation_id.is_none() {
                    message.conversation_id = Some(conversation_id.to_string());
                }
                self.deliver(message);
                true
            }
            Err(e) => {
                error!("Failed to send message to conversation {}: {}", conversation_id, e);
                if e.is_permission_denied() {
                    self.handle_permission_denied(conversation_id, &denial_reason(&e));
                }
                false
            }
        }
    }

    /// Take ownership of a pending conversation
    #[tracing::instrument(skip(self))]
    pub async fn accept_conversation(&self, conversation_id: &str) -> ChatResult<Conversation> {
        let session = &self.inner.session;
        if !session.is_staff() {
            return Err(ChatError::Forbidden(
                "Only staff can accept conversations".to_string(),
            ));
        }

        let current = self.ensure_conversation(conversation_id).await?;
        execute_transition(&TransitionContext {
            conversation_id: conversation_id.to_string(),
            from_status: current.status,
            action: ConversationAction::Accept,
            actor_id: session.user_id.clone(),
        })?;

        if let Some(assignee) = current.assigned_to.as_ref().filter(|a| !a.is(&session.user_id)) {
            return Err(ChatError::Conflict(format!(
                "Conversation is already assigned to {}",
                assignee.label()
            )));
        }

        if let Err(e) = self.inner.api.accept_conversation(conversation_id).await {
            error!("Failed to accept conversation {}: {}", conversation_id, e);
            match &e {
                ChatError::Conflict(_) => self.publish_notice(
                    ChatNotice::warning("This conversation was already accepted by another staff member")
                        .for_conversation(conversation_id),
                ),
                ChatError::Forbidden(_) => {
                    self.handle_permission_denied(conversation_id, &denial_reason(&e))
                }
                _ => {}
            }
            return Err(e);
        }

        let updated = self.update_conversation(conversation_id, current, |c| {
            c.status = ConversationStatus::Active;
            c.assigned_to = Some(UserRef::from(session));
            c.updated_at = Some(Utc::now());
        });

        info!("Conversation {} accepted by {}", conversation_id, session.user_id);
        self.announce(
            conversation_id,
            format!("{} has joined the conversation", session.label()),
        );
        self.join_conversation(conversation_id);
        Ok(updated)
    }

    /// Close an active conversation (assignee or administrator)
    #[tracing::instrument(skip(self))]
    pub async fn close_conversation(&self, conversation_id: &str) -> ChatResult<Conversation> {
        let session = &self.inner.session;
        let current = self.ensure_conversation(conversation_id).await?;

        execute_transition(&TransitionContext {
            conversation_id: conversation_id.to_string(),
            from_status: current.status,
            action: ConversationAction::Close,
            actor_id: session.user_id.clone(),
        })?;

        if !PermissionService::can_close(&current, session) {
            return Err(ChatError::Forbidden(
                "Only the assigned staff member or an administrator can close this conversation"
                    .to_string(),
            ));
        }

        if let Err(e) = self.inner.api.close_conversation(conversation_id).await {
            error!("Failed to close conversation {}: {}", conversation_id, e);
            if e.is_permission_denied() {
                self.handle_permission_denied(conversation_id, &denial_reason(&e));
            }
            return Err(e);
        }

        let now = Utc::now();
        let updated = self.update_conversation(conversation_id, current, |c| {
            c.status = ConversationStatus::Closed;
            c.closed_at = Some(now);
            c.closed_by = Some(UserRef::from(session));
            c.updated_at = Some(now);
        });

        info!("Conversation {} closed by {}", conversation_id, session.user_id);
        self.announce(
            conversation_id,
            format!("Conversation closed by {}", session.label()),
        );
        Ok(updated)
    }

    // ===== Inbound events =====

    /// Apply one transport event. Malformed payloads are logged and dropped.
    pub fn handle_transport_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::ConnectionChanged(state) => self.on_connection_changed(state),
            TransportEvent::NewMessage(payload) => match message_normalizer::normalize(payload) {
                Ok(message) => {
                    self.deliver(message);
                }
                Err(e) => warn!("Dropping malformed message payload: {}", e),
            },
            TransportEvent::ConversationUpdated(payload) => self.apply_conversation_update(payload),
        }
    }

    fn on_connection_changed(&self, state: ConnectionState) {
        self.inner.connection_subscribers.notify(&state);
        let notice = match &state {
            ConnectionState::Connected => Some(ChatNotice::info("Connected to live chat")),
            ConnectionState::Disconnected => {
                Some(ChatNotice::warning("Disconnected from live chat"))
            }
            ConnectionState::Error(reason) => Some(ChatNotice::error(format!(
                "Live chat connection error: {}",
                reason
            ))),
            ConnectionState::Connecting => None,
        };
        if let Some(notice) = notice {
            self.publish_notice(notice);
        }
    }

    fn apply_conversation_update(&self, payload: Value) {
        let payload = match payload {
            Value::String(text) => match serde_json::from_str(&text) {
                Ok(value) => value,
                Err(e) => {
                    warn!("Dropping unparseable conversation update: {}", e);
                    return;
                }
            },
            other => other,
        };
        let mut update: Conversation = match serde_json::from_value(payload) {
            Ok(update) => update,
            Err(e) => {
                warn!("Dropping malformed conversation update: {}", e);
                return;
            }
        };

        let session = &self.inner.session;
        let lost_selection = {
            let mut state = self.inner.state();
            if let Some(existing) = state.conversations.get(&update.id) {
                if !is_forward_or_same(existing.status, update.status) {
                    warn!(
                        "Ignoring update moving conversation {} from {} back to {}",
                        update.id, existing.status, update.status
                    );
                    return;
                }
                if update.last_message.is_none() {
                    update.last_message = existing.last_message.clone();
                }
            }
            state
                .conversations
                .insert(update.id.clone(), update.clone());

            let lost = state.selected.as_deref() == Some(update.id.as_str())
                && !PermissionService::can_view(&update, session);
            if lost {
                state.selected = None;
            }
            lost
        };

        self.inner.conversation_subscribers.notify(&update);
        if lost_selection {
            self.leave_conversation(&update.id);
            self.publish_notice(
                ChatNotice::warning(assigned_elsewhere_text(&update)).for_conversation(&update.id),
            );
        }
    }

    // ===== Internals =====

    /// Dedup, record and publish a message. Returns `false` for duplicates.
    fn deliver(&self, message: Message) -> bool {
        let session = &self.inner.session;
        let updated_conversation = {
            let mut state = self.inner.state();
            if !state.dedup.check_and_record(&message) {
                debug!("Dropping duplicate message {:?}", message.id);
                return false;
            }

            match message.conversation_id.clone() {
                Some(conversation_id) => {
                    let is_selected = state.selected.as_deref() == Some(conversation_id.as_str());
                    state
                        .messages
                        .entry(conversation_id.clone())
                        .or_default()
                        .push(message.clone());

                    state.conversations.get_mut(&conversation_id).map(|c| {
                        c.last_message = Some(LastMessage {
                            content: message.content.clone(),
                            sender: message.sender.clone(),
                            timestamp: message.created_at.or_else(|| Some(Utc::now())),
                        });
                        let from_other = !message.is_system() && !message.is_from(&session.user_id);
                        if from_other && !is_selected {
                            if session.is_staff() {
                                c.unread_count.staff += 1;
                            } else {
                                c.unread_count.user += 1;
                            }
                        }
                        c.clone()
                    })
                }
                None => None,
            }
        };

        self.inner.message_subscribers.notify(&message);
        if let Some(conversation) = updated_conversation {
            self.inner.conversation_subscribers.notify(&conversation);
        }
        true
    }

    /// Append a synthetic system message locally, then persist it in the
    /// background. Persistence failures are logged only.
    fn announce(&self, conversation_id: &str, content: String) {
        self.deliver(Message::new_system(conversation_id, content.clone()));

        let api = self.inner.api.clone();
        let weak = Arc::downgrade(&self.inner);
        let conversation_id = conversation_id.to_string();
        self.inner.spawner.spawn(Box::pin(async move {
            match api.post_system_message(&conversation_id, &content).await {
                Ok(persisted) => {
                    // The server broadcasts the persisted copy; it is already shown
                    if let (Some(inner), Some(key)) = (weak.upgrade(), persisted.dedup_key()) {
                        inner.state().dedup.record(key);
                    }
                }
                Err(e) => warn!(
                    "Failed to persist system message for conversation {}: {}",
                    conversation_id, e
                ),
            }
        }));
    }

    async fn ensure_conversation(&self, conversation_id: &str) -> ChatResult<Conversation> {
        if let Some(conversation) = self.conversation(conversation_id) {
            return Ok(conversation);
        }
        let detail = self
            .inner
            .api
            .get_conversation(conversation_id, 1, self.inner.page_size)
            .await?;
        Ok(self.store_detail(detail, false))
    }

    /// Store a loaded conversation and merge its message page into the log
    fn store_detail(&self, detail: ConversationDetail, notify: bool) -> Conversation {
        let conversation = detail.conversation;
        {
            let mut state = self.inner.state();
            let ChatState {
                conversations,
                messages,
                dedup,
                ..
            } = &mut *state;

            let log = messages.entry(conversation.id.clone()).or_default();
            for message in detail.messages {
                if dedup.check_and_record(&message) {
                    log.push(message);
                }
            }
            conversations.insert(conversation.id.clone(), conversation.clone());
        }
        if notify {
            self.inner.conversation_subscribers.notify(&conversation);
        }
        conversation
    }

    fn update_conversation<F>(&self, conversation_id: &str, fallback: Conversation, apply: F) -> Conversation
    where
        F: FnOnce(&mut Conversation),
    {
        let updated = {
            let mut state = self.inner.state();
            let conversation = state
                .conversations
                .entry(conversation_id.to_string())
                .or_insert(fallback);
            apply(conversation);
            conversation.clone()
        };
        self.inner.conversation_subscribers.notify(&updated);
        updated
    }

    fn handle_permission_denied(&self, conversation_id: &str, reason: &str) {
        let session = &self.inner.session;
        let (cleared, reason) = {
            let mut state = self.inner.state();
            // Prefer naming the assignee when local state already knows it
            let reason = state
                .conversations
                .get(conversation_id)
                .filter(|c| c.is_assigned() && !c.is_assigned_to(&session.user_id))
                .map(assigned_elsewhere_text)
                .unwrap_or_else(|| reason.to_string());
            let cleared = state.selected.as_deref() == Some(conversation_id);
            if cleared {
                state.selected = None;
            }
            (cleared, reason)
        };
        if cleared {
            self.leave_conversation(conversation_id);
        }
        warn!("Permission denied for conversation {}: {}", conversation_id, reason);
        self.publish_notice(ChatNotice::warning(reason).for_conversation(conversation_id));
    }

    fn publish_notice(&self, notice: ChatNotice) {
        self.inner.notice_subscribers.notify(&notice);
    }
}

fn assigned_elsewhere_text(conversation: &Conversation) -> String {
    match &conversation.assigned_to {
        Some(assignee) => format!("This conversation is assigned to {}", assignee.label()),
        None => "You no longer have access to this conversation".to_string(),
    }
}

fn denial_reason(error: &ChatError) -> String {
    match error {
        ChatError::Forbidden(message) => message.clone(),
        other => other.to_string(),
    }
}

fn last_activity(conversation: &Conversation) -> Option<chrono::DateTime<Utc>> {
    conversation
        .last_message
        .as_ref()
        .and_then(|m| m.timestamp)
        .or(conversation.updated_at)
        .or(conversation.created_at)
}
