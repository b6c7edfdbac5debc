use crate::domain::entities::{Conversation, Message, PaginationMetadata};
use crate::domain::errors::{ChatError, ChatResult};
use crate::domain::ports::chat_api::{ChatApi, ConversationDetail};
use crate::domain::services::message_normalizer;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Url};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Longest response body excerpt kept in error messages
const MAX_ERROR_BODY: usize = 500;

/// reqwest-backed client for the chat REST endpoints
pub struct HttpChatApi {
    base_url: Url,
    token: Option<String>,
    http_client: Client,
}

impl HttpChatApi {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> ChatResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ChatError::ValidationError(format!("Invalid API URL {}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ChatError::ValidationError(format!(
                "API URL cannot be used as a base: {}",
                base_url
            )));
        }

        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChatError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url,
            token,
            http_client,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> ChatResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ChatError::Internal(format!("Invalid API base URL: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn conversation_endpoint(&self, conversation_id: &str, action: Option<&str>) -> ChatResult<Url> {
        match action {
            Some(action) => self.endpoint(&["chat", "conversations", conversation_id, action]),
            None => self.endpoint(&["chat", "conversations", conversation_id]),
        }
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.http_client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send a request and return the response payload with any
    /// `{success, data}` wrapper removed
    async fn execute(&self, builder: RequestBuilder) -> ChatResult<Value> {
        let response = builder.send().await.map_err(|e| {
            let error_msg = if e.is_timeout() {
                format!("Request timed out: {}", e)
            } else if e.is_connect() {
                format!("Connection failed: {}", e)
            } else {
                format!("Network error: {}", e)
            };
            warn!("{}", error_msg);
            ChatError::Transport(error_msg)
        })?;

        let status = response.status();
        let url = response.url().clone();
        let body = response
            .text()
            .await
            .map_err(|e| ChatError::Transport(format!("Failed to read response body: {}", e)))?;

        debug!("{} returned status {}", url, status.as_u16());

        if !status.is_success() {
            let err = status_error(status.as_u16(), &body);
            error!("Chat API request to {} failed: {}", url, err);
            return Err(err);
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        let value: Value = serde_json::from_str(&body)?;
        Ok(unwrap_data(value))
    }

    fn decode_message(value: Value) -> ChatResult<Message> {
        message_normalizer::normalize(value).map_err(|e| ChatError::Decode(e.to_string()))
    }

    fn decode_conversation(value: Value) -> ChatResult<Conversation> {
        message_normalizer::normalize_conversation(value)
            .map_err(|e| ChatError::Decode(e.to_string()))
    }
}

fn into_items(value: Value, what: &str) -> ChatResult<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        other => Err(ChatError::Decode(format!(
            "Expected a list of {}, got {}",
            what, other
        ))),
    }
}

/// Decode each entry on its own; one bad record must not sink the page
fn decode_each<T>(
    items: Vec<Value>,
    what: &str,
    decode: impl Fn(Value) -> ChatResult<T>,
) -> Vec<T> {
    items
        .into_iter()
        .filter_map(|item| match decode(item) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!("Skipping undecodable {}: {}", what, e);
                None
            }
        })
        .collect()
}

fn unwrap_data(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn status_error(status: u16, body: &str) -> ChatError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            ["message", "error"]
                .iter()
                .find_map(|key| v.get(*key).and_then(Value::as_str).map(str::to_string))
        })
        .unwrap_or_else(|| body.chars().take(MAX_ERROR_BODY).collect());

    match status {
        401 => ChatError::Unauthorized,
        403 => ChatError::Forbidden(message),
        404 => ChatError::NotFound(message),
        409 => ChatError::Conflict(message),
        400 | 422 => ChatError::ValidationError(message),
        _ => ChatError::Http { status, message },
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn list_conversations(&self) -> ChatResult<Vec<Conversation>> {
        let url = self.endpoint(&["chat", "conversations"])?;
        let value = self.execute(self.request(Method::GET, url)).await?;

        let list = match value {
            Value::Object(mut map) if map.contains_key("conversations") => {
                map.remove("conversations").unwrap_or(Value::Null)
            }
            other => other,
        };
        let items = into_items(list, "conversations")?;
        Ok(decode_each(items, "conversation", Self::decode_conversation))
    }

    async fn get_conversation(
        &self,
        conversation_id: &str,
        page: u32,
        limit: u32,
    ) -> ChatResult<ConversationDetail> {
        let url = self.conversation_endpoint(conversation_id, None)?;
        let builder = self
            .request(Method::GET, url)
            .query(&[("page", page), ("limit", limit)]);
        let Value::Object(mut detail) = self.execute(builder).await? else {
            return Err(ChatError::Decode(
                "Conversation detail is not an object".to_string(),
            ));
        };

        let conversation = detail
            .remove("conversation")
            .ok_or_else(|| ChatError::Decode("Conversation detail has no conversation".to_string()))
            .and_then(Self::decode_conversation)?;
        let messages = into_items(detail.remove("messages").unwrap_or(Value::Null), "messages")?;
        let pagination = match detail.remove("pagination") {
            Some(Value::Null) | None => PaginationMetadata::default(),
            Some(value) => serde_json::from_value(value)?,
        };

        Ok(ConversationDetail {
            conversation,
            messages: decode_each(messages, "message", Self::decode_message),
            pagination,
        })
    }

    async fn send_message(&self, conversation_id: &str, content: &str) -> ChatResult<Message> {
        let url = self.conversation_endpoint(conversation_id, Some("messages"))?;
        let builder = self
            .request(Method::POST, url)
            .json(&json!({ "content": content }));
        let value = self.execute(builder).await?;
        Self::decode_message(value)
    }

    async fn accept_conversation(&self, conversation_id: &str) -> ChatResult<()> {
        let url = self.conversation_endpoint(conversation_id, Some("accept"))?;
        self.execute(self.request(Method::POST, url)).await?;
        Ok(())
    }

    async fn close_conversation(&self, conversation_id: &str) -> ChatResult<()> {
        let url = self.conversation_endpoint(conversation_id, Some("close"))?;
        self.execute(self.request(Method::PUT, url)).await?;
        Ok(())
    }

    async fn post_system_message(
        &self,
        conversation_id: &str,
        content: &str,
    ) -> ChatResult<Message> {
        let url = self.conversation_endpoint(conversation_id, Some("system-message"))?;
        let builder = self
            .request(Method::POST, url)
            .json(&json!({ "content": content }));
        let value = self.execute(builder).await?;
        Self::decode_message(value)
    }

    async fn mark_read(&self, conversation_id: &str) -> ChatResult<()> {
        let url = self.conversation_endpoint(conversation_id, Some("read"))?;
        self.execute(self.request(Method::PUT, url)).await?;
        Ok(())
    }
}
