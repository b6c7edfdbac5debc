use crate::domain::events::TransportEvent;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const EVENT_NEW_MESSAGE: &str = "new_message";
pub const EVENT_CONVERSATION_UPDATE: &str = "conversation_update";
pub const EVENT_ERROR: &str = "error";
pub const EVENT_JOIN: &str = "join_conversation";
pub const EVENT_LEAVE: &str = "leave_conversation";

/// One text frame on the real-time channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

/// Room membership signal sent to the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomSignal {
    Join(String),
    Leave(String),
}

impl RoomSignal {
    pub fn conversation_id(&self) -> &str {
        match self {
            RoomSignal::Join(id) | RoomSignal::Leave(id) => id,
        }
    }

    pub fn to_frame(&self) -> Frame {
        let event = match self {
            RoomSignal::Join(_) => EVENT_JOIN,
            RoomSignal::Leave(_) => EVENT_LEAVE,
        };
        Frame {
            event: event.to_string(),
            data: json!({ "conversation_id": self.conversation_id() }),
        }
    }

    pub fn encode(&self) -> String {
        // Frame only holds a string and a json Value, so this cannot fail
        serde_json::to_string(&self.to_frame()).unwrap_or_default()
    }
}

/// What an inbound frame turned out to be
#[derive(Debug, Clone)]
pub enum Inbound {
    Event(TransportEvent),
    ServerError(String),
    Unknown(String),
}

pub fn parse_inbound(text: &str) -> Result<Inbound, serde_json::Error> {
    let frame: Frame = serde_json::from_str(text)?;
    let inbound = match frame.event.as_str() {
        EVENT_NEW_MESSAGE => Inbound::Event(TransportEvent::NewMessage(frame.data)),
        EVENT_CONVERSATION_UPDATE => Inbound::Event(TransportEvent::ConversationUpdated(frame.data)),
        EVENT_ERROR => Inbound::ServerError(match frame.data {
            Value::String(s) => s,
            other => other.to_string(),
        }),
        _ => Inbound::Unknown(frame.event),
    };
    Ok(inbound)
}
