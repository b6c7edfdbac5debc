use crate::domain::events::{ConnectionState, TransportEvent};
use crate::domain::ports::event_bus::{EventBus, EventStream};
use crate::domain::ports::realtime_transport::RealtimeTransport;
use crate::domain::ports::runtime::TimeService;
use crate::infrastructure::realtime::frame::{self, Inbound, RoomSignal};
use crate::shared::events::LocalEventBus;
use futures::{SinkExt, StreamExt};
use http::header::{HeaderValue, AUTHORIZATION};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("Invalid auth header: {0}")]
    InvalidHeader(String),
}

#[derive(Debug, Clone)]
pub struct SocketTransportConfig {
    pub url: String,
    /// Bearer credential for the handshake; `None` disables the channel
    pub token: Option<String>,
    pub max_reconnect_attempts: u32,
    pub reconnect_delay: Duration,
    pub event_capacity: usize,
}

/// State shared between the public handle and the connection task
struct Shared {
    state: RwLock<ConnectionState>,
    rooms: Mutex<HashSet<String>>,
    bus: LocalEventBus,
}

impl Shared {
    fn state(&self) -> ConnectionState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_state(&self, next: ConnectionState) {
        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            if *state == next {
                return;
            }
            *state = next.clone();
        }
        info!("Real-time channel {}", next);
        self.bus.publish(TransportEvent::ConnectionChanged(next));
    }

    fn rooms(&self) -> Vec<String> {
        self.rooms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

enum SessionEnd {
    Shutdown,
    Dropped(String),
}

/// WebSocket transport with bounded, fixed-delay reconnection
pub struct SocketTransport {
    config: SocketTransportConfig,
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<RoomSignal>,
    command_rx: Mutex<Option<mpsc::UnboundedReceiver<RoomSignal>>>,
    cancel: CancellationToken,
}

impl SocketTransport {
    pub fn new(config: SocketTransportConfig) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            state: RwLock::new(ConnectionState::Disconnected),
            rooms: Mutex::new(HashSet::new()),
            bus: LocalEventBus::new(config.event_capacity),
        });
        Self {
            config,
            shared,
            commands,
            command_rx: Mutex::new(Some(command_rx)),
            cancel: CancellationToken::new(),
        }
    }

    /// Start the connection task. Returns `None` when there is no token
    /// (real-time disabled) or when the task was already started.
    pub fn start(&self, time: Arc<dyn TimeService>) -> Option<JoinHandle<()>> {
        if self.config.token.is_none() {
            warn!("No auth token configured; real-time chat updates are disabled");
            return None;
        }

        let Some(commands) = self
            .command_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            warn!("Real-time channel already started");
            return None;
        };

        let config = self.config.clone();
        let shared = self.shared.clone();
        let cancel = self.cancel.clone();
        Some(tokio::spawn(async move {
            run(config, shared, commands, time, cancel).await;
        }))
    }

    fn signal(&self, signal: RoomSignal) {
        if !self.is_connected() {
            warn!(
                "Real-time channel not connected; dropping {:?}",
                signal
            );
            return;
        }

        {
            let mut rooms = self.shared.rooms.lock().unwrap_or_else(PoisonError::into_inner);
            match &signal {
                RoomSignal::Join(id) => rooms.insert(id.clone()),
                RoomSignal::Leave(id) => rooms.remove(id),
            };
        }

        if let Err(e) = self.commands.send(signal) {
            warn!("Real-time connection task is gone: {}", e);
        }
    }
}

impl RealtimeTransport for SocketTransport {
    fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    fn join_room(&self, conversation_id: &str) {
        self.signal(RoomSignal::Join(conversation_id.to_string()));
    }

    fn leave_room(&self, conversation_id: &str) {
        self.signal(RoomSignal::Leave(conversation_id.to_string()));
    }

    fn subscribe(&self) -> EventStream {
        self.shared.bus.subscribe()
    }

    fn shutdown(&self) {
        info!("Shutting down real-time channel");
        self.cancel.cancel();
    }
}

async fn run(
    config: SocketTransportConfig,
    shared: Arc<Shared>,
    mut commands: mpsc::UnboundedReceiver<RoomSignal>,
    time: Arc<dyn TimeService>,
    cancel: CancellationToken,
) {
    let mut attempt = 0u32;

    loop {
        if cancel.is_cancelled() {
            break;
        }

        shared.set_state(ConnectionState::Connecting);
        match connect(&config).await {
            Ok(stream) => {
                attempt = 0;
                shared.set_state(ConnectionState::Connected);
                match session(stream, &shared, &mut commands, &cancel).await {
                    SessionEnd::Shutdown => break,
                    SessionEnd::Dropped(reason) => {
                        warn!("Real-time connection dropped: {}", reason);
                        shared.set_state(ConnectionState::Disconnected);
                    }
                }
            }
            Err(e) => {
                error!("Real-time connection error: {}", e);
                shared.set_state(ConnectionState::Error(e.to_string()));
            }
        }

        attempt += 1;
        if attempt > config.max_reconnect_attempts {
            error!(
                "Giving up on real-time channel after {} reconnect attempts",
                config.max_reconnect_attempts
            );
            break;
        }

        warn!(
            "Reconnecting real-time channel in {:?} (attempt {}/{})",
            config.reconnect_delay, attempt, config.max_reconnect_attempts
        );
        tokio::select! {
            _ = time.sleep(config.reconnect_delay) => {}
            _ = cancel.cancelled() => break,
        }
    }

    shared.set_state(ConnectionState::Disconnected);
}

async fn connect(config: &SocketTransportConfig) -> Result<WsStream, TransportError> {
    let mut request = config.url.as_str().into_client_request()?;
    if let Some(token) = &config.token {
        let value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| TransportError::InvalidHeader(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }

    debug!("Connecting to real-time channel at {}", config.url);
    let (stream, response) = tokio_tungstenite::connect_async(request).await?;
    info!(
        "Connected to real-time channel (status: {})",
        response.status()
    );
    Ok(stream)
}

async fn session(
    stream: WsStream,
    shared: &Shared,
    commands: &mut mpsc::UnboundedReceiver<RoomSignal>,
    cancel: &CancellationToken,
) -> SessionEnd {
    let (mut write, mut read) = stream.split();

    // Signals queued while we were down are stale; the room set is authoritative
    while commands.try_recv().is_ok() {}
    for room in shared.rooms() {
        debug!("Re-joining conversation {}", room);
        let text = RoomSignal::Join(room).encode();
        if let Err(e) = write.send(WsMessage::text(text)).await {
            return SessionEnd::Dropped(e.to_string());
        }
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = write.send(WsMessage::Close(None)).await;
                return SessionEnd::Shutdown;
            }
            command = commands.recv() => {
                let Some(signal) = command else {
                    return SessionEnd::Shutdown;
                };
                debug!("Sending {:?}", signal);
                if let Err(e) = write.send(WsMessage::text(signal.encode())).await {
                    return SessionEnd::Dropped(e.to_string());
                }
            }
            frame = read.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => handle_text(text.as_str(), shared),
                Some(Ok(WsMessage::Ping(data))) => {
                    if let Err(e) = write.send(WsMessage::Pong(data)).await {
                        error!("Failed to send WebSocket pong: {}", e);
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    return SessionEnd::Dropped("closed by server".to_string());
                }
                Some(Err(e)) => return SessionEnd::Dropped(e.to_string()),
                Some(Ok(_)) => {}
            }
        }
    }
}

fn handle_text(text: &str, shared: &Shared) {
    match frame::parse_inbound(text) {
        Ok(Inbound::Event(event)) => shared.bus.publish(event),
        // Application-level errors do not tear the socket down
        Ok(Inbound::ServerError(message)) => {
            error!("Real-time channel reported an error: {}", message);
        }
        Ok(Inbound::Unknown(event)) => debug!("Ignoring real-time event {}", event),
        Err(e) => warn!("Dropping unparseable real-time frame: {}", e),
    }
}
