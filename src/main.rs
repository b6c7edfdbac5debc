use anyhow::Context;
use clinichat::config::Config;
use clinichat::domain::entities::Conversation;
use clinichat::domain::events::NoticeLevel;
use clinichat::domain::ports::realtime_transport::RealtimeTransport;
use clinichat::infrastructure::http::HttpChatApi;
use clinichat::infrastructure::observability;
use clinichat::infrastructure::realtime::{SocketTransport, SocketTransportConfig};
use clinichat::infrastructure::runtime::{TokioTaskSpawner, TokioTimeService};
use clinichat::ChatCoordinator;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "commands: list | open <id> | send <id> <text> | accept <id> | close <id> | leave <id> | quit";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init().map_err(|e| anyhow::anyhow!(e))?;

    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded for user {}", config.user_id);

    let api = HttpChatApi::new(&config.api_url, config.auth_token.clone(), config.http_timeout())
        .context("Failed to create chat API client")?;

    let transport = Arc::new(SocketTransport::new(SocketTransportConfig {
        url: config.socket_url.clone(),
        token: config.auth_token.clone(),
        max_reconnect_attempts: config.reconnect_attempts,
        reconnect_delay: config.reconnect_delay(),
        event_capacity: config.event_capacity,
    }));

    let coordinator = ChatCoordinator::new(
        config.session(),
        Arc::new(api),
        transport.clone(),
        Arc::new(TokioTaskSpawner::new()),
    );
    let pump = coordinator.start();
    let connection = transport.start(Arc::new(TokioTimeService::new()));

    coordinator
        .subscribe_messages(|message| {
            let sender = message
                .sender
                .as_ref()
                .map(|s| s.label().to_string())
                .unwrap_or_else(|| "system".to_string());
            println!(
                "[{}] {}: {}",
                message.conversation_id.as_deref().unwrap_or("?"),
                sender,
                message.content
            );
        })
        .detach();
    coordinator
        .subscribe_notices(|notice| {
            let tag = match notice.level {
                NoticeLevel::Info => "info",
                NoticeLevel::Warning => "warn",
                NoticeLevel::Error => "error",
            };
            println!("({}) {}", tag, notice.text);
        })
        .detach();

    match coordinator.refresh_conversations().await {
        Ok(conversations) => print_conversations(&conversations),
        Err(e) => tracing::error!("Failed to load conversations: {}", e),
    }
    println!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();

        match command {
            "" => continue,
            "quit" | "exit" => break,
            "list" => match coordinator.refresh_conversations().await {
                Ok(conversations) => print_conversations(&conversations),
                Err(e) => println!("(error) {}", e),
            },
            "open" => match coordinator.select_conversation(rest).await {
                Ok(conversation) => {
                    println!("Opened {} ({})", conversation.id, conversation.status);
                    for message in coordinator.messages(&conversation.id) {
                        let sender = message.sender.as_ref().map_or("system", |s| s.label());
                        println!("  {}: {}", sender, message.content);
                    }
                }
                Err(e) => println!("(error) {}", e),
            },
            "send" => {
                let (id, text) = rest.split_once(' ').unwrap_or((rest, ""));
                if !coordinator.send_message(id, text).await {
                    println!("(error) message not sent");
                }
            }
            "accept" => match coordinator.accept_conversation(rest).await {
                Ok(conversation) => println!("Accepted {}", conversation.id),
                Err(e) => println!("(error) {}", e),
            },
            "close" => match coordinator.close_conversation(rest).await {
                Ok(conversation) => println!("Closed {}", conversation.id),
                Err(e) => println!("(error) {}", e),
            },
            "leave" => {
                if coordinator.selected().as_deref() == Some(rest) {
                    coordinator.deselect();
                } else {
                    coordinator.leave_conversation(rest);
                }
            }
            _ => println!("{}", HELP),
        }
    }

    tracing::info!("Shutting down");
    transport.shutdown();
    if let Some(connection) = connection {
        let _ = connection.await;
    }
    pump.abort();
    Ok(())
}

fn print_conversations(conversations: &[Conversation]) {
    if conversations.is_empty() {
        println!("No conversations");
        return;
    }
    for conversation in conversations {
        let assignee = conversation
            .assigned_to
            .as_ref()
            .map_or("unassigned", |a| a.label());
        println!(
            "{}  {:<8} {:<10} {}  {}",
            conversation.id,
            conversation.status,
            assignee,
            conversation.participant_label(),
            conversation
                .last_message
                .as_ref()
                .map_or("", |m| m.content.as_str())
        );
    }
}
