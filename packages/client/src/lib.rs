//! CLI listener for the notification hub.
//!
//! Connects with the gateway identity headers, prints every pushed message
//! and keeps the connection alive with JSON pings.

use std::time::Duration;

use campus_notify_server::infrastructure::dto::websocket::{MessageType, WebSocketMessage};
use campus_notify_shared::time::to_jst_rfc3339;
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        self, Message,
        client::IntoClientRequest,
        handshake::client::Request,
        http::{HeaderValue, header::ORIGIN},
    },
};

/// Command line arguments of the listener
#[derive(Debug, Clone, Parser)]
#[command(
    name = "campus-notify-client",
    version,
    about = "Print real-time pushes from the notification hub"
)]
pub struct ClientArgs {
    #[arg(long, env = "HUB_URL", default_value = "ws://127.0.0.1:8080/ws")]
    pub url: String,

    #[arg(long)]
    pub college_id: i64,

    #[arg(long)]
    pub user_id: i64,

    /// Value of the x-user-identity header
    #[arg(long)]
    pub identity: String,

    #[arg(long)]
    pub origin: Option<String>,

    #[arg(long, default_value_t = 20)]
    pub ping_interval_secs: u64,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("invalid value for header {0}")]
    InvalidHeader(&'static str),

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Handshake request carrying the gateway identity headers
pub fn build_request(args: &ClientArgs) -> Result<Request, ClientError> {
    let mut request = args.url.as_str().into_client_request()?;
    let headers = request.headers_mut();

    headers.insert(
        "x-user-identity",
        HeaderValue::from_str(&args.identity)
            .map_err(|_| ClientError::InvalidHeader("x-user-identity"))?,
    );
    headers.insert("x-college-id", HeaderValue::from(args.college_id));
    headers.insert("x-user-id", HeaderValue::from(args.user_id));
    if let Some(origin) = &args.origin {
        headers.insert(
            ORIGIN,
            HeaderValue::from_str(origin).map_err(|_| ClientError::InvalidHeader("origin"))?,
        );
    }

    Ok(request)
}

/// One line of output for a frame received from the hub
pub fn describe(text: &str) -> String {
    let message = match WebSocketMessage::decode(text) {
        Ok(message) => message,
        Err(_) => return format!("[raw] {}", text),
    };
    let at = to_jst_rfc3339(message.timestamp);
    let user = message
        .user_id
        .map(|user_id| user_id.to_string())
        .unwrap_or_else(|| "-".to_string());

    match message.r#type {
        MessageType::Notification => match &message.notification {
            Some(notification) => format!(
                "[{}] notification #{} ({}, {}): {} - {}",
                at,
                notification.id,
                notification.kind,
                notification.priority,
                notification.title,
                notification.body
            ),
            None => format!("[{}] notification (empty)", at),
        },
        MessageType::Typing => {
            let is_typing = message
                .data
                .as_ref()
                .and_then(|data| data["is_typing"].as_bool())
                .unwrap_or(false);
            let verb = if is_typing { "is typing" } else { "stopped typing" };
            format!("[{}] user {} {}", at, user, verb)
        }
        MessageType::Presence => {
            let status = message
                .data
                .as_ref()
                .and_then(|data| data["status"].as_str())
                .unwrap_or("unknown");
            format!("[{}] user {} is {}", at, user, status)
        }
        MessageType::Connected => format!("[{}] connected as user {}", at, user),
        MessageType::Pong => format!("[{}] pong", at),
        MessageType::Ping => format!("[{}] ping", at),
    }
}

/// Connect and print pushes until Ctrl-C or the server closes the socket
pub async fn run_client(args: ClientArgs) -> Result<(), ClientError> {
    let request = build_request(&args)?;
    let (stream, response) = connect_async(request).await?;
    tracing::info!(status = %response.status(), "Connected to {}", args.url);

    let (mut write, mut read) = stream.split();
    let ping = WebSocketMessage::ping().encode()?;
    let mut ticker = tokio::time::interval(Duration::from_secs(args.ping_interval_secs.max(1)));
    ticker.tick().await;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("Received Ctrl+C, closing connection");
                if let Err(e) = write.send(Message::Close(None)).await {
                    tracing::debug!("Failed to send close frame: {}", e);
                }
                break;
            }
            _ = ticker.tick() => {
                write.send(Message::Text(ping.as_ref().into())).await?;
            }
            frame = read.next() => match frame {
                None => {
                    tracing::info!("Server closed the connection");
                    break;
                }
                Some(Err(e)) => return Err(e.into()),
                Some(Ok(Message::Text(text))) => println!("{}", describe(text.as_str())),
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!("Server sent close frame: {:?}", frame);
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }

    Ok(())
}
