//! WebSocket endpoint where every message carries its own `jwt`.
//!
//! Messages are JSON objects with an `action` and a `jwt`. A valid message
//! gets a JSON reply; an unauthenticated one closes the connection with
//! the rejection's close code and reason.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use rogalik::prelude::*;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

/// Accepts WebSocket connections and serves them until the process exits.
pub struct SocketServer {
    listener: TcpListener,
    tokens: Arc<TokenService>,
}

impl SocketServer {
    pub async fn bind(addr: &str, tokens: Arc<TokenService>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(addr, "WebSocket endpoint listening");
        Ok(Self { listener, tokens })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let tokens = Arc::clone(&self.tokens);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, tokens).await {
                            tracing::debug!(%addr, error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => tracing::warn!(error = %e, "accept failed"),
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    tokens: Arc<TokenService>,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let mut ws = tokio_tungstenite::accept_async(stream).await?;
    let handler = protect(tokens, dispatch);

    while let Some(msg) = ws.next().await {
        let text = match msg? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let payload: Value = match serde_json::from_str(text.as_str()) {
            Ok(payload) => payload,
            Err(_) => {
                ws.send(Message::text(json!({"error": "invalid json"}).to_string()))
                    .await?;
                continue;
            }
        };

        match handler(MessageContext::new(payload)).await {
            Ok(reply) => ws.send(Message::text(reply.to_string())).await?,
            Err(rejection) => {
                tracing::debug!(
                    code = rejection.code,
                    reason = rejection.reason,
                    "closing unauthenticated connection"
                );
                ws.close(Some(close_frame(&rejection))).await?;
                break;
            }
        }
    }
    Ok(())
}

fn close_frame(rejection: &MessageRejection) -> CloseFrame {
    CloseFrame {
        code: CloseCode::from(rejection.code),
        reason: rejection.reason.into(),
    }
}

async fn dispatch(ctx: MessageContext, claims: ClaimSet) -> Value {
    let payload = ctx.into_payload();
    let action = payload.get("action").and_then(Value::as_str).unwrap_or_default();
    match action {
        "whoami" => json!({"action": "whoami", "sub": claims.get("sub")}),
        "echo" => json!({"action": "echo", "data": payload.get("data")}),
        other => json!({"error": format!("unknown action: {other}")}),
    }
}
