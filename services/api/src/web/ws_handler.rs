//! services/api/src/web/ws_handler.rs
//!
//! Entry point and control loop for a push connection. The session cookie is
//! checked before the upgrade is accepted, so a rejected client never gets a
//! socket at all.

use crate::web::{
    gateway::{ConnId, ConnectionState, PushFrame, PushGateway},
    protocol::ClientMessage,
    state::AppState,
};
use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// The handler for upgrading HTTP requests to push connections.
pub async fn push_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let cookie_header = headers.get(header::COOKIE).and_then(|v| v.to_str().ok());

    let identity = match app_state.gateway.authorize(cookie_header).await {
        Ok(identity) => identity,
        Err(reason) => {
            warn!(%reason, state = ?ConnectionState::Rejected, "Push handshake rejected");
            return (StatusCode::UNAUTHORIZED, "Push handshake rejected").into_response();
        }
    };

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let gateway = app_state.gateway.clone();
    ws.on_upgrade(move |socket| async move {
        let attachment = gateway.connect(&identity).await;
        handle_socket(socket, gateway, attachment.conn_id, attachment.receiver).await;
    })
}

async fn handle_socket(
    socket: WebSocket,
    gateway: Arc<PushGateway>,
    conn_id: ConnId,
    mut rx: mpsc::UnboundedReceiver<PushFrame>,
) {
    let (mut sink, mut stream) = socket.split();

    // Sender task: forward gateway frames to the WebSocket sink.
    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let message = match frame {
                PushFrame::Event(event) => match serde_json::to_string(&event) {
                    Ok(json) => Message::Text(json.into()),
                    Err(e) => {
                        error!(%conn_id, error = %e, "Failed to encode push event");
                        continue;
                    }
                },
                PushFrame::Ping => Message::Ping(Bytes::new()),
                PushFrame::Close => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            };
            if sink.send(message).await.is_err() {
                debug!(%conn_id, "Push sink closed");
                break;
            }
        }
    });

    // Receiver loop: the only client request is `join`.
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(text.as_str()) {
                Ok(ClientMessage::Join { room }) => {
                    if let Err(e) = gateway.join(conn_id, &room).await {
                        warn!(%conn_id, room = %room, error = %e, "Join refused");
                    }
                }
                Err(e) => warn!(%conn_id, error = %e, "Failed to deserialize client message"),
            },
            Ok(Message::Close(_)) => {
                info!(%conn_id, "Client sent close message.");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                debug!(%conn_id, error = %e, "Push receive error");
                break;
            }
        }
    }

    // --- Cleanup ---
    gateway.disconnect(conn_id).await;
    send_task.abort();
}
