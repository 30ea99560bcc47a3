//! WebSocket lifecycle: identity handshake via userId query param, presence
//! registration, online-users broadcast on connect/disconnect, ping/pong.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures_util::SinkExt;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use crate::events::ServerEvent;
use crate::presence::PresenceRegistry;
use crate::AppState;

#[derive(Deserialize)]
pub struct WsQuery {
    #[serde(rename = "userId")]
    user_id: Option<String>,
}

#[derive(Deserialize)]
struct WsMessage {
    #[serde(rename = "type")]
    type_: String,
}

const PONG_JSON: &str = r#"{"type":"pong"}"#;

/// The handshake's claimed identity. Malformed clients send the literal
/// strings "undefined" or "null"; those count as absent.
fn parse_client_uid(raw: Option<&str>) -> Option<i32> {
    let s = raw?.trim();
    if s.is_empty() || s == "undefined" || s == "null" {
        return None;
    }
    s.parse().ok()
}

/// GET /ws — upgrade, then either run the registered connection loop or, for
/// an invalid claimed identity, drop the socket without registering,
/// broadcasting, or erroring back.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(q): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let uid = parse_client_uid(q.user_id.as_deref());
    let registry = state.presence.clone();
    ws.on_upgrade(move |mut socket| async move {
        match uid {
            Some(uid) => handle_socket(socket, uid, registry).await,
            None => {
                debug!("ws connect with invalid userId, dropping");
                let _ = socket.close().await;
            }
        }
    })
}

async fn handle_socket(mut socket: WebSocket, uid: i32, registry: Arc<PresenceRegistry>) {
    let (entry, mut rx) = registry.register(uid);
    let conn_id = entry.conn_id;
    debug!(uid, conn_id, "ws connected");
    registry.broadcast_all(&ServerEvent::OnlineUsers(registry.snapshot()));

    loop {
        tokio::select! {
            msg = rx.recv() => {
                match msg {
                    Some(text) => {
                        if socket.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Ok(parsed) = serde_json::from_str::<WsMessage>(&text) {
                            if parsed.type_ == "ping"
                                && socket.send(Message::Text(PONG_JSON.into())).await.is_err()
                            {
                                break;
                            }
                        }
                    }
                    Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }

    registry.unregister(uid, conn_id);
    debug!(uid, conn_id, "ws disconnected");
    registry.broadcast_all(&ServerEvent::OnlineUsers(registry.snapshot()));
}

#[cfg(test)]
mod tests {
    use super::parse_client_uid;

    #[test]
    fn accepts_numeric_identity() {
        assert_eq!(parse_client_uid(Some("17")), Some(17));
        assert_eq!(parse_client_uid(Some(" 17 ")), Some(17));
    }

    #[test]
    fn rejects_sentinel_and_malformed_identities() {
        assert_eq!(parse_client_uid(None), None);
        assert_eq!(parse_client_uid(Some("")), None);
        assert_eq!(parse_client_uid(Some("undefined")), None);
        assert_eq!(parse_client_uid(Some("null")), None);
        assert_eq!(parse_client_uid(Some("abc")), None);
    }
}
