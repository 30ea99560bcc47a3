use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::events::{MessagePayload, ServerEvent};
use crate::models::{Message, NewMessage};
use crate::schema::messages;
use crate::utils::auth::CurrentUid;
use crate::utils::ids;
use crate::AppState;

#[derive(Deserialize)]
pub struct PeerPath {
    id: i32,
}

#[derive(Deserialize)]
pub struct SendMessageBody {
    #[serde(rename = "textMessage")]
    text_message: String,
}

#[derive(Serialize)]
pub struct SendMessageResponse {
    success: bool,
    #[serde(rename = "newMessage")]
    new_message: MessagePayload,
}

/// POST /api/v1/message/send/{id} — persist the message, then push it to the
/// receiver's live connection if there is one. The push is fire-and-forget:
/// its failure never affects the response.
pub async fn send_message(
    CurrentUid(uid): CurrentUid,
    State(state): State<AppState>,
    Path(PeerPath { id: receiver_uid }): Path<PeerPath>,
    Json(body): Json<SendMessageBody>,
) -> Result<impl IntoResponse, (StatusCode, &'static str)> {
    let text = body.text_message.trim();
    if text.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Message is empty"));
    }

    let id = ids::next_id(state.id_gen.as_ref()).await.map_err(|e| {
        tracing::error!("ferroid next_id: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "ID generation failed")
    })?;

    let conn = &mut state
        .db
        .get()
        .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "Database connection failed"))?;

    let new_message = NewMessage {
        id,
        sender_uid: uid,
        receiver_uid,
        message: text.to_string(),
        created_at: Utc::now(),
    };
    diesel::insert_into(messages::table)
        .values(&new_message)
        .execute(conn)
        .map_err(|e| {
            tracing::error!("insert message: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to send message")
        })?;

    let payload = MessagePayload {
        id: new_message.id,
        sender_id: new_message.sender_uid,
        receiver_id: new_message.receiver_uid,
        message: new_message.message,
        created_at: new_message.created_at,
    };

    state
        .presence
        .push_to_user(receiver_uid, &ServerEvent::NewMessage(payload.clone()));

    Ok((
        StatusCode::CREATED,
        Json(SendMessageResponse {
            success: true,
            new_message: payload,
        }),
    ))
}

#[derive(Serialize)]
pub struct MessagesResponse {
    success: bool,
    messages: Vec<MessagePayload>,
}

/// GET /api/v1/message/all/{id} — full history between the caller and {id},
/// oldest first.
pub async fn get_messages(
    CurrentUid(uid): CurrentUid,
    State(state): State<AppState>,
    Path(PeerPath { id: peer_uid }): Path<PeerPath>,
) -> Result<Json<MessagesResponse>, (StatusCode, &'static str)> {
    let conn = &mut state
        .db
        .get()
        .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "Database connection failed"))?;

    let rows: Vec<Message> = messages::table
        .filter(
            messages::sender_uid
                .eq(uid)
                .and(messages::receiver_uid.eq(peer_uid))
                .or(messages::sender_uid
                    .eq(peer_uid)
                    .and(messages::receiver_uid.eq(uid))),
        )
        .order(messages::id.asc())
        .select(Message::as_select())
        .load(conn)
        .map_err(|e| {
            tracing::error!("list messages: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to list messages")
        })?;

    Ok(Json(MessagesResponse {
        success: true,
        messages: rows.iter().map(MessagePayload::from).collect(),
    }))
}
