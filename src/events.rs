//! Server→client realtime events. Every frame on the wire is JSON of the shape
//! `{"type": <event name>, "payload": <payload>}`.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::Message;

/// One realtime frame. Event names are part of the client contract.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerEvent {
    /// Full set of currently-online user ids, sent to everyone on each
    /// connect and disconnect.
    #[serde(rename = "getOnlineUsers")]
    OnlineUsers(Vec<i32>),
    /// A freshly persisted direct message, sent to its receiver only.
    #[serde(rename = "newMessage")]
    NewMessage(MessagePayload),
    /// Like/dislike/follow activity, sent to the affected user only.
    #[serde(rename = "notification")]
    Notification(Notification),
}

/// Wire form of a direct message.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    #[serde(with = "crate::utils::id_string")]
    pub id: i64,
    pub sender_id: i32,
    pub receiver_id: i32,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Message> for MessagePayload {
    fn from(m: &Message) -> Self {
        MessagePayload {
            id: m.id,
            sender_id: m.sender_uid,
            receiver_id: m.receiver_uid,
            message: m.message.clone(),
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Like,
    Dislike,
    Follow,
}

/// Ephemeral notification payload. Never persisted; exists only for the push.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    /// The acting user (who liked/followed).
    #[serde(rename = "userId")]
    pub user_id: i32,
    #[serde(rename = "userDetails")]
    pub user_details: UserDetails,
    /// Set for like/dislike, absent for follow.
    #[serde(
        rename = "postId",
        with = "crate::utils::id_string::opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub post_id: Option<i64>,
}

/// Display info about the acting user, denormalized into the push so the
/// client can render without a second fetch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDetails {
    pub username: String,
    pub profile_picture: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn online_users_frame_shape() {
        let event = ServerEvent::OnlineUsers(vec![1, 7]);
        let v: serde_json::Value = serde_json::from_str(&serde_json::to_string(&event).unwrap()).unwrap();
        assert_eq!(v["type"], "getOnlineUsers");
        assert_eq!(v["payload"], serde_json::json!([1, 7]));
    }

    #[test]
    fn new_message_frame_uses_camel_case_and_string_id() {
        let event = ServerEvent::NewMessage(MessagePayload {
            id: 9007199254740993, // larger than JS Number.MAX_SAFE_INTEGER
            sender_id: 1,
            receiver_id: 2,
            message: "hi".to_string(),
            created_at: Utc.timestamp_opt(0, 0).unwrap(),
        });
        let v: serde_json::Value = serde_json::from_str(&serde_json::to_string(&event).unwrap()).unwrap();
        assert_eq!(v["type"], "newMessage");
        assert_eq!(v["payload"]["id"], "9007199254740993");
        assert_eq!(v["payload"]["senderId"], 1);
        assert_eq!(v["payload"]["receiverId"], 2);
        assert_eq!(v["payload"]["message"], "hi");
        assert!(v["payload"]["createdAt"].is_string());
    }

    #[test]
    fn like_notification_carries_post_id() {
        let event = ServerEvent::Notification(Notification {
            kind: NotificationKind::Like,
            user_id: 3,
            user_details: UserDetails {
                username: "ada".to_string(),
                profile_picture: None,
            },
            post_id: Some(42),
        });
        let v: serde_json::Value = serde_json::from_str(&serde_json::to_string(&event).unwrap()).unwrap();
        assert_eq!(v["type"], "notification");
        assert_eq!(v["payload"]["type"], "like");
        assert_eq!(v["payload"]["userId"], 3);
        assert_eq!(v["payload"]["userDetails"]["username"], "ada");
        assert_eq!(v["payload"]["postId"], "42");
    }

    #[test]
    fn follow_notification_omits_post_id() {
        let event = ServerEvent::Notification(Notification {
            kind: NotificationKind::Follow,
            user_id: 3,
            user_details: UserDetails {
                username: "ada".to_string(),
                profile_picture: Some("https://cdn.example/a.jpg".to_string()),
            },
            post_id: None,
        });
        let v: serde_json::Value = serde_json::from_str(&serde_json::to_string(&event).unwrap()).unwrap();
        assert_eq!(v["payload"]["type"], "follow");
        assert!(v["payload"].get("postId").is_none());
    }
}
