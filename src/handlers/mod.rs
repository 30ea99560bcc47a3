use serde::Serialize;

pub mod messages;
pub mod posts;
pub mod users;
pub mod ws;

/// Plain success/message envelope used by mutation endpoints.
#[derive(Serialize)]
pub struct ApiMessage {
    pub success: bool,
    pub message: &'static str,
}

impl ApiMessage {
    pub fn ok(message: &'static str) -> Self {
        Self {
            success: true,
            message,
        }
    }
}
