use crate::domain::{ChatId, UserId};

/// Inbound photo, already narrowed to its highest-resolution variant.
///
/// Telegram-specific fields should live in the Telegram adapter.
#[derive(Clone, Debug)]
pub struct PhotoMessage {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub username: Option<String>,
    pub file_id: String,
}
