use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    Result,
};

/// Cross-messenger port.
///
/// The relay only needs a handful of verbs: plain text status messages,
/// photo delivery and downloading the inbound photo.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef>;
    async fn edit_text(&self, msg: MessageRef, text: &str) -> Result<()>;
    async fn delete_message(&self, msg: MessageRef) -> Result<()>;

    async fn send_photo(&self, chat_id: ChatId, image: &[u8], caption: &str)
        -> Result<MessageRef>;

    /// Fetch the raw bytes of a file previously received from the messenger.
    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>>;
}
