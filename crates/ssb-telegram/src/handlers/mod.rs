//! Telegram update handlers.
//!
//! Each handler is a small adapter that turns a teloxide `Message` into a
//! call on the core `Relay`.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};

use ssb_core::{domain::ChatId, messaging::port::MessagingPort};

use crate::router::AppState;
mod commands;
mod photo;

const SEND_A_PHOTO: &str = "📸 Send me a selfie and I'll transform it into a surprise! Try /help.";

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    if let Some(text) = msg.text() {
        if text.starts_with('/') {
            return commands::handle_command(msg, state).await;
        }
    }

    if msg.photo().is_some() {
        return photo::handle_photo(msg, state).await;
    }

    send_hint(state.messenger.as_ref(), ChatId(msg.chat.id.0)).await;
    Ok(())
}

async fn send_hint(messenger: &dyn MessagingPort, chat_id: ChatId) {
    if let Err(e) = messenger.send_text(chat_id, SEND_A_PHOTO).await {
        tracing::warn!(chat_id = chat_id.0, error = %e, "failed to send photo hint");
    }
}
