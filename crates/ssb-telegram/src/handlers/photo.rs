use std::sync::Arc;

use teloxide::{prelude::*, types::PhotoSize};

use ssb_core::{
    domain::{ChatId, UserId},
    messaging::types::PhotoMessage,
    relay::Delivery,
};

use crate::router::AppState;

/// Telegram lists photo sizes smallest first.
fn highest_resolution(photos: &[PhotoSize]) -> Option<&PhotoSize> {
    photos.last()
}

pub async fn handle_photo(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let Some(best) = msg.photo().and_then(highest_resolution) else {
        return Ok(());
    };

    let inbound = PhotoMessage {
        chat_id: ChatId(msg.chat.id.0),
        user_id: UserId(user.id.0 as i64),
        username: user.username.clone(),
        file_id: best.file.id.clone(),
    };

    match state.relay.handle_photo(&inbound).await {
        Delivery::Failed { stage, .. } => {
            tracing::warn!(
                user_id = %inbound.user_id,
                username = inbound.username.as_deref().unwrap_or("unknown"),
                stage = ?stage,
                "photo relay failed"
            );
        }
        delivery => {
            tracing::debug!(user_id = %inbound.user_id, delivery = ?delivery, "photo relayed");
        }
    }

    Ok(())
}
