use std::sync::Arc;

use teloxide::prelude::*;

use ssb_core::{
    domain::{ChatId, UserId},
    messaging::port::MessagingPort,
    relay::RelayStats,
};

use crate::router::AppState;

const HELP_TEXT: &str = "🤖 Surprise Selfie Bot - Help\n\n\
Commands:\n\
/start - Start the bot\n\
/stats - View bot statistics\n\
/help - Show this help message\n\n\
How to use:\n\
1. Send a selfie (photo)\n\
2. Wait for the magic to happen! ✨\n\
3. Your transformed selfie will be sent to a random user!\n\n\
The bot will randomly select a funny style and transform your selfie \
into something hilarious, then surprise a random user with it! 🎭";

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

fn welcome_text(first_name: &str, is_new: bool) -> String {
    if is_new {
        format!(
            "Hi {first_name}! 👋\n\n\
Welcome to the Surprise Selfie Bot! 🎭\n\n\
Send me a selfie and I'll transform it into something hilariously unexpected! 🎨✨\n\n\
Your transformed selfie will be sent to a random user (or back to you if you're the only one).\n\n\
Just send me a photo to get started! 📸"
        )
    } else {
        format!(
            "Welcome back, {first_name}! 👋\n\n\
Ready to create some surprises? Send me a selfie! 📸"
        )
    }
}

fn stats_text(stats: &RelayStats) -> String {
    format!(
        "📊 Bot Statistics\n\n\
👥 Total Users: {}\n\
🖼️ Images Generated: {}\n\
📤 Unique Senders: {}\n\
📥 Unique Receivers: {}\n\
🎨 Styles Used: {}\n\n\
All generated images are saved locally! 💾",
        stats.total_users,
        stats.archive.total_images,
        stats.archive.unique_senders,
        stats.archive.unique_receivers,
        stats.archive.styles_used.len(),
    )
}

pub async fn handle_command(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let Some(text) = msg.text() else {
        return Ok(());
    };

    let user_id = UserId(user.id.0 as i64);
    let chat_id = ChatId(msg.chat.id.0);
    let (cmd, _arg) = parse_command(text);

    let reply = match cmd.as_str() {
        "start" => {
            let is_new = state.relay.register(user_id).await;
            tracing::info!(user_id = %user_id, name = %user.first_name, is_new, "user started the bot");
            welcome_text(&user.first_name, is_new)
        }
        "help" => HELP_TEXT.to_string(),
        "stats" => stats_text(&state.relay.stats().await),
        _ => "Unknown command. Try /help.".to_string(),
    };

    if let Err(e) = state.messenger.send_text(chat_id, &reply).await {
        tracing::warn!(user_id = %user_id, command = %cmd, error = %e, "failed to reply to command");
    }
    Ok(())
}
