use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use ssb_core::{
    archive::ImageArchive,
    config::Config,
    generation::GenerationClient,
    messaging::port::MessagingPort,
    registry::UserRegistry,
    relay::{Relay, RelaySettings},
};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
    pub messenger: Arc<dyn MessagingPort>,
}

pub async fn run_polling(
    cfg: Arc<Config>,
    generator: Arc<dyn GenerationClient>,
) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    // Basic startup info.
    if let Ok(me) = bot.get_me().await {
        tracing::info!(bot = %me.username(), "bot started");
    }
    tracing::info!(
        users_file = %cfg.users_file.display(),
        archive_dir = %cfg.archive_dir.display(),
        styles = cfg.styles.len(),
        "open registration - anyone can use the bot"
    );

    let messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let relay = Arc::new(Relay::new(
        UserRegistry::new(cfg.users_file.clone()),
        ImageArchive::new(cfg.archive_dir.clone()),
        generator,
        messenger.clone(),
        RelaySettings::from(cfg.as_ref()),
    ));

    let state = Arc::new(AppState { relay, messenger });

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    Ok(())
}
