use std::sync::Arc;

use ssb_core::{config::Config, generation::GenerationClient};
use ssb_openai::OpenAiImageClient;

#[tokio::main]
async fn main() -> Result<(), ssb_core::Error> {
    ssb_core::logging::init("ssb")?;

    let cfg = Arc::new(Config::load()?);

    let generator: Arc<dyn GenerationClient> = Arc::new(
        OpenAiImageClient::new(cfg.openai_api_key.clone())
            .with_base_url(cfg.openai_base_url.clone())
            .with_model(cfg.image_model.clone()),
    );
    tracing::info!(
        model = %cfg.image_model,
        timeout_secs = cfg.generation_timeout.as_secs(),
        "image generation configured"
    );

    ssb_telegram::router::run_polling(cfg, generator)
        .await
        .map_err(|e| ssb_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
